pub mod api;
pub mod config;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod store;
pub mod transport;

pub use config::{Config, ServerConfig, StorageConfig, TransportConfig};
pub use normalize::{Route, normalize, route};
pub use pipeline::run_pipeline;
pub use rules::{Evaluation, Geofence, RulesConfig, evaluate};
pub use store::Store;
pub use store::memory::MemoryStore;
pub use store::sqlite::SqliteStore;
pub use transport::mock::MockListener;
pub use transport::mqtt::{MqttCommandPublisher, MqttListener};
pub use transport::{CommandPublisher, CommandRequest, NullPublisher, RawMessage, TransportListener};
