use std::path::PathBuf;

use clap::Parser;
use fleetwatch_ingest::api::{self, ApiState};
use fleetwatch_ingest::{
    CommandPublisher, Config, MemoryStore, MockListener, NullPublisher, SqliteStore, Store,
    StorageConfig, TransportConfig, TransportListener, run_pipeline, transport::mqtt,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fleetwatch-ingest")]
#[command(about = "Fleetwatch Ingest")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "fleetwatch.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,fleetwatch_ingest=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    info!(
        http_addr = %config.server.http_addr,
        "Starting fleetwatch-ingest"
    );

    match config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            let store = MemoryStore::default();
            run_service(config, store).await?;
        }
        StorageConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite storage");
            let store = SqliteStore::new(path).await?;
            run_service(config, store).await?;
        }
    }

    Ok(())
}

async fn run_service<S>(config: Config, store: S) -> color_eyre::Result<()>
where
    S: Store + Clone,
{
    let cancel = CancellationToken::new();

    match &config.transport {
        TransportConfig::Mqtt {
            host,
            port,
            client_id,
        } => {
            info!(%host, port, "Using MQTT transport");
            let (listener, publisher) = mqtt::connect(host, *port, client_id);
            run_stages(config, store, listener, publisher, cancel).await
        }
        TransportConfig::Mock {
            device_count,
            interval_secs,
        } => {
            info!(device_count, interval_secs, "Using mock transport");
            let listener = MockListener::new(*device_count, *interval_secs);
            run_stages(config, store, listener, NullPublisher, cancel).await
        }
    }
}

async fn run_stages<S, L, P>(
    config: Config,
    store: S,
    listener: L,
    publisher: P,
    cancel: CancellationToken,
) -> color_eyre::Result<()>
where
    S: Store + Clone,
    L: TransportListener,
    P: CommandPublisher + Clone,
{
    let rx = listener.start(cancel.clone()).await?;

    let store_for_pipeline = store.clone();
    let rules = config.rules.clone();
    let cancel_for_pipeline = cancel.clone();
    let pipeline_handle = tokio::spawn(async move {
        run_pipeline(rx, store_for_pipeline, rules, cancel_for_pipeline).await;
    });

    let http_addr = config.server.http_addr;
    let app = api::router(ApiState { store, publisher });
    let http_listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();

    tokio::select! {
        result = axum::serve(http_listener, app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    let _ = pipeline_handle.await;

    info!("fleetwatch-ingest shut down complete");
    Ok(())
}
