use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fleetwatch_core::{AlertEvent, DeviceId, DeviceStatus, TelemetryRecord};
use rusqlite::{Connection, Row, params};
use tokio::sync::Mutex;

use crate::store::Store;

/// SQLite-backed store implementation.
/// Records are stored as JSON blobs; the status table is keyed by
/// device id so upserts replace the whole document.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Error type for SqliteStore
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SqliteStore {
    /// Opens or creates a SQLite database at the given path.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), SqliteStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS telemetry (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                record_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                event_json TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS device_status (
                device_id TEXT PRIMARY KEY,
                status_json TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        Ok(())
    }

    fn rows_to_json<T: serde::de::DeserializeOwned>(
        conn: &Connection,
        sql: &str,
        limit: usize,
    ) -> Result<Vec<T>, SqliteStoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![limit as i64], |row: &Row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            records.push(serde_json::from_str(&json)?);
        }

        Ok(records)
    }
}

#[async_trait]
impl Store for SqliteStore {
    type Error = SqliteStoreError;

    async fn insert_telemetry(&self, record: TelemetryRecord) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&record)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO telemetry (record_json) VALUES (?)",
            params![json],
        )?;

        Ok(())
    }

    async fn latest_telemetry(&self, limit: usize) -> Result<Vec<TelemetryRecord>, Self::Error> {
        let conn = self.conn.lock().await;
        Self::rows_to_json(
            &conn,
            "SELECT record_json FROM telemetry ORDER BY seq DESC LIMIT ?",
            limit,
        )
    }

    async fn insert_event(&self, event: AlertEvent) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&event)?;
        let id_str = event.id.0.to_string();

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (id, event_json) VALUES (?, ?)",
            params![id_str, json],
        )?;

        Ok(())
    }

    async fn latest_events(&self, limit: usize) -> Result<Vec<AlertEvent>, Self::Error> {
        let conn = self.conn.lock().await;
        Self::rows_to_json(
            &conn,
            "SELECT event_json FROM events ORDER BY seq DESC LIMIT ?",
            limit,
        )
    }

    async fn get_status(&self, device_id: &DeviceId) -> Result<Option<DeviceStatus>, Self::Error> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT status_json FROM device_status WHERE device_id = ?")?;

        let mut rows = stmt.query_map(params![device_id.as_str()], |row: &Row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;

        match rows.next() {
            Some(row) => {
                let json = row?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_status(&self, status: DeviceStatus) -> Result<(), Self::Error> {
        let json = serde_json::to_string(&status)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO device_status (device_id, status_json) VALUES (?, ?)
             ON CONFLICT(device_id) DO UPDATE SET
                 status_json = excluded.status_json,
                 updated_at = CURRENT_TIMESTAMP",
            params![status.device_id.as_str(), json],
        )?;

        Ok(())
    }

    async fn list_statuses(&self, limit: usize) -> Result<Vec<DeviceStatus>, Self::Error> {
        let conn = self.conn.lock().await;
        Self::rows_to_json(
            &conn,
            "SELECT status_json FROM device_status ORDER BY updated_at DESC LIMIT ?",
            limit,
        )
    }
}
