use super::traits::{Item, ItemKey, KvStore, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// DuckDB-backed key-value store. Every logical table lives in one physical
/// `items` table keyed by (table_name, pk, sk) with a JSON text body.
pub struct DuckDbKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbKvStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            let message = e.to_string();
            if message.contains("Could not set lock") {
                StorageError::Database(format!(
                    "{} is in use by another footfall process: {}",
                    path.display(),
                    message
                ))
            } else {
                e.into()
            }
        })?;
        Ok(Self::from_connection(conn))
    }

    /// In-memory store (tests and dry runs)
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StorageError> {
    conn.lock()
        .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Database(format!("Task join error: {}", e))
}

fn parse_body(table: &str, raw: &str) -> Result<serde_json::Value, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::InvalidItem {
        table: table.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl KvStore for DuckDbKvStore {
    async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS items (
                    table_name VARCHAR NOT NULL,
                    pk VARCHAR NOT NULL,
                    sk VARCHAR NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (table_name, pk, sk)
                )",
                [],
            )?;

            Ok::<(), StorageError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StorageError> {
        let conn = self.conn.clone();
        let table = table.to_string();
        let key = key.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT body FROM items WHERE table_name = ? AND pk = ? AND sk = ?",
            )?;
            let mut rows = stmt.query(duckdb::params![table, key.partition, key.sort])?;

            match rows.next()? {
                Some(row) => {
                    let raw: String = row.get(0)?;
                    let body = parse_body(&table, &raw)?;
                    Ok(Some(Item { key, body }))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn put_item(
        &self,
        table: &str,
        key: &ItemKey,
        body: &serde_json::Value,
    ) -> Result<(), StorageError> {
        if !body.is_object() {
            return Err(StorageError::InvalidItem {
                table: table.to_string(),
                message: "item body must be a JSON object".to_string(),
            });
        }

        let conn = self.conn.clone();
        let table = table.to_string();
        let key = key.clone();
        let raw = serde_json::to_string(body)?;
        let now = Utc::now().timestamp_micros();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO items (table_name, pk, sk, body, updated_at)
                 VALUES (?, ?, ?, ?, to_timestamp(? / 1000000.0))",
                duckdb::params![table, key.partition, key.sort, raw, now],
            )?;
            Ok::<(), StorageError>(())
        })
        .await
        .map_err(join_error)?
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StorageError> {
        let conn = self.conn.clone();
        let table = table.to_string();
        let partition = partition.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT sk, body FROM items WHERE table_name = ? AND pk = ? ORDER BY sk",
            )?;
            let rows = stmt.query_map(duckdb::params![table, partition], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut items = Vec::new();
            for row in rows {
                let (sort, raw) = row?;
                items.push(Item {
                    key: ItemKey::new(partition.clone(), sort),
                    body: parse_body(&table, &raw)?,
                });
            }
            Ok(items)
        })
        .await
        .map_err(join_error)?
    }
}
