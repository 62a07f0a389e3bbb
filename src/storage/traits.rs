use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Key of an item: a partition key plus a sort key within that partition.
/// Single-key tables use an empty sort key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }

    pub fn partition(partition: impl Into<String>) -> Self {
        Self::new(partition, "")
    }
}

/// A stored item: its key and a JSON object body
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub body: serde_json::Value,
}

/// Key-value store holding cursors, analytics records and visitor records as
/// separate tables.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn init_schema(&self) -> Result<(), StorageError>;

    async fn get_item(&self, table: &str, key: &ItemKey) -> Result<Option<Item>, StorageError>;

    /// Overwrite the item stored under `key`. Writing the same body twice is a no-op.
    async fn put_item(
        &self,
        table: &str,
        key: &ItemKey,
        body: &serde_json::Value,
    ) -> Result<(), StorageError>;

    /// All items of one partition, ordered by sort key
    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid item in table '{table}': {message}")]
    InvalidItem { table: String, message: String },
}

impl From<duckdb::Error> for StorageError {
    fn from(e: duckdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}
