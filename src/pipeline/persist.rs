use crate::analysis::AnalyticsRecord;
use crate::storage::{Cursor, CursorError, CursorStore, KvStore, StorageError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write analytics record: {0}")]
    Record(#[source] StorageError),

    #[error("failed to advance cursor: {0}")]
    Cursor(#[from] CursorError),
}

/// Writes analytics records and advances cursors, always in that order
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn KvStore>,
    analytics_table: String,
    cursors: CursorStore,
}

impl Persister {
    pub fn new(store: Arc<dyn KvStore>, analytics_table: impl Into<String>, cursors: CursorStore) -> Self {
        Self {
            store,
            analytics_table: analytics_table.into(),
            cursors,
        }
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    pub async fn write_record(&self, record: &AnalyticsRecord) -> Result<(), PersistError> {
        let body = serde_json::to_value(record).map_err(|e| PersistError::Record(e.into()))?;
        self.store
            .put_item(&self.analytics_table, &record.key(), &body)
            .await
            .map_err(PersistError::Record)?;

        tracing::debug!(
            source_id = %record.source_id,
            unit_id = %record.unit_id,
            impressions = record.foot_impressions,
            "Analytics record written"
        );
        Ok(())
    }

    pub async fn advance(&self, source_id: &str, cursor: &Cursor) -> Result<(), PersistError> {
        self.cursors.save(source_id, cursor).await?;
        Ok(())
    }

    /// Write `record`, then move `source_id` to `cursor`. The cursor is left
    /// untouched when the record write fails.
    pub async fn commit(&self, record: &AnalyticsRecord, source_id: &str, cursor: &Cursor) -> Result<(), PersistError> {
        self.write_record(record).await?;
        self.advance(source_id, cursor).await
    }
}
