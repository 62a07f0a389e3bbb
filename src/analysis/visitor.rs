use super::face::FaceDetail;
use crate::config::types::VisitorIdentityKind;
use crate::storage::{ItemKey, KvStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Decides which visitor a unit's faces are attributed to
pub trait VisitorIdentity: Send + Sync {
    fn identify(&self, faces: &[FaceDetail]) -> String;
}

/// A fresh id per unit. Does not track people across frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomVisitorIdentity;

impl VisitorIdentity for RandomVisitorIdentity {
    fn identify(&self, _faces: &[FaceDetail]) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Derived from the first face id the vision service reported; random when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct StableVisitorIdentity;

impl VisitorIdentity for StableVisitorIdentity {
    fn identify(&self, faces: &[FaceDetail]) -> String {
        let Some(face_id) = faces.iter().find_map(|f| f.face_id.as_deref()) else {
            return RandomVisitorIdentity.identify(faces);
        };

        let digest = Sha256::digest(face_id.as_bytes());
        let hex: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
        format!("visitor-{}", hex)
    }
}

pub fn identity_from_config(kind: VisitorIdentityKind) -> Arc<dyn VisitorIdentity> {
    match kind {
        VisitorIdentityKind::Random => Arc::new(RandomVisitorIdentity),
        VisitorIdentityKind::Stable => Arc::new(StableVisitorIdentity),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub visitor_id: String,
    pub last_seen: DateTime<Utc>,
    pub visit_count: u64,
    /// Seconds
    pub dwell_time: u64,
}

/// Read-modify-write of visitor records in the visitors table
#[derive(Clone)]
pub struct VisitorTracker {
    store: Arc<dyn KvStore>,
    table: String,
    dwell_per_unit: Duration,
}

impl VisitorTracker {
    pub fn new(store: Arc<dyn KvStore>, table: impl Into<String>, dwell_per_unit: Duration) -> Self {
        Self {
            store,
            table: table.into(),
            dwell_per_unit,
        }
    }

    pub async fn get(&self, visitor_id: &str) -> Result<Option<VisitorRecord>, StorageError> {
        let item = self
            .store
            .get_item(&self.table, &ItemKey::partition(visitor_id))
            .await?;

        item.map(|item| {
            serde_json::from_value(item.body).map_err(|e| StorageError::InvalidItem {
                table: self.table.clone(),
                message: format!("visitor '{}': {}", visitor_id, e),
            })
        })
        .transpose()
    }

    /// The record `visitor_id` would have after one more sighting, without storing it
    pub async fn next_visit(
        &self,
        visitor_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<VisitorRecord, StorageError> {
        let dwell = self.dwell_per_unit.as_secs();
        Ok(match self.get(visitor_id).await? {
            Some(existing) => VisitorRecord {
                visitor_id: visitor_id.to_string(),
                last_seen: seen_at,
                visit_count: existing.visit_count + 1,
                dwell_time: existing.dwell_time + dwell,
            },
            None => VisitorRecord {
                visitor_id: visitor_id.to_string(),
                last_seen: seen_at,
                visit_count: 1,
                dwell_time: dwell,
            },
        })
    }

    pub async fn save(&self, record: &VisitorRecord) -> Result<(), StorageError> {
        self.store
            .put_item(
                &self.table,
                &ItemKey::partition(&record.visitor_id),
                &serde_json::to_value(record)?,
            )
            .await?;

        tracing::debug!(
            visitor_id = %record.visitor_id,
            visit_count = record.visit_count,
            dwell_time = record.dwell_time,
            "Visitor updated"
        );
        Ok(())
    }

    /// Count one more sighting of `visitor_id` and add one unit's dwell time
    pub async fn record_visit(
        &self,
        visitor_id: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<VisitorRecord, StorageError> {
        let record = self.next_visit(visitor_id, seen_at).await?;
        self.save(&record).await?;
        Ok(record)
    }
}
