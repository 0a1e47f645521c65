use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vigil_types::{now_ms, EvidenceId, SessionId};

use crate::error::EvidenceError;
use crate::record::EvidenceRecord;

/// Durable home of sealed evidence records.
///
/// Implementations may be in-memory, an encrypted file store, a database.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Store a sealed record. Records are immutable: storing an id twice fails.
    async fn put(&self, record: EvidenceRecord) -> Result<(), EvidenceError>;

    async fn get(&self, id: &EvidenceId) -> Result<Option<EvidenceRecord>, EvidenceError>;

    /// All records of a session, oldest seal first.
    async fn for_session(&self, session_id: &SessionId) -> Result<Vec<EvidenceRecord>, EvidenceError>;

    /// The newest record of a session: the head of its custody chain.
    async fn latest_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<EvidenceRecord>, EvidenceError> {
        Ok(self
            .for_session(session_id)
            .await?
            .into_iter()
            .max_by_key(|r| r.custody.len()))
    }

    /// Securely erase records whose retention has expired. Returns how many.
    async fn purge_expired(&self, now_ms: u64) -> Result<usize, EvidenceError>;

    async fn count(&self) -> Result<usize, EvidenceError>;
}

/// In-memory evidence store for tests and the simulator.
#[derive(Clone, Default)]
pub struct InMemoryEvidenceStore {
    records: Arc<RwLock<HashMap<EvidenceId, EvidenceRecord>>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn put(&self, record: EvidenceRecord) -> Result<(), EvidenceError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(EvidenceError::AlreadyExists(record.id));
        }
        debug!(evidence_id = %record.id, session_id = %record.session_id, "Evidence stored");
        records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &EvidenceId) -> Result<Option<EvidenceRecord>, EvidenceError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn for_session(&self, session_id: &SessionId) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        let mut found: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| &r.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.custody.len());
        Ok(found)
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<usize, EvidenceError> {
        let mut records = self.records.write().await;
        let expired: Vec<EvidenceId> = records
            .values()
            .filter(|r| r.is_expired(now_ms))
            .map(|r| r.id)
            .collect();
        for id in &expired {
            if let Some(mut record) = records.remove(id) {
                record.zeroize_payloads();
            }
        }
        if !expired.is_empty() {
            info!(purged = expired.len(), "Expired evidence erased");
        }
        Ok(expired.len())
    }

    async fn count(&self) -> Result<usize, EvidenceError> {
        Ok(self.records.read().await.len())
    }
}

/// Run `purge_expired` every `interval` until the handle is aborted.
pub fn spawn_retention_sweeper(store: Arc<dyn EvidenceStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = store.purge_expired(now_ms()).await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    })
}
