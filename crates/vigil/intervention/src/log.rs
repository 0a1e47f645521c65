use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use vigil_types::{CallerId, ContentHash, EvidenceId, InterventionId, SessionId};

use crate::action::{InterventionAction, SubActionResult};
use crate::error::InterventionError;

/// Immutable record of one executed intervention.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub id: InterventionId,
    pub session_id: SessionId,
    pub caller: CallerId,
    pub trigger_score: f64,
    pub trigger_at_ms: u64,
    pub decided_at_ms: u64,
    pub actions: Vec<SubActionResult>,
    /// Sealed evidence records produced for this session
    pub evidence_refs: Vec<EvidenceId>,
    /// Why evidence capture failed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_failure: Option<String>,
    /// Set on a record that reports how a backgrounded sub-action of an
    /// earlier record finally ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_of: Option<InterventionId>,
    pub previous_hash: ContentHash,
    pub record_hash: ContentHash,
}

impl InterventionRecord {
    fn compute_hash(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"vigil-intervention-v1:");
        hasher.update(self.id.0.as_bytes());
        hasher.update(self.session_id.0.as_bytes());
        hasher.update(&(self.caller.as_str().len() as u64).to_le_bytes());
        hasher.update(self.caller.as_str().as_bytes());
        hasher.update(&self.trigger_score.to_le_bytes());
        hasher.update(&self.trigger_at_ms.to_le_bytes());
        hasher.update(&self.decided_at_ms.to_le_bytes());
        for result in &self.actions {
            hasher.update(result.action.as_str().as_bytes());
            hasher.update(result.status.label().as_bytes());
            hasher.update(&result.attempts.to_le_bytes());
            hasher.update(&result.elapsed_ms.to_le_bytes());
        }
        for evidence in &self.evidence_refs {
            hasher.update(evidence.0.as_bytes());
        }
        if let Some(failure) = &self.evidence_failure {
            hasher.update(failure.as_bytes());
        }
        if let Some(original) = &self.follow_up_of {
            hasher.update(b"follow-up:");
            hasher.update(original.0.as_bytes());
        }
        hasher.update(self.previous_hash.as_bytes());
        ContentHash::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn verify_integrity(&self) -> bool {
        self.record_hash == self.compute_hash()
    }
}

/// Append-only, hash-linked log of intervention records.
#[derive(Default)]
pub struct InterventionLog {
    records: RwLock<Vec<InterventionRecord>>,
}

impl InterventionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal and append a record for `action`.
    pub async fn append(
        &self,
        action: &InterventionAction,
        actions: Vec<SubActionResult>,
        evidence_refs: Vec<EvidenceId>,
        evidence_failure: Option<String>,
    ) -> Result<InterventionRecord, InterventionError> {
        self.push(action, actions, evidence_refs, evidence_failure, None)
            .await
    }

    /// Append the final result of a sub-action that was still running
    /// when the record `original` was written.
    pub async fn append_follow_up(
        &self,
        action: &InterventionAction,
        original: Option<InterventionId>,
        result: SubActionResult,
    ) -> Result<InterventionRecord, InterventionError> {
        self.push(action, vec![result], Vec::new(), None, original)
            .await
    }

    async fn push(
        &self,
        action: &InterventionAction,
        actions: Vec<SubActionResult>,
        evidence_refs: Vec<EvidenceId>,
        evidence_failure: Option<String>,
        follow_up_of: Option<InterventionId>,
    ) -> Result<InterventionRecord, InterventionError> {
        let mut records = self.records.write().await;
        let previous_hash = match records.last() {
            Some(last) if !last.verify_integrity() => {
                return Err(InterventionError::LogCorrupted(records.len() - 1));
            }
            Some(last) => last.record_hash,
            None => ContentHash::zero(),
        };

        let mut record = InterventionRecord {
            id: InterventionId::new(),
            session_id: action.session_id,
            caller: action.caller.clone(),
            trigger_score: action.trigger_score,
            trigger_at_ms: action.trigger_at_ms,
            decided_at_ms: action.decided_at_ms,
            actions,
            evidence_refs,
            evidence_failure,
            follow_up_of,
            previous_hash,
            record_hash: ContentHash::zero(),
        };
        record.record_hash = record.compute_hash();
        records.push(record.clone());

        info!(
            intervention_id = %record.id,
            session_id = %record.session_id,
            evidence = record.evidence_refs.len(),
            follow_up = record.follow_up_of.is_some(),
            "Intervention recorded"
        );
        Ok(record)
    }

    /// Walk the chain, returning the index of the first broken record.
    pub async fn verify_chain(&self) -> Result<(), InterventionError> {
        let records = self.records.read().await;
        let mut expected_prev = ContentHash::zero();
        for (i, record) in records.iter().enumerate() {
            if record.previous_hash != expected_prev || !record.verify_integrity() {
                warn!(index = i, "Intervention log chain broken");
                return Err(InterventionError::LogCorrupted(i));
            }
            expected_prev = record.record_hash;
        }
        Ok(())
    }

    pub async fn for_session(&self, session_id: SessionId) -> Vec<InterventionRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<InterventionRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn tamper<F: FnOnce(&mut InterventionRecord)>(&self, index: usize, f: F) {
        if let Some(r) = self.records.write().await.get_mut(index) {
            f(r);
        }
    }
}
