use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_evidence::{EvidenceError, EvidenceRecord};
use vigil_intervention::InterventionRecord;
use vigil_types::SessionId;

/// Exportable bundle of everything recorded about one session.
///
/// Self-contained: `verify` needs nothing beyond the report itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub session_id: SessionId,
    pub generated_at: DateTime<Utc>,
    /// Ed25519 public key every evidence record must be signed with
    #[serde(with = "hex::serde")]
    pub signer: Vec<u8>,
    pub evidence: Vec<EvidenceRecord>,
    pub interventions: Vec<InterventionRecord>,
}

impl EvidenceReport {
    pub fn new(
        session_id: SessionId,
        signer: Vec<u8>,
        evidence: Vec<EvidenceRecord>,
        interventions: Vec<InterventionRecord>,
    ) -> Self {
        Self {
            session_id,
            generated_at: Utc::now(),
            signer,
            evidence,
            interventions,
        }
    }

    /// Check every record's custody chain, digest and signature, and every
    /// intervention record's hash.
    pub fn verify(&self) -> Result<(), EvidenceError> {
        for record in &self.evidence {
            if record.session_id != self.session_id {
                return Err(EvidenceError::IntegrityViolation(format!(
                    "record {} belongs to session {}",
                    record.id, record.session_id
                )));
            }
            if record.proof.signer != self.signer {
                return Err(EvidenceError::IntegrityViolation(format!(
                    "record {} signed by an unexpected key",
                    record.id
                )));
            }
            record.verify()?;
        }
        for intervention in &self.interventions {
            if intervention.session_id != self.session_id || !intervention.verify_integrity() {
                return Err(EvidenceError::IntegrityViolation(format!(
                    "intervention record {} altered",
                    intervention.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
