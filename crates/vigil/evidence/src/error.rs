use thiserror::Error;
use vigil_types::{Classify, ErrorClass, EvidenceId, PrivacyMode};

/// Errors from the evidence path.
///
/// Crypto and chain failures are Critical: the caller logs them and carries
/// on with protection, never blocks on them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvidenceError {
    #[error("evidence can only be sealed in evidence-collection mode (session is {0})")]
    NotInEvidenceMode(PrivacyMode),

    #[error("key encapsulation failed: {0}")]
    KeyEncapsulation(String),

    #[error("payload encryption failed: {0}")]
    Encryption(String),

    #[error("payload decryption failed: {0}")]
    Decryption(String),

    #[error("custody chain broken at entry {0}")]
    ChainBroken(u64),

    #[error("integrity check failed: {0}")]
    IntegrityViolation(String),

    #[error("artifact {index} of record {record} has no sealed payload")]
    NoPayload { record: EvidenceId, index: usize },

    #[error("evidence record {0} not found")]
    NotFound(EvidenceId),

    #[error("evidence record {0} already stored")]
    AlreadyExists(EvidenceId),

    #[error("evidence store failure: {0}")]
    Store(String),

    #[error("evidence key file: {0}")]
    KeyFile(String),
}

impl Classify for EvidenceError {
    fn class(&self) -> ErrorClass {
        match self {
            EvidenceError::NotInEvidenceMode(_) => ErrorClass::Fatal,
            EvidenceError::NoPayload { .. } | EvidenceError::NotFound(_) => ErrorClass::Data,
            _ => ErrorClass::Critical,
        }
    }
}
