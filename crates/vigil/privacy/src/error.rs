use thiserror::Error;
use vigil_types::{Classify, ErrorClass, PrivacyMode};

/// Errors from the privacy state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrivacyError {
    #[error("invalid privacy transition: {from} -> {to}")]
    InvalidTransition { from: PrivacyMode, to: PrivacyMode },

    #[error("privacy state machine is poisoned after a fatal transition")]
    Poisoned,

    #[error("non-finite score {0} presented to the privacy state machine")]
    NonFiniteScore(f64),

    #[error("evidence collection cannot be requested from {0}; it must be reached by score")]
    EvidenceNotEarned(PrivacyMode),
}

impl Classify for PrivacyError {
    fn class(&self) -> ErrorClass {
        match self {
            PrivacyError::InvalidTransition { .. } | PrivacyError::Poisoned => ErrorClass::Fatal,
            PrivacyError::NonFiniteScore(_) | PrivacyError::EvidenceNotEarned(_) => ErrorClass::Data,
        }
    }
}
