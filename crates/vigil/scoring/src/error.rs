use thiserror::Error;
use vigil_types::{Classify, ErrorClass, Modality};

/// Errors from the scoring engine. A rejected signal never changes the score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("unrecognized modality: {0}")]
    UnrecognizedModality(Modality),

    #[error("signal at {timestamp_ms}ms arrived beyond the reorder window (watermark {watermark_ms}ms)")]
    OutOfWindow { timestamp_ms: u64, watermark_ms: u64 },

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("signal belongs to another session")]
    ForeignSession,

    #[error("signal buffer budget exhausted: requested {requested} bytes, {available} available")]
    BufferExhausted { requested: usize, available: usize },
}

impl Classify for ScoringError {
    fn class(&self) -> ErrorClass {
        match self {
            ScoringError::BufferExhausted { .. } => ErrorClass::Critical,
            _ => ErrorClass::Data,
        }
    }
}
