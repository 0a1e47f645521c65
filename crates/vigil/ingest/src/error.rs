use thiserror::Error;
use vigil_types::{Classify, ErrorClass, Modality};

/// Per-signal rejections at the ingest boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("duplicate delivery: {modality} chunk at {timestamp_ms}ms")]
    Duplicate { modality: Modality, timestamp_ms: u64 },

    #[error("score contribution {0} outside 0..=100")]
    ScoreOutOfRange(f64),

    #[error("confidence {0} outside 0..=1")]
    ConfidenceOutOfRange(f64),

    #[error("analysis answered for {reported} but {requested} was requested")]
    ModalityMismatch { requested: Modality, reported: Modality },

    #[error("chunk belongs to another session")]
    ForeignSession,
}

impl Classify for IngestError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Data
    }
}
