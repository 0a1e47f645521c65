use thiserror::Error;
use vigil_evidence::EvidenceError;
use vigil_intervention::InterventionError;
use vigil_types::{CallerId, Classify, ConfigError, ErrorClass, SessionId};

/// Failures of an analysis capability call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("analysis timed out after {0}ms")]
    Timeout(u64),

    #[error("analysis capability unavailable: {0}")]
    Unavailable(String),
}

impl Classify for AnalysisError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Transient
    }
}

/// Errors surfaced by the session coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("session capacity exceeded ({max_sessions} active)")]
    CapacityExceeded { max_sessions: usize },

    #[error("caller {0} is blocked")]
    CallerBlocked(CallerId),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session {0} already active")]
    SessionExists(SessionId),

    #[error("session {0} is shutting down")]
    SessionClosed(SessionId),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Intervention(#[from] InterventionError),
}

impl Classify for CoordinatorError {
    fn class(&self) -> ErrorClass {
        match self {
            CoordinatorError::CapacityExceeded { .. } => ErrorClass::Critical,
            CoordinatorError::Config(_) => ErrorClass::Fatal,
            CoordinatorError::Evidence(e) => e.class(),
            CoordinatorError::Intervention(e) => e.class(),
            CoordinatorError::CallerBlocked(_)
            | CoordinatorError::UnknownSession(_)
            | CoordinatorError::SessionExists(_)
            | CoordinatorError::SessionClosed(_) => ErrorClass::Data,
        }
    }
}
