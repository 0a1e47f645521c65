use thiserror::Error;
use vigil_types::{Classify, ErrorClass};

/// Errors from intervention sub-actions and their bookkeeping.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterventionError {
    #[error("call control failed: {0}")]
    CallControl(String),

    #[error("user notification failed: {0}")]
    Notification(String),

    #[error("{action} exceeded its {budget_ms}ms budget")]
    BudgetExceeded { action: String, budget_ms: u64 },

    #[error("caller block registry corrupted: {0}")]
    RegistryCorrupted(String),

    #[error("intervention log chain broken at record {0}")]
    LogCorrupted(usize),

    #[error("background task failed: {0}")]
    Task(String),
}

impl Classify for InterventionError {
    fn class(&self) -> ErrorClass {
        match self {
            InterventionError::Notification(_) => ErrorClass::Transient,
            _ => ErrorClass::Critical,
        }
    }
}
