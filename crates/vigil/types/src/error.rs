use serde::{Deserialize, Serialize};

/// Severity class shared by every error in the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Analysis timeout or outage. Scoring degrades, nothing is rejected.
    Transient,
    /// Malformed, out-of-window or unrecognized input. Only that input is dropped.
    Data,
    /// Crypto, hashing, capacity or registry failure. Protection still proceeds.
    Critical,
    /// State machine corruption. The session is terminated and flagged for audit.
    Fatal,
}

impl ErrorClass {
    /// Only Critical and Fatal failures during an active intervention reach the user.
    pub fn is_user_visible(self, intervention_active: bool) -> bool {
        intervention_active && matches!(self, ErrorClass::Critical | ErrorClass::Fatal)
    }

    /// Critical and Fatal errors are surfaced immediately rather than aggregated.
    pub fn is_immediate(self) -> bool {
        matches!(self, ErrorClass::Critical | ErrorClass::Fatal)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Data => "data",
            ErrorClass::Critical => "critical",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Errors that know their [`ErrorClass`].
pub trait Classify {
    fn class(&self) -> ErrorClass;
}
