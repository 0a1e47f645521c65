use serde::{Deserialize, Serialize};
use tracing::{error, info};
use vigil_types::{Classify, ErrorClass, PrivacyMode, SessionId};

use crate::error::PrivacyError;
use crate::state::{step, PrivacyCommand, PrivacyInput, PrivacyState, Transition, TransitionPolicy};

/// One recorded mode change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub from: PrivacyMode,
    pub to: PrivacyMode,
    pub at_ms: u64,
    pub commands: Vec<PrivacyCommand>,
}

/// A session's privacy state plus its transition history.
///
/// A fatal transition poisons the machine: every later input is refused and
/// the owner is expected to terminate the session and flag it for audit.
pub struct PrivacyMachine {
    session_id: SessionId,
    policy: TransitionPolicy,
    state: PrivacyState,
    history: Vec<TransitionLogEntry>,
    poisoned: bool,
}

impl PrivacyMachine {
    pub fn new(session_id: SessionId, policy: TransitionPolicy) -> Self {
        Self {
            session_id,
            policy,
            state: PrivacyState::MemoryOnly,
            history: Vec::new(),
            poisoned: false,
        }
    }

    /// Rebuild a machine after a crash, directly in `mode`.
    ///
    /// No commands are produced: a session resumed in evidence mode has
    /// already notified the user and opened its chain.
    pub fn resume(
        session_id: SessionId,
        policy: TransitionPolicy,
        mode: PrivacyMode,
        at_ms: u64,
    ) -> Self {
        let state = match mode {
            PrivacyMode::MemoryOnly => PrivacyState::MemoryOnly,
            PrivacyMode::EphemeralAnalysis => PrivacyState::EphemeralAnalysis {
                below_since_ms: None,
            },
            PrivacyMode::EvidenceCollection => PrivacyState::EvidenceCollection {
                entered_at_ms: at_ms,
            },
        };
        info!(session_id = %session_id, mode = %mode, "Privacy state resumed");
        Self {
            session_id,
            policy,
            state,
            history: Vec::new(),
            poisoned: false,
        }
    }

    pub fn apply(&mut self, input: PrivacyInput) -> Result<Transition, PrivacyError> {
        if self.poisoned {
            return Err(PrivacyError::Poisoned);
        }
        let transition = match step(&self.policy, self.state, input) {
            Ok(t) => t,
            Err(e) => {
                if e.class() == ErrorClass::Fatal {
                    self.poisoned = true;
                    error!(
                        session_id = %self.session_id,
                        mode = %self.state.mode(),
                        error = %e,
                        "Fatal privacy transition; session must be terminated"
                    );
                }
                return Err(e);
            }
        };

        if transition.changed() {
            let at_ms = match input {
                PrivacyInput::Score { at_ms, .. }
                | PrivacyInput::Tick { at_ms }
                | PrivacyInput::Request { at_ms, .. } => at_ms,
            };
            info!(
                session_id = %self.session_id,
                from = %transition.from,
                to = %transition.to(),
                "Privacy mode changed"
            );
            self.history.push(TransitionLogEntry {
                from: transition.from,
                to: transition.to(),
                at_ms,
                commands: transition.commands.clone(),
            });
        }
        self.state = transition.next;
        Ok(transition)
    }

    pub fn state(&self) -> PrivacyState {
        self.state
    }

    pub fn mode(&self) -> PrivacyMode {
        self.state.mode()
    }

    pub fn history(&self) -> &[TransitionLogEntry] {
        &self.history
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn policy(&self) -> &TransitionPolicy {
        &self.policy
    }

    /// Capture time at which a tick would end the current debounce, if
    /// the session is counting one down.
    pub fn debounce_deadline(&self) -> Option<u64> {
        if self.poisoned {
            return None;
        }
        match self.state {
            PrivacyState::EphemeralAnalysis {
                below_since_ms: Some(since),
            } => Some(since.saturating_add(self.policy.debounce_ms)),
            _ => None,
        }
    }
}
