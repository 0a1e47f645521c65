use serde::{Deserialize, Serialize};
use vigil_types::{CoercionScore, PrivacyConfig, PrivacyMode, Thresholds};

use crate::error::PrivacyError;

/// Privacy state of one session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrivacyState {
    MemoryOnly,
    EphemeralAnalysis {
        /// When the score last dropped below suspicion, if it is below now.
        below_since_ms: Option<u64>,
    },
    EvidenceCollection {
        entered_at_ms: u64,
    },
}

impl PrivacyState {
    pub fn mode(&self) -> PrivacyMode {
        match self {
            PrivacyState::MemoryOnly => PrivacyMode::MemoryOnly,
            PrivacyState::EphemeralAnalysis { .. } => PrivacyMode::EphemeralAnalysis,
            PrivacyState::EvidenceCollection { .. } => PrivacyMode::EvidenceCollection,
        }
    }
}

impl Default for PrivacyState {
    fn default() -> Self {
        PrivacyState::MemoryOnly
    }
}

/// What drives the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrivacyInput {
    /// A freshly computed score.
    Score {
        value: f64,
        /// Highest raw signal observed in the window
        peak_signal: f64,
        at_ms: u64,
    },
    /// Time passing without a new score (debounce evaluation).
    Tick { at_ms: u64 },
    /// An explicit request to move to a mode, e.g. from an operator console.
    /// Evidence collection cannot be requested; only a score past both the
    /// intervention threshold and the pre-trigger floor reaches it.
    Request { mode: PrivacyMode, at_ms: u64 },
}

impl PrivacyInput {
    pub fn from_score(score: &CoercionScore) -> Self {
        PrivacyInput::Score {
            value: score.value,
            peak_signal: score.peak_signal,
            at_ms: score.as_of_ms,
        }
    }
}

/// Side effects a transition asks the session to carry out, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyCommand {
    /// Start keeping derived artifacts (hashes, indicators) of consumed signals.
    RetainDerivedArtifacts,
    /// Irrecoverably discard every buffered artifact of the session.
    PurgeBufferedContent,
    /// Tell the user evidence capture is about to begin. Issued before
    /// `BeginEvidenceCapture`; nothing may be sealed until it has completed.
    NotifyEvidenceMode,
    /// Open the session's evidence chain and start retaining raw content.
    BeginEvidenceCapture,
}

/// Result of one [`step`].
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub from: PrivacyMode,
    pub next: PrivacyState,
    pub commands: Vec<PrivacyCommand>,
}

impl Transition {
    fn stay(state: PrivacyState) -> Self {
        Self {
            from: state.mode(),
            next: state,
            commands: Vec::new(),
        }
    }

    pub fn to(&self) -> PrivacyMode {
        self.next.mode()
    }

    pub fn changed(&self) -> bool {
        self.from != self.to()
    }

    pub fn entered_evidence(&self) -> bool {
        self.from != PrivacyMode::EvidenceCollection
            && self.to() == PrivacyMode::EvidenceCollection
    }
}

/// Thresholds and timing the transition function works with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionPolicy {
    pub thresholds: Thresholds,
    /// Minimum raw signal that must have been observed before evidence mode
    pub pre_trigger_floor: f64,
    pub debounce_ms: u64,
}

impl TransitionPolicy {
    pub fn new(config: &PrivacyConfig, thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            pre_trigger_floor: config.pre_trigger_floor(&thresholds),
            debounce_ms: config.debounce_ms,
        }
    }
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        let config = PrivacyConfig::default();
        Self::new(&config, config.thresholds)
    }
}

/// The transition function.
///
/// Pure: the same state and input always yield the same transition.
pub fn step(
    policy: &TransitionPolicy,
    state: PrivacyState,
    input: PrivacyInput,
) -> Result<Transition, PrivacyError> {
    match input {
        PrivacyInput::Score {
            value,
            peak_signal,
            at_ms,
        } => {
            if !value.is_finite() {
                return Err(PrivacyError::NonFiniteScore(value));
            }
            Ok(on_score(policy, state, value, peak_signal, at_ms))
        }
        PrivacyInput::Tick { at_ms } => Ok(on_tick(policy, state, at_ms)),
        PrivacyInput::Request { mode, .. } => on_request(state, mode),
    }
}

fn on_score(
    policy: &TransitionPolicy,
    state: PrivacyState,
    value: f64,
    peak_signal: f64,
    at_ms: u64,
) -> Transition {
    let t = &policy.thresholds;
    let evidence_ready = value >= t.intervention && peak_signal >= policy.pre_trigger_floor;

    match state {
        PrivacyState::EvidenceCollection { .. } => Transition::stay(state),

        PrivacyState::MemoryOnly if evidence_ready => Transition {
            from: PrivacyMode::MemoryOnly,
            next: PrivacyState::EvidenceCollection {
                entered_at_ms: at_ms,
            },
            commands: vec![
                PrivacyCommand::RetainDerivedArtifacts,
                PrivacyCommand::NotifyEvidenceMode,
                PrivacyCommand::BeginEvidenceCapture,
            ],
        },
        PrivacyState::MemoryOnly if value >= t.suspicion => Transition {
            from: PrivacyMode::MemoryOnly,
            next: PrivacyState::EphemeralAnalysis {
                below_since_ms: None,
            },
            commands: vec![PrivacyCommand::RetainDerivedArtifacts],
        },
        PrivacyState::MemoryOnly => Transition::stay(state),

        PrivacyState::EphemeralAnalysis { .. } if evidence_ready => Transition {
            from: PrivacyMode::EphemeralAnalysis,
            next: PrivacyState::EvidenceCollection {
                entered_at_ms: at_ms,
            },
            commands: vec![
                PrivacyCommand::NotifyEvidenceMode,
                PrivacyCommand::BeginEvidenceCapture,
            ],
        },
        PrivacyState::EphemeralAnalysis { .. } if value >= t.suspicion => {
            Transition::stay(PrivacyState::EphemeralAnalysis {
                below_since_ms: None,
            })
        }
        PrivacyState::EphemeralAnalysis { below_since_ms } => {
            let since = below_since_ms.unwrap_or(at_ms);
            debounce(policy, since, at_ms)
        }
    }
}

fn on_tick(policy: &TransitionPolicy, state: PrivacyState, at_ms: u64) -> Transition {
    match state {
        PrivacyState::EphemeralAnalysis {
            below_since_ms: Some(since),
        } => debounce(policy, since, at_ms),
        _ => Transition::stay(state),
    }
}

/// EphemeralAnalysis while below suspicion since `since`.
fn debounce(policy: &TransitionPolicy, since: u64, at_ms: u64) -> Transition {
    if at_ms.saturating_sub(since) >= policy.debounce_ms {
        Transition {
            from: PrivacyMode::EphemeralAnalysis,
            next: PrivacyState::MemoryOnly,
            commands: vec![PrivacyCommand::PurgeBufferedContent],
        }
    } else {
        Transition::stay(PrivacyState::EphemeralAnalysis {
            below_since_ms: Some(since),
        })
    }
}

fn on_request(state: PrivacyState, mode: PrivacyMode) -> Result<Transition, PrivacyError> {
    let from = state.mode();
    if from == mode {
        return Ok(Transition::stay(state));
    }
    match (state, mode) {
        (PrivacyState::EvidenceCollection { .. }, to) => {
            Err(PrivacyError::InvalidTransition { from, to })
        }
        (_, PrivacyMode::EvidenceCollection) => Err(PrivacyError::EvidenceNotEarned(from)),
        (_, PrivacyMode::EphemeralAnalysis) => Ok(Transition {
            from,
            next: PrivacyState::EphemeralAnalysis {
                below_since_ms: None,
            },
            commands: vec![PrivacyCommand::RetainDerivedArtifacts],
        }),
        (_, PrivacyMode::MemoryOnly) => Ok(Transition {
            from,
            next: PrivacyState::MemoryOnly,
            commands: vec![PrivacyCommand::PurgeBufferedContent],
        }),
    }
}
