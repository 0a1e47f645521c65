use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use vigil_ingest::{CaptureChunk, IngestStats};
use vigil_intervention::InterventionOutcome;
use vigil_privacy::TransitionLogEntry;
use vigil_scoring::ScoringStats;
use vigil_types::{CallerId, CoercionScore, EvidenceId, PrivacyMode, SessionId, Signal};

/// Call-start notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionStart {
    pub caller: CallerId,
    pub participants: u32,
    /// Named threshold profile, e.g. a region or user override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl SessionStart {
    pub fn new(caller: CallerId) -> Self {
        Self {
            caller,
            participants: 2,
            profile: None,
        }
    }

    pub fn with_participants(mut self, participants: u32) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Messages from the coordinator to a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// A raw capture chunk to be sent for analysis.
    Chunk(CaptureChunk),
    /// An already analyzed signal.
    Signal(Signal),
    /// Capture clock advanced without new analysis results.
    Tick { at_ms: u64 },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Call ended.
    End(oneshot::Sender<SessionSummary>),
}

/// Why a session task stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    CallEnded,
    /// Post-intervention cooldown elapsed.
    CooldownElapsed,
    /// Unrecoverable state corruption; flagged for audit.
    Fatal,
    CoordinatorGone,
}

/// Read-only view of a live session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub caller: CallerId,
    pub participants: u32,
    pub started_at_ms: u64,
    pub mode: PrivacyMode,
    pub score: CoercionScore,
    pub intervened: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervention: Option<InterventionOutcome>,
    pub evidence: Vec<EvidenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_failure: Option<String>,
    pub transitions: Vec<TransitionLogEntry>,
    pub ingest: IngestStats,
    pub scoring: ScoringStats,
    /// Bytes of raw capture and scoring state held against the shared budget
    pub buffered_bytes: usize,
    /// Derived artifacts held in ephemeral analysis
    pub ephemeral_artifacts: usize,
    /// Signals with raw content awaiting the next seal
    pub pending_evidence: usize,
    /// Analysis is running on cached results
    pub degraded: bool,
}

/// Final state of an ended session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub snapshot: SessionSnapshot,
    pub reason: EndReason,
    pub ended_at_ms: u64,
}

/// A session flagged for manual audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFlag {
    pub session_id: SessionId,
    pub caller: CallerId,
    pub reason: String,
    pub flagged_at_ms: u64,
}
