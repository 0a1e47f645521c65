use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_types::{CallerId, IndicatorKind, SessionId};

/// The decision to intervene, produced once per session by `evaluate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterventionAction {
    pub session_id: SessionId,
    pub caller: CallerId,
    pub trigger_score: f64,
    pub trigger_confidence: f64,
    pub indicators: BTreeSet<IndicatorKind>,
    /// Score watermark at the moment of decision
    pub trigger_at_ms: u64,
    /// Wall clock at the moment of decision
    pub decided_at_ms: u64,
    pub block_duration_ms: u64,
}

/// One part of the protective bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubAction {
    TerminateCall,
    SimulateTransportFailure,
    DisplayWarning,
    BlockCaller,
    WriteRecord,
}

impl SubAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubAction::TerminateCall => "terminate-call",
            SubAction::SimulateTransportFailure => "simulate-transport-failure",
            SubAction::DisplayWarning => "display-warning",
            SubAction::BlockCaller => "block-caller",
            SubAction::WriteRecord => "write-record",
        }
    }
}

impl fmt::Display for SubAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ActionStatus {
    Succeeded,
    Failed(String),
    /// Outlived its budget; still running best-effort.
    Backgrounded,
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed(_) => "failed",
            ActionStatus::Backgrounded => "backgrounded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubActionResult {
    pub action: SubAction,
    pub status: ActionStatus,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Aggregate result of executing an [`InterventionAction`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterventionOutcome {
    pub session_id: SessionId,
    /// Decision-to-termination latency
    pub termination_latency_ms: u64,
    pub terminated_within_budget: bool,
    pub actions: Vec<SubActionResult>,
}

impl InterventionOutcome {
    pub fn status_of(&self, action: SubAction) -> Option<&ActionStatus> {
        self.actions
            .iter()
            .find(|r| r.action == action)
            .map(|r| &r.status)
    }

    pub fn call_terminated(&self) -> bool {
        self.status_of(SubAction::TerminateCall) == Some(&ActionStatus::Succeeded)
    }

    pub fn all_succeeded(&self) -> bool {
        self.actions
            .iter()
            .all(|r| r.status == ActionStatus::Succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubActionResult> {
        self.actions
            .iter()
            .filter(|r| matches!(r.status, ActionStatus::Failed(_)))
    }
}
