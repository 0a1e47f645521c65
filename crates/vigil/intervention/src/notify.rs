use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use vigil_types::{EvidenceId, SessionId};

use crate::error::InterventionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// Evidence capture is about to begin.
    EvidenceModeEntered,
    /// The call was judged fraudulent and acted on.
    FraudWarning,
    /// Analysis has been unavailable for a sustained period.
    AnalysisDegraded,
    /// A Critical or Fatal failure during an active intervention.
    ProtectionFailure,
    /// A blocked caller tried to reach the user again.
    CallRefused,
    /// Evidence for the call was sealed; carries the record reference.
    EvidenceSealed,
}

/// Structured user-facing warning. Rendering and localization happen in
/// the UI collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub session_id: SessionId,
    pub kind: NotificationKind,
    pub severity: Severity,
    pub indicator_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<EvidenceId>,
    pub message: String,
}

impl Notification {
    pub fn new(
        session_id: SessionId,
        kind: NotificationKind,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            kind,
            severity,
            indicator_summary: String::new(),
            evidence_ref: None,
            message: message.into(),
        }
    }

    pub fn with_indicators(mut self, summary: impl Into<String>) -> Self {
        self.indicator_summary = summary.into();
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceId) -> Self {
        self.evidence_ref = Some(evidence);
        self
    }
}

/// User notification collaborator.
#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), InterventionError>;
}

/// Notifier that keeps everything it was asked to show.
#[derive(Default)]
pub struct RecordingNotifier {
    delays: Vec<(NotificationKind, Duration)>,
    delivered: RwLock<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `latency` to deliver notifications of `kind`.
    pub fn with_latency(mut self, kind: NotificationKind, latency: Duration) -> Self {
        self.delays.push((kind, latency));
        self
    }

    pub async fn delivered(&self) -> Vec<Notification> {
        self.delivered.read().await.clone()
    }

    pub async fn for_session(&self, session_id: SessionId) -> Vec<Notification> {
        self.delivered
            .read()
            .await
            .iter()
            .filter(|n| n.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserNotifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), InterventionError> {
        if let Some((_, latency)) = self.delays.iter().find(|(kind, _)| *kind == notification.kind) {
            tokio::time::sleep(*latency).await;
        }
        info!(
            session_id = %notification.session_id,
            kind = ?notification.kind,
            severity = ?notification.severity,
            "User notified"
        );
        self.delivered.write().await.push(notification);
        Ok(())
    }
}
