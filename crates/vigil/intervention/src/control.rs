use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use vigil_types::{CallerId, SessionId};

use crate::error::InterventionError;

/// Call platform collaborator.
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn terminate(&self, session_id: SessionId) -> Result<(), InterventionError>;

    /// Make the call look like it dropped, so the caller does not learn they
    /// were detected.
    async fn simulate_transport_failure(&self, session_id: SessionId) -> Result<(), InterventionError>;

    async fn block_caller(&self, caller: &CallerId, duration: Duration) -> Result<(), InterventionError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallControlEvent {
    Terminated(SessionId),
    TransportFailureSimulated(SessionId),
    CallerBlocked { caller: CallerId, duration_ms: u64 },
}

/// In-process call platform for tests and the simulator.
///
/// Each operation can be slowed down or made to fail a fixed number of
/// times before succeeding.
#[derive(Default)]
pub struct SimulatedCallControl {
    latency: Duration,
    terminate_latency: Option<Duration>,
    terminate_failures: AtomicU32,
    transport_failures: AtomicU32,
    block_failures: AtomicU32,
    events: RwLock<Vec<CallControlEvent>>,
}

impl SimulatedCallControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latency applied to every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Latency applied to `terminate` only, overriding `with_latency`.
    pub fn with_terminate_latency(mut self, latency: Duration) -> Self {
        self.terminate_latency = Some(latency);
        self
    }

    pub fn failing_terminate(self, times: u32) -> Self {
        self.terminate_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_transport(self, times: u32) -> Self {
        self.transport_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_block(self, times: u32) -> Self {
        self.block_failures.store(times, Ordering::SeqCst);
        self
    }

    pub async fn events(&self) -> Vec<CallControlEvent> {
        self.events.read().await.clone()
    }

    pub async fn terminated(&self, session_id: SessionId) -> bool {
        self.events
            .read()
            .await
            .contains(&CallControlEvent::Terminated(session_id))
    }

    async fn pause(&self, latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Consume one scheduled failure, if any remain.
    fn should_fail(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CallControl for SimulatedCallControl {
    async fn terminate(&self, session_id: SessionId) -> Result<(), InterventionError> {
        self.pause(self.terminate_latency.unwrap_or(self.latency)).await;
        if Self::should_fail(&self.terminate_failures) {
            return Err(InterventionError::CallControl("terminate rejected".into()));
        }
        debug!(session_id = %session_id, "Call terminated");
        self.events
            .write()
            .await
            .push(CallControlEvent::Terminated(session_id));
        Ok(())
    }

    async fn simulate_transport_failure(&self, session_id: SessionId) -> Result<(), InterventionError> {
        self.pause(self.latency).await;
        if Self::should_fail(&self.transport_failures) {
            return Err(InterventionError::CallControl("transport control unavailable".into()));
        }
        self.events
            .write()
            .await
            .push(CallControlEvent::TransportFailureSimulated(session_id));
        Ok(())
    }

    async fn block_caller(&self, caller: &CallerId, duration: Duration) -> Result<(), InterventionError> {
        self.pause(self.latency).await;
        if Self::should_fail(&self.block_failures) {
            return Err(InterventionError::CallControl("block list unavailable".into()));
        }
        self.events.write().await.push(CallControlEvent::CallerBlocked {
            caller: caller.clone(),
            duration_ms: duration.as_millis() as u64,
        });
        Ok(())
    }
}
