use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vigil_types::{
    now_ms, CallerId, CoercionScore, EvidenceId, InterventionConfig, InterventionId, PrivacyMode,
    RetryPolicy, SessionId,
};

use crate::action::{ActionStatus, InterventionAction, InterventionOutcome, SubAction, SubActionResult};
use crate::control::CallControl;
use crate::error::InterventionError;
use crate::log::{InterventionLog, InterventionRecord};
use crate::notify::{Notification, NotificationKind, Severity, UserNotifier};
use crate::registry::CallerBlockRegistry;

const WARNING_TEXT: &str = "This call shows the signs of a \"digital arrest\" scam. Police, \
customs and courts never hold you on a video call or ask for money to clear your name. \
The call has been ended and the caller blocked.";

/// Collaborators shared by every session's controller.
#[derive(Clone)]
pub struct InterventionServices {
    pub call_control: Arc<dyn CallControl>,
    pub notifier: Arc<dyn UserNotifier>,
    pub registry: Arc<CallerBlockRegistry>,
    pub log: Arc<InterventionLog>,
}

/// Per-session intervention controller.
pub struct InterventionController {
    session_id: SessionId,
    caller: CallerId,
    config: InterventionConfig,
    services: InterventionServices,
    fired: bool,
    /// Termination that outlived its budget, reported by a follow-up record
    pending_termination: Option<JoinHandle<TaskResult>>,
}

type TaskResult = (Result<(), InterventionError>, u32, u64);

impl InterventionController {
    pub fn new(
        session_id: SessionId,
        caller: CallerId,
        config: InterventionConfig,
        services: InterventionServices,
    ) -> Self {
        Self {
            session_id,
            caller,
            config,
            services,
            fired: false,
            pending_termination: None,
        }
    }

    /// A controller for a session recovered after its intervention already ran.
    pub fn already_fired(
        session_id: SessionId,
        caller: CallerId,
        config: InterventionConfig,
        services: InterventionServices,
    ) -> Self {
        let mut controller = Self::new(session_id, caller, config, services);
        controller.fired = true;
        controller
    }

    /// Decide whether to intervene.
    ///
    /// Fires exactly once, on the first evaluation that sees the session in
    /// evidence mode. Every later call returns `None`.
    pub fn evaluate(&mut self, score: &CoercionScore, mode: PrivacyMode) -> Option<InterventionAction> {
        if self.fired || mode != PrivacyMode::EvidenceCollection {
            return None;
        }
        self.fired = true;
        info!(
            session_id = %self.session_id,
            score = score.value,
            confidence = score.confidence,
            indicators = %score.indicator_summary(),
            "Intervention triggered"
        );
        Some(InterventionAction {
            session_id: self.session_id,
            caller: self.caller.clone(),
            trigger_score: score.value,
            trigger_confidence: score.confidence,
            indicators: score.indicators.clone(),
            trigger_at_ms: score.as_of_ms,
            decided_at_ms: now_ms(),
            block_duration_ms: self.config.block_duration_ms,
        })
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Run the protective bundle.
    ///
    /// Termination runs first under `termination_budget_ms`. The remaining
    /// sub-actions then run concurrently against a shared `action_budget_ms`
    /// deadline; whatever is still running at that point is left to finish
    /// in the background. A termination left running is written up by a
    /// follow-up record once [`finalize`](Self::finalize) has run.
    pub async fn execute(&mut self, action: &InterventionAction) -> InterventionOutcome {
        let started = Instant::now();
        let policy = self.config.retry;

        let mut terminate = {
            let control = self.services.call_control.clone();
            let session = action.session_id;
            tokio::spawn(with_retry(policy, SubAction::TerminateCall, move || {
                let control = control.clone();
                async move { control.terminate(session).await }
            }))
        };
        let termination_budget = Duration::from_millis(self.config.termination_budget_ms);
        let termination = await_within(
            SubAction::TerminateCall,
            &mut terminate,
            started + termination_budget,
        )
        .await;
        if termination.status == ActionStatus::Backgrounded {
            self.pending_termination = Some(terminate);
        }
        let termination_latency_ms = started.elapsed().as_millis() as u64;
        let terminated_within_budget = termination.status == ActionStatus::Succeeded
            && termination_latency_ms <= self.config.termination_budget_ms;

        match &termination.status {
            ActionStatus::Succeeded => info!(
                session_id = %action.session_id,
                latency_ms = termination_latency_ms,
                "Call terminated"
            ),
            ActionStatus::Backgrounded => error!(
                session_id = %action.session_id,
                budget_ms = self.config.termination_budget_ms,
                "Call termination exceeded its budget; still retrying"
            ),
            ActionStatus::Failed(reason) => error!(
                session_id = %action.session_id,
                reason = %reason,
                "Call termination failed"
            ),
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.action_budget_ms);
        let mut transport = self.spawn_transport_failure(action, policy);
        let mut warning = self.spawn_warning(action, policy);
        let mut block = self.spawn_block(action, policy);

        let mut actions = vec![termination];
        actions.push(await_within(SubAction::SimulateTransportFailure, &mut transport, deadline).await);
        actions.push(await_within(SubAction::DisplayWarning, &mut warning, deadline).await);
        actions.push(await_within(SubAction::BlockCaller, &mut block, deadline).await);

        InterventionOutcome {
            session_id: action.session_id,
            termination_latency_ms,
            terminated_within_budget,
            actions,
        }
    }

    /// Write the intervention record and add its status to `outcome`.
    pub async fn finalize(
        &mut self,
        action: &InterventionAction,
        outcome: &mut InterventionOutcome,
        evidence_refs: Vec<EvidenceId>,
        evidence_failure: Option<String>,
    ) -> Result<InterventionRecord, InterventionError> {
        let started = Instant::now();
        let result = self
            .services
            .log
            .append(action, outcome.actions.clone(), evidence_refs, evidence_failure)
            .await;
        let status = match &result {
            Ok(_) => ActionStatus::Succeeded,
            Err(e) => {
                error!(session_id = %action.session_id, error = %e, "Intervention record not written");
                ActionStatus::Failed(e.to_string())
            }
        };
        outcome.actions.push(SubActionResult {
            action: SubAction::WriteRecord,
            status,
            attempts: 1,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });

        if let Some(terminate) = self.pending_termination.take() {
            let original = result.as_ref().ok().map(|record| record.id);
            self.follow_up_termination(action, original, terminate);
        }
        result
    }

    /// Append a follow-up record once a backgrounded termination ends.
    fn follow_up_termination(
        &self,
        action: &InterventionAction,
        original: Option<InterventionId>,
        terminate: JoinHandle<TaskResult>,
    ) {
        let log = self.services.log.clone();
        let action = action.clone();
        tokio::spawn(async move {
            let result = settle(SubAction::TerminateCall, terminate.await);
            match &result.status {
                ActionStatus::Succeeded => info!(
                    session_id = %action.session_id,
                    elapsed_ms = result.elapsed_ms,
                    "Backgrounded call termination finished"
                ),
                status => error!(
                    session_id = %action.session_id,
                    status = status.label(),
                    "Backgrounded call termination did not succeed"
                ),
            }
            if let Err(e) = log.append_follow_up(&action, original, result).await {
                error!(session_id = %action.session_id, error = %e, "Follow-up record not written");
            }
        });
    }

    fn spawn_transport_failure(
        &self,
        action: &InterventionAction,
        policy: RetryPolicy,
    ) -> JoinHandle<TaskResult> {
        let control = self.services.call_control.clone();
        let session = action.session_id;
        tokio::spawn(with_retry(policy, SubAction::SimulateTransportFailure, move || {
            let control = control.clone();
            async move { control.simulate_transport_failure(session).await }
        }))
    }

    fn spawn_warning(&self, action: &InterventionAction, policy: RetryPolicy) -> JoinHandle<TaskResult> {
        let notifier = self.services.notifier.clone();
        let notification = Notification::new(
            action.session_id,
            NotificationKind::FraudWarning,
            Severity::Critical,
            WARNING_TEXT,
        )
        .with_indicators(
            action
                .indicators
                .iter()
                .map(|i| i.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        tokio::spawn(with_retry(policy, SubAction::DisplayWarning, move || {
            let notifier = notifier.clone();
            let notification = notification.clone();
            async move { notifier.notify(notification).await }
        }))
    }

    fn spawn_block(&self, action: &InterventionAction, policy: RetryPolicy) -> JoinHandle<TaskResult> {
        let control = self.services.call_control.clone();
        let registry = self.services.registry.clone();
        let caller = action.caller.clone();
        let session = action.session_id;
        let duration_ms = action.block_duration_ms;
        tokio::spawn(async move {
            let started = Instant::now();
            if let Err(e) = registry.block(&caller, session, duration_ms, now_ms()) {
                return (Err(e), 1, started.elapsed().as_millis() as u64);
            }
            with_retry(policy, SubAction::BlockCaller, move || {
                let control = control.clone();
                let caller = caller.clone();
                async move {
                    control
                        .block_caller(&caller, Duration::from_millis(duration_ms))
                        .await
                }
            })
            .await
        })
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
async fn with_retry<F, Fut>(policy: RetryPolicy, action: SubAction, mut op: F) -> TaskResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), InterventionError>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(()) => return (Ok(()), attempts, started.elapsed().as_millis() as u64),
            Err(e) if attempts >= max_attempts => {
                warn!(action = %action, attempts, error = %e, "Sub-action gave up");
                return (Err(e), attempts, started.elapsed().as_millis() as u64);
            }
            Err(e) => {
                debug!(action = %action, attempt = attempts, error = %e, "Sub-action failed, retrying");
                let backoff = policy.backoff_ms.saturating_mul(attempts as u64);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }
}

/// Result of a finished sub-action task.
fn settle(action: SubAction, joined: Result<TaskResult, JoinError>) -> SubActionResult {
    match joined {
        Ok((result, attempts, elapsed_ms)) => SubActionResult {
            action,
            status: match result {
                Ok(()) => ActionStatus::Succeeded,
                Err(e) => ActionStatus::Failed(e.to_string()),
            },
            attempts,
            elapsed_ms,
        },
        Err(join_error) => SubActionResult {
            action,
            status: ActionStatus::Failed(InterventionError::Task(join_error.to_string()).to_string()),
            attempts: 0,
            elapsed_ms: 0,
        },
    }
}

/// Wait for a sub-action until `deadline`. Past it the task keeps running
/// and `handle` can still be awaited.
async fn await_within(
    action: SubAction,
    handle: &mut JoinHandle<TaskResult>,
    deadline: Instant,
) -> SubActionResult {
    match tokio::time::timeout_at(deadline, handle).await {
        Ok(joined) => settle(action, joined),
        Err(_) => {
            warn!(action = %action, "Sub-action over budget, continuing in background");
            SubActionResult {
                action,
                status: ActionStatus::Backgrounded,
                attempts: 0,
                elapsed_ms: 0,
            }
        }
    }
}
