//! Session registry and admission control.
//!
//! Every session runs as its own task and owns its scoring, privacy and
//! intervention state outright. The coordinator only routes commands to
//! that task by id; sessions share nothing but the caller block registry,
//! the intervention log and two byte budgets.
//!
//! Derived scoring state and raw chunks waiting for analysis draw on
//! separate budgets. Every session's scoring window holds a reserve of its
//! own and every session may hold at most `session_chunk_bytes` of raw
//! chunks, so one session under load cannot starve another of either.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use vigil_evidence::{
    spawn_retention_sweeper, EvidenceCipher, EvidenceError, EvidenceLocker, EvidenceSigner,
    EvidenceStore,
};
use vigil_ingest::CaptureChunk;
use vigil_intervention::{
    CallControl, CallerBlockRegistry, InterventionLog, InterventionServices, Notification,
    NotificationKind, Severity, UserNotifier,
};
use vigil_scoring::BufferBudget;
use vigil_types::{now_ms, CallerId, EngineConfig, EvidenceId, SessionId, Signal};

use crate::analysis::AnalysisCapability;
use crate::command::{AuditFlag, SessionCommand, SessionSnapshot, SessionStart, SessionSummary};
use crate::error::CoordinatorError;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::report::EvidenceReport;
use crate::worker::{deliver, SessionWorker};

/// External collaborators of a coordinator.
#[derive(Clone)]
pub struct CoordinatorServices {
    pub call_control: Arc<dyn CallControl>,
    pub notifier: Arc<dyn UserNotifier>,
    pub analysis: Arc<dyn AnalysisCapability>,
    pub store: Arc<dyn EvidenceStore>,
    pub cipher: Arc<dyn EvidenceCipher>,
    pub signer: Arc<EvidenceSigner>,
}

pub(crate) struct SessionHandle {
    pub(crate) tx: mpsc::Sender<SessionCommand>,
    pub(crate) caller: CallerId,
}

/// State shared between the coordinator and its session tasks.
pub(crate) struct Shared {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) intervention: InterventionServices,
    pub(crate) analysis: Arc<dyn AnalysisCapability>,
    pub(crate) store: Arc<dyn EvidenceStore>,
    pub(crate) cipher: Arc<dyn EvidenceCipher>,
    pub(crate) signer: Arc<EvidenceSigner>,
    pub(crate) budget: Arc<BufferBudget>,
    pub(crate) chunk_budget: Arc<BufferBudget>,
    pub(crate) metrics: EngineMetrics,
    pub(crate) audit: RwLock<Vec<AuditFlag>>,
    pub(crate) sessions: DashMap<SessionId, SessionHandle>,
    pub(crate) completed: DashMap<SessionId, SessionSummary>,
}

impl Shared {
    pub(crate) async fn flag_for_audit(&self, flag: AuditFlag) {
        warn!(
            session_id = %flag.session_id,
            caller = %flag.caller,
            reason = %flag.reason,
            "Session flagged for audit"
        );
        self.audit.write().await.push(flag);
    }
}

/// Entry point of the engine: starts, routes to and ends call sessions.
pub struct SessionCoordinator {
    shared: Arc<Shared>,
    slots: Arc<Semaphore>,
}

impl SessionCoordinator {
    pub fn new(config: EngineConfig, services: CoordinatorServices) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let budget = Arc::new(BufferBudget::new(config.scoring.buffer_budget_bytes));
        let chunk_budget = Arc::new(BufferBudget::new(config.coordinator.chunk_budget_bytes));
        let slots = Arc::new(Semaphore::new(config.coordinator.max_sessions));
        info!(
            max_sessions = config.coordinator.max_sessions,
            buffer_budget_bytes = config.scoring.buffer_budget_bytes,
            chunk_budget_bytes = config.coordinator.chunk_budget_bytes,
            cipher_suite = services.cipher.suite(),
            "Session coordinator ready"
        );

        let shared = Shared {
            config: Arc::new(config),
            intervention: InterventionServices {
                call_control: services.call_control,
                notifier: services.notifier,
                registry: Arc::new(CallerBlockRegistry::new()),
                log: Arc::new(InterventionLog::new()),
            },
            analysis: services.analysis,
            store: services.store,
            cipher: services.cipher,
            signer: services.signer,
            budget,
            chunk_budget,
            metrics: EngineMetrics::default(),
            audit: RwLock::new(Vec::new()),
            sessions: DashMap::new(),
            completed: DashMap::new(),
        };
        Ok(Self {
            shared: Arc::new(shared),
            slots,
        })
    }

    /// Open a session for a new call.
    ///
    /// Calls from a blocked caller are terminated and refused. When every
    /// slot is taken, waits up to `admission_wait_ms` for one to free up.
    pub async fn start_session(&self, start: SessionStart) -> Result<SessionId, CoordinatorError> {
        let session_id = SessionId::new();
        if self
            .shared
            .intervention
            .registry
            .is_blocked(&start.caller, now_ms())
        {
            return Err(self.refuse(session_id, start.caller).await);
        }
        self.open(session_id, start, None).await
    }

    /// Reopen a session after a restart.
    ///
    /// If the store holds evidence for `session_id`, the session comes back
    /// in evidence mode on the same custody chain, already intervened, with
    /// no repeated notification. Otherwise it starts fresh under that id.
    pub async fn resume_session(
        &self,
        session_id: SessionId,
        mut start: SessionStart,
    ) -> Result<SessionId, CoordinatorError> {
        if self.shared.sessions.contains_key(&session_id) {
            return Err(CoordinatorError::SessionExists(session_id));
        }

        let Some(latest) = self.shared.store.latest_for_session(&session_id).await? else {
            if self
                .shared
                .intervention
                .registry
                .is_blocked(&start.caller, now_ms())
            {
                return Err(self.refuse(session_id, start.caller).await);
            }
            return self.open(session_id, start, None).await;
        };

        let locker = EvidenceLocker::resume(
            &latest,
            self.shared.cipher.clone(),
            self.shared.signer.clone(),
            &self.shared.config.evidence,
        )?;
        if !locker.verify(&latest) {
            return Err(EvidenceError::IntegrityViolation(
                "stored evidence was sealed by a different signer".into(),
            )
            .into());
        }
        let evidence: Vec<EvidenceId> = self
            .shared
            .store
            .for_session(&session_id)
            .await?
            .iter()
            .map(|r| r.id)
            .collect();
        info!(
            session_id = %session_id,
            evidence = evidence.len(),
            custody_entries = locker.chain().len(),
            "Resuming session from its evidence chain"
        );
        start.caller = latest.caller.clone();
        self.open(session_id, start, Some((locker, evidence))).await
    }

    async fn open(
        &self,
        session_id: SessionId,
        start: SessionStart,
        recovered: Option<(EvidenceLocker, Vec<EvidenceId>)>,
    ) -> Result<SessionId, CoordinatorError> {
        let coordinator = &self.shared.config.coordinator;
        let wait = Duration::from_millis(coordinator.admission_wait_ms);
        let permit = match tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            _ => {
                self.shared.metrics.sessions_rejected.inc();
                warn!(
                    caller = %start.caller,
                    max_sessions = coordinator.max_sessions,
                    "Session capacity exceeded"
                );
                return Err(CoordinatorError::CapacityExceeded {
                    max_sessions: coordinator.max_sessions,
                });
            }
        };

        let (tx, rx) = mpsc::channel(coordinator.command_buffer);
        let mut worker = SessionWorker::new(
            self.shared.clone(),
            session_id,
            start.caller.clone(),
            start.participants,
            start.profile.as_deref(),
            permit,
        );
        if let Some((locker, evidence)) = recovered {
            worker = worker.resumed(locker, evidence);
        }

        self.shared.sessions.insert(
            session_id,
            SessionHandle {
                tx,
                caller: start.caller.clone(),
            },
        );
        self.shared.metrics.sessions_started.inc();

        let span = info_span!("session", session_id = %session_id, caller = %start.caller);
        tokio::spawn(worker.run(rx).instrument(span));
        info!(
            session_id = %session_id,
            caller = %start.caller,
            participants = start.participants,
            profile = start.profile.as_deref().unwrap_or("default"),
            "Session started"
        );
        Ok(session_id)
    }

    async fn refuse(&self, session_id: SessionId, caller: CallerId) -> CoordinatorError {
        self.shared.metrics.calls_refused.inc();
        warn!(session_id = %session_id, caller = %caller, "Call from blocked caller refused");
        if let Err(e) = self
            .shared
            .intervention
            .call_control
            .terminate(session_id)
            .await
        {
            warn!(error = %e, "Terminating refused call failed");
        }
        let notice = Notification::new(
            session_id,
            NotificationKind::CallRefused,
            Severity::Warning,
            "A call from a number Vigil blocked was rejected.",
        );
        deliver(
            self.shared.intervention.notifier.clone(),
            notice,
            Duration::from_millis(self.shared.config.intervention.notify_timeout_ms),
        )
        .await;
        CoordinatorError::CallerBlocked(caller)
    }

    async fn send(&self, session_id: SessionId, command: SessionCommand) -> Result<(), CoordinatorError> {
        let tx = match self.shared.sessions.get(&session_id) {
            Some(handle) => handle.tx.clone(),
            None if self.shared.completed.contains_key(&session_id) => {
                return Err(CoordinatorError::SessionClosed(session_id));
            }
            None => return Err(CoordinatorError::UnknownSession(session_id)),
        };
        tx.send(command)
            .await
            .map_err(|_| CoordinatorError::SessionClosed(session_id))
    }

    /// Route a raw capture chunk to its session for analysis.
    pub async fn submit_chunk(&self, chunk: CaptureChunk) -> Result<(), CoordinatorError> {
        self.send(chunk.session_id, SessionCommand::Chunk(chunk)).await
    }

    /// Route an already analyzed signal to its session.
    pub async fn submit_signal(&self, signal: Signal) -> Result<(), CoordinatorError> {
        self.send(signal.session_id, SessionCommand::Signal(signal)).await
    }

    /// Advance a session's capture clock without new analysis.
    pub async fn tick(&self, session_id: SessionId, at_ms: u64) -> Result<(), CoordinatorError> {
        self.send(session_id, SessionCommand::Tick { at_ms }).await
    }

    /// Current state of a session; ended sessions report their final state.
    pub async fn snapshot(&self, session_id: SessionId) -> Result<SessionSnapshot, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        let sent = self.send(session_id, SessionCommand::Snapshot(tx)).await;
        if sent.is_ok() {
            if let Ok(snapshot) = rx.await {
                return Ok(snapshot);
            }
        }
        match self.shared.completed.get(&session_id) {
            Some(summary) => Ok(summary.snapshot.clone()),
            None => sent.and(Err(CoordinatorError::SessionClosed(session_id))),
        }
    }

    /// Call-end notification: seals outstanding evidence and tears the
    /// session down. Idempotent for sessions that already stopped.
    pub async fn end_session(&self, session_id: SessionId) -> Result<SessionSummary, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        if self.send(session_id, SessionCommand::End(tx)).await.is_ok() {
            if let Ok(summary) = rx.await {
                return Ok(summary);
            }
        }
        self.shared
            .completed
            .get(&session_id)
            .map(|summary| summary.clone())
            .ok_or(CoordinatorError::UnknownSession(session_id))
    }

    /// End every active session.
    pub async fn shutdown(&self) -> Vec<SessionSummary> {
        let active = self.active_sessions();
        info!(sessions = active.len(), "Shutting down session coordinator");
        let mut summaries = Vec::with_capacity(active.len());
        for session_id in active {
            match self.end_session(session_id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(session_id = %session_id, error = %e, "Session did not end cleanly"),
            }
        }
        summaries
    }

    /// Everything recorded about a session: its sealed evidence and the
    /// intervention records that reference it.
    pub async fn report(&self, session_id: SessionId) -> Result<EvidenceReport, CoordinatorError> {
        let evidence = self.shared.store.for_session(&session_id).await?;
        let interventions = self.shared.intervention.log.for_session(session_id).await;
        Ok(EvidenceReport::new(
            session_id,
            self.shared.signer.verifying_key().to_bytes().to_vec(),
            evidence,
            interventions,
        ))
    }

    /// Start erasing expired evidence every `sweep_interval_ms`.
    pub fn spawn_retention_sweeper(&self) -> JoinHandle<()> {
        spawn_retention_sweeper(
            self.shared.store.clone(),
            Duration::from_millis(self.shared.config.evidence.sweep_interval_ms),
        )
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.shared.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn caller_of(&self, session_id: SessionId) -> Option<CallerId> {
        self.shared
            .sessions
            .get(&session_id)
            .map(|h| h.caller.clone())
    }

    pub async fn audit_flags(&self) -> Vec<AuditFlag> {
        self.shared.audit.read().await.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Bytes currently held against both process-wide budgets, session
    /// reserves included.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.budget.used() + self.shared.chunk_budget.used()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<CallerBlockRegistry> {
        &self.shared.intervention.registry
    }

    pub fn intervention_log(&self) -> &Arc<InterventionLog> {
        &self.shared.intervention.log
    }

    pub fn evidence_store(&self) -> &Arc<dyn EvidenceStore> {
        &self.shared.store
    }
}
