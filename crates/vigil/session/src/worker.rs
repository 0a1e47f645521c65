use std::collections::BTreeMap;
use std::fmt::Display;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument, Span};
use vigil_evidence::EvidenceLocker;
use vigil_ingest::{AnalysisRequest, AnalysisResponse, CaptureChunk, IngestError, SignalNormalizer};
use vigil_intervention::{
    ActionStatus, InterventionAction, InterventionController, InterventionOutcome, Notification,
    NotificationKind, Severity, SubAction, UserNotifier,
};
use vigil_privacy::{
    EphemeralBuffer, PrivacyCommand, PrivacyError, PrivacyInput, PrivacyMachine, Transition,
    TransitionPolicy,
};
use vigil_scoring::ScoringEngine;
use vigil_types::{
    now_ms, CallerId, Classify, ErrorClass, EvidenceId, Modality, PrivacyMode, RawContent,
    SessionId, Signal,
};

use crate::analysis::DegradedCache;
use crate::command::{AuditFlag, EndReason, SessionCommand, SessionSnapshot, SessionSummary};
use crate::coordinator::Shared;
use crate::error::AnalysisError;

const DEDUPE_CAPACITY: usize = 1_024;

type AnalysisResult = (AnalysisRequest, Result<AnalysisResponse, AnalysisError>);

/// Raw chunk bytes waiting for their analysis result.
struct HeldChunk {
    content: Option<RawContent>,
    reserved: usize,
}

/// One session's serialized pipeline: ingest, score, transition,
/// intervene and seal, all on a single task.
pub(crate) struct SessionWorker {
    shared: Arc<Shared>,
    session_id: SessionId,
    caller: CallerId,
    participants: u32,
    started_at_ms: u64,
    normalizer: SignalNormalizer,
    scoring: ScoringEngine,
    privacy: PrivacyMachine,
    ephemeral: EphemeralBuffer,
    controller: InterventionController,
    locker: Option<EvidenceLocker>,
    pending_evidence: Vec<Signal>,
    evidence_refs: Vec<EvidenceId>,
    evidence_failure: Option<String>,
    intervention: Option<InterventionOutcome>,
    cache: DegradedCache,
    transient_streak: u32,
    in_flight: JoinSet<AnalysisResult>,
    held: BTreeMap<(Modality, u64), HeldChunk>,
    held_bytes: usize,
    cooldown_until: Option<Instant>,
    /// Evidence-mode notice still being delivered; settled before any seal
    evidence_notice: Option<JoinHandle<()>>,
    /// Latest capture time seen and when it was seen
    clock: Option<(u64, Instant)>,
    _permit: OwnedSemaphorePermit,
}

impl SessionWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        session_id: SessionId,
        caller: CallerId,
        participants: u32,
        profile: Option<&str>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let config = &shared.config;
        let policy = TransitionPolicy::new(&config.privacy, config.thresholds_for(profile));
        let controller = InterventionController::new(
            session_id,
            caller.clone(),
            config.intervention.clone(),
            shared.intervention.clone(),
        );
        Self {
            normalizer: SignalNormalizer::new(session_id, DEDUPE_CAPACITY),
            scoring: ScoringEngine::new(session_id, config.scoring.clone(), shared.budget.clone()),
            privacy: PrivacyMachine::new(session_id, policy),
            ephemeral: EphemeralBuffer::new(config.privacy.max_ephemeral_artifacts),
            controller,
            locker: None,
            pending_evidence: Vec::new(),
            evidence_refs: Vec::new(),
            evidence_failure: None,
            intervention: None,
            cache: DegradedCache::new(),
            transient_streak: 0,
            in_flight: JoinSet::new(),
            held: BTreeMap::new(),
            held_bytes: 0,
            cooldown_until: None,
            evidence_notice: None,
            clock: None,
            session_id,
            caller,
            participants,
            started_at_ms: now_ms(),
            shared,
            _permit: permit,
        }
    }

    /// Switch a fresh worker to a session recovered from its evidence chain:
    /// already in evidence mode, already intervened, nothing re-announced.
    pub(crate) fn resumed(mut self, locker: EvidenceLocker, evidence_refs: Vec<EvidenceId>) -> Self {
        let policy = *self.privacy.policy();
        self.privacy = PrivacyMachine::resume(
            self.session_id,
            policy,
            PrivacyMode::EvidenceCollection,
            now_ms(),
        );
        self.controller = InterventionController::already_fired(
            self.session_id,
            self.caller.clone(),
            self.shared.config.intervention.clone(),
            self.shared.intervention.clone(),
        );
        self.locker = Some(locker);
        self.evidence_refs = evidence_refs;
        self
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut reply = None;
        let reason = loop {
            let cooldown = self.cooldown_until;
            let debounce = self.debounce_wakeup();
            let debounce_at = debounce.map(|(at, _)| at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::End(tx)) => {
                        reply = Some(tx);
                        break EndReason::CallEnded;
                    }
                    Some(command) => {
                        if let Some(reason) = self.handle(command).await {
                            break reason;
                        }
                    }
                    None => break EndReason::CoordinatorGone,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Some(reason) = self.on_analysis(joined).await {
                        break reason;
                    }
                }
                _ = tokio::time::sleep_until(cooldown.unwrap_or_else(Instant::now)), if cooldown.is_some() => {
                    break EndReason::CooldownElapsed;
                }
                _ = tokio::time::sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                    let at_ms = debounce.map_or(0, |(_, at_ms)| at_ms);
                    if let Some(reason) = self.on_tick(at_ms).await {
                        break reason;
                    }
                }
            }
        };

        let summary = self.finish(reason).await;
        if let Some(tx) = reply {
            let _ = tx.send(summary);
        }
    }

    /// `End` never reaches here; `run` consumes it.
    async fn handle(&mut self, command: SessionCommand) -> Option<EndReason> {
        match command {
            SessionCommand::Chunk(chunk) => {
                self.on_chunk(chunk);
                None
            }
            SessionCommand::Signal(signal) => self.process_signal(signal).await,
            SessionCommand::Tick { at_ms } => self.on_tick(at_ms).await,
            SessionCommand::Snapshot(tx) => {
                let _ = tx.send(self.snapshot());
                None
            }
            SessionCommand::End(_) => None,
        }
    }

    fn on_chunk(&mut self, chunk: CaptureChunk) {
        self.shared.metrics.chunks_received.inc();
        if let Err(e) = self.normalizer.admit(&chunk) {
            if matches!(e, IngestError::Duplicate { .. }) {
                self.shared.metrics.duplicates.inc();
            }
            debug!(error = %e, "Capture chunk not admitted");
            return;
        }

        let request = chunk.request();
        let len = chunk.payload.len();
        let share = self.shared.config.coordinator.session_chunk_bytes;
        let held = if self.held_bytes + len <= share && self.shared.chunk_budget.try_reserve(len) {
            self.held_bytes += len;
            HeldChunk {
                content: Some(chunk.payload),
                reserved: len,
            }
        } else {
            warn!(
                modality = %request.modality,
                bytes = len,
                held_bytes = self.held_bytes,
                "Chunk budget exhausted; chunk analyzed without keeping its content"
            );
            HeldChunk {
                content: None,
                reserved: 0,
            }
        };
        self.held
            .insert((request.modality.clone(), request.timestamp_ms), held);

        let analysis = self.shared.analysis.clone();
        let timeout_ms = self.shared.config.coordinator.analysis_timeout_ms;
        self.in_flight.spawn(async move {
            let result = match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                analysis.analyze(request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout(timeout_ms)),
            };
            (request, result)
        });
    }

    fn take_held(&mut self, modality: &Modality, timestamp_ms: u64) -> Option<RawContent> {
        let held = self.held.remove(&(modality.clone(), timestamp_ms))?;
        if held.reserved > 0 {
            self.shared.chunk_budget.release(held.reserved);
            self.held_bytes = self.held_bytes.saturating_sub(held.reserved);
        }
        held.content
    }

    async fn on_analysis(&mut self, joined: Result<AnalysisResult, JoinError>) -> Option<EndReason> {
        let (request, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                warn!(error = %e, "Analysis task failed");
                return None;
            }
        };
        let content = self.take_held(&request.modality, request.timestamp_ms);

        let (response, degraded) = match result {
            Ok(response) => {
                self.transient_streak = 0;
                self.cache.store(request.modality.clone(), &response);
                (response, false)
            }
            Err(e) => {
                self.shared.metrics.analysis_failures.inc();
                self.transient_streak += 1;
                warn!(
                    modality = %request.modality,
                    error = %e,
                    streak = self.transient_streak,
                    "Analysis failed; falling back to cached result"
                );
                if self.transient_streak == self.shared.config.coordinator.sustained_transient_threshold {
                    self.notify(Notification::new(
                        self.session_id,
                        NotificationKind::AnalysisDegraded,
                        Severity::Info,
                        "Call protection is running with reduced accuracy.",
                    ))
                    .await;
                }
                let factor = self.shared.config.coordinator.degraded_confidence_factor;
                match self.cache.replay(&request.modality, factor) {
                    Some(cached) => (cached, true),
                    None => return None,
                }
            }
        };

        let mut signal = match self.normalizer.normalize(&request, response, content) {
            Ok(signal) => signal,
            Err(_) => {
                self.shared.metrics.signals_rejected.inc();
                return None;
            }
        };
        if degraded {
            signal = signal.degraded();
            self.shared.metrics.degraded_signals.inc();
        }
        self.process_signal(signal).await
    }

    async fn process_signal(&mut self, signal: Signal) -> Option<EndReason> {
        let score = match self.scoring.ingest(&signal) {
            Ok(score) => score,
            Err(e) => {
                self.shared.metrics.signals_rejected.inc();
                self.report(&e, "Signal rejected").await;
                return None;
            }
        };
        self.shared.metrics.signals_ingested.inc();
        self.observe(score.as_of_ms);

        let transition = match self.privacy.apply(PrivacyInput::from_score(&score)) {
            Ok(transition) => transition,
            Err(e) => return self.on_privacy_error(e).await,
        };
        self.apply_commands(&transition, &score.indicator_summary())
            .await;
        self.retain(signal);

        if let Some(action) = self.controller.evaluate(&score, self.privacy.mode()) {
            self.intervene(action).await;
        }
        None
    }

    async fn on_tick(&mut self, at_ms: u64) -> Option<EndReason> {
        self.observe(at_ms);
        match self.privacy.apply(PrivacyInput::Tick { at_ms }) {
            Ok(transition) => {
                let summary = self.scoring.current().indicator_summary();
                self.apply_commands(&transition, &summary).await;
                None
            }
            Err(e) => self.on_privacy_error(e).await,
        }
    }

    /// Advance the capture clock. It never runs backwards.
    fn observe(&mut self, at_ms: u64) {
        if self.clock.map_or(true, |(seen_ms, _)| at_ms >= seen_ms) {
            self.clock = Some((at_ms, Instant::now()));
        }
    }

    /// When a running debounce ends, in wall time and in capture time.
    ///
    /// Capture time is extrapolated from the last observation, so a quiet
    /// session still falls back to memory-only without further input.
    fn debounce_wakeup(&self) -> Option<(Instant, u64)> {
        let deadline_ms = self.privacy.debounce_deadline()?;
        let (seen_ms, seen_at) = self.clock?;
        let wait = Duration::from_millis(deadline_ms.saturating_sub(seen_ms));
        Some((seen_at + wait, deadline_ms))
    }

    /// What outlives the scoring pass depends on the mode: nothing, a
    /// derived artifact, or the full signal for the next seal.
    fn retain(&mut self, signal: Signal) {
        match self.privacy.mode() {
            PrivacyMode::MemoryOnly => {}
            PrivacyMode::EphemeralAnalysis => self.ephemeral.record(&signal),
            PrivacyMode::EvidenceCollection => self.pending_evidence.push(signal),
        }
    }

    async fn apply_commands(&mut self, transition: &Transition, indicators: &str) {
        if transition.changed() {
            self.shared.metrics.transitions.inc();
        }
        for command in &transition.commands {
            match command {
                PrivacyCommand::RetainDerivedArtifacts => {
                    debug!("Retaining derived artifacts");
                }
                PrivacyCommand::PurgeBufferedContent => {
                    let purged = self.ephemeral.purge();
                    info!(purged, "Buffered session content purged");
                }
                PrivacyCommand::NotifyEvidenceMode => {
                    // Delivered alongside termination; sealing waits for it.
                    let notice = Notification::new(
                        self.session_id,
                        NotificationKind::EvidenceModeEntered,
                        Severity::Warning,
                        "This call shows signs of fraud. Vigil is now recording evidence.",
                    )
                    .with_indicators(indicators);
                    let delivery = deliver(
                        self.shared.intervention.notifier.clone(),
                        notice,
                        self.notify_timeout(),
                    );
                    self.evidence_notice = Some(tokio::spawn(delivery.instrument(Span::current())));
                }
                PrivacyCommand::BeginEvidenceCapture => {
                    if self.locker.is_none() {
                        self.locker = Some(EvidenceLocker::new(
                            self.session_id,
                            self.caller.clone(),
                            self.shared.cipher.clone(),
                            self.shared.signer.clone(),
                            &self.shared.config.evidence,
                        ));
                    }
                    info!("Evidence capture started");
                }
            }
        }
    }

    async fn intervene(&mut self, action: InterventionAction) {
        self.shared.metrics.interventions.inc();
        let mut outcome = self.controller.execute(&action).await;

        if let Some(ActionStatus::Failed(reason)) = outcome.status_of(SubAction::TerminateCall) {
            error!(reason = %reason, "Automatic call termination failed");
            self.notify(Notification::new(
                self.session_id,
                NotificationKind::ProtectionFailure,
                Severity::Critical,
                "Vigil could not end this call. Hang up now.",
            ))
            .await;
        }

        if let Some(evidence) = self.seal_pending().await {
            self.notify(
                Notification::new(
                    self.session_id,
                    NotificationKind::EvidenceSealed,
                    Severity::Info,
                    "Evidence of this call has been sealed.",
                )
                .with_evidence(evidence),
            )
            .await;
        }

        let refs = self.evidence_refs.clone();
        let failure = self.evidence_failure.clone();
        if let Err(e) = self
            .controller
            .finalize(&action, &mut outcome, refs, failure)
            .await
        {
            self.report(&e, "Intervention record not written").await;
        }

        self.intervention = Some(outcome);
        self.cooldown_until = Some(
            Instant::now() + Duration::from_millis(self.shared.config.intervention.cooldown_ms),
        );
    }

    /// Seal everything retained since the last seal. Failures are recorded
    /// and surfaced; they never stop the session.
    async fn seal_pending(&mut self) -> Option<EvidenceId> {
        self.settle_evidence_notice().await;
        let mode = self.privacy.mode();
        let locker = self.locker.as_mut()?;
        let signals = mem::take(&mut self.pending_evidence);
        let observations = self.ephemeral.drain();

        let result = match locker.seal(mode, signals, observations, now_ms()) {
            Ok(record) => {
                let id = record.id;
                self.shared.store.put(record).await.map(|_| id)
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => {
                self.shared.metrics.evidence_sealed.inc();
                self.evidence_refs.push(id);
                Some(id)
            }
            Err(e) => {
                self.shared.metrics.evidence_failures.inc();
                self.evidence_failure = Some(e.to_string());
                self.report(&e, "Evidence capture failed").await;
                None
            }
        }
    }

    /// Wait for the evidence-mode notice; it is bounded by the notify timeout.
    async fn settle_evidence_notice(&mut self) {
        if let Some(notice) = self.evidence_notice.take() {
            if let Err(e) = notice.await {
                warn!(error = %e, "Evidence notice task failed");
            }
        }
    }

    async fn on_privacy_error(&mut self, e: PrivacyError) -> Option<EndReason> {
        if e.class() != ErrorClass::Fatal {
            debug!(error = %e, "Privacy input rejected");
            return None;
        }
        self.shared.metrics.fatal_sessions.inc();
        error!(error = %e, "Session state corrupted; terminating and flagging for audit");
        self.shared
            .flag_for_audit(AuditFlag {
                session_id: self.session_id,
                caller: self.caller.clone(),
                reason: e.to_string(),
                flagged_at_ms: now_ms(),
            })
            .await;
        if let Err(term) = self
            .shared
            .intervention
            .call_control
            .terminate(self.session_id)
            .await
        {
            error!(error = %term, "Forced termination failed");
        }
        if ErrorClass::Fatal.is_user_visible(self.controller.has_fired()) {
            self.notify(Notification::new(
                self.session_id,
                NotificationKind::ProtectionFailure,
                Severity::Critical,
                "Call protection stopped unexpectedly. The call has been ended.",
            ))
            .await;
        }
        Some(EndReason::Fatal)
    }

    /// Log an error by class and alert the user when the class calls for it.
    async fn report<E: Classify + Display>(&mut self, e: &E, context: &str) {
        let class = e.class();
        match class {
            ErrorClass::Transient | ErrorClass::Data => {
                debug!(class = %class, error = %e, "{}", context)
            }
            ErrorClass::Critical | ErrorClass::Fatal => {
                error!(class = %class, error = %e, "{}", context)
            }
        }
        if class.is_user_visible(self.controller.has_fired()) {
            self.notify(Notification::new(
                self.session_id,
                NotificationKind::ProtectionFailure,
                Severity::Critical,
                format!("{context}: {e}"),
            ))
            .await;
        }
    }

    async fn notify(&self, notification: Notification) {
        deliver(
            self.shared.intervention.notifier.clone(),
            notification,
            self.notify_timeout(),
        )
        .await;
    }

    fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.shared.config.intervention.notify_timeout_ms)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            caller: self.caller.clone(),
            participants: self.participants,
            started_at_ms: self.started_at_ms,
            mode: self.privacy.mode(),
            score: self.scoring.current().clone(),
            intervened: self.controller.has_fired(),
            intervention: self.intervention.clone(),
            evidence: self.evidence_refs.clone(),
            evidence_failure: self.evidence_failure.clone(),
            transitions: self.privacy.history().to_vec(),
            ingest: self.normalizer.stats(),
            scoring: self.scoring.stats(),
            buffered_bytes: self.held_bytes + self.scoring.buffered_bytes(),
            ephemeral_artifacts: self.ephemeral.len(),
            pending_evidence: self.pending_evidence.len(),
            degraded: self.transient_streak > 0,
        }
    }

    async fn finish(&mut self, reason: EndReason) -> SessionSummary {
        // Results still in flight belong to a call that is over.
        self.in_flight.abort_all();
        for (_, held) in mem::take(&mut self.held) {
            if held.reserved > 0 {
                self.shared.chunk_budget.release(held.reserved);
            }
        }
        self.held_bytes = 0;

        if reason != EndReason::Fatal && !self.pending_evidence.is_empty() {
            self.seal_pending().await;
        }
        self.pending_evidence.clear();
        self.ephemeral.purge();
        self.scoring.release();

        let summary = SessionSummary {
            snapshot: self.snapshot(),
            reason,
            ended_at_ms: now_ms(),
        };
        self.shared.sessions.remove(&self.session_id);
        self.shared.completed.insert(self.session_id, summary.clone());
        info!(reason = ?reason, evidence = self.evidence_refs.len(), "Session ended");
        summary
    }
}

/// Hand a notification to the user, giving up after `timeout`.
pub(crate) async fn deliver(
    notifier: Arc<dyn UserNotifier>,
    notification: Notification,
    timeout: Duration,
) {
    let kind = notification.kind;
    match tokio::time::timeout(timeout, notifier.notify(notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(kind = ?kind, error = %e, "User notification failed"),
        Err(_) => warn!(
            kind = ?kind,
            timeout_ms = timeout.as_millis() as u64,
            "User notification timed out"
        ),
    }
}
