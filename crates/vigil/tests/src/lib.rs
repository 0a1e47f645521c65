//! Shared fixtures for the Vigil cross-crate test suites.

use std::sync::Arc;
use std::time::Duration;

use vigil_evidence::{EvidenceCipher, EvidenceSigner, InMemoryEvidenceStore, PqEvidenceCipher};
use vigil_ingest::{AnalysisResponse, CaptureChunk};
use vigil_intervention::{RecordingNotifier, SimulatedCallControl};
use vigil_session::{
    CoordinatorServices, ScriptedAnalysis, SessionCoordinator, SessionSnapshot, SessionStart,
};
use vigil_types::{CallerId, EngineConfig, IndicatorKind, Modality, SessionId, Signal};

/// How long `wait_until` polls before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A coordinator wired to simulated collaborators, with handles to each.
pub struct TestEngine {
    pub coordinator: SessionCoordinator,
    pub call_control: Arc<SimulatedCallControl>,
    pub notifier: Arc<RecordingNotifier>,
    pub analysis: Arc<ScriptedAnalysis>,
    pub store: InMemoryEvidenceStore,
    pub cipher: Arc<dyn EvidenceCipher>,
    pub signer: Arc<EvidenceSigner>,
}

impl TestEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::build(
            config,
            SimulatedCallControl::new(),
            Arc::new(PqEvidenceCipher::generate()),
            Arc::new(EvidenceSigner::generate()),
            InMemoryEvidenceStore::new(),
        )
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn build(
        config: EngineConfig,
        call_control: SimulatedCallControl,
        cipher: Arc<dyn EvidenceCipher>,
        signer: Arc<EvidenceSigner>,
        store: InMemoryEvidenceStore,
    ) -> Self {
        Self::assemble(config, call_control, RecordingNotifier::new(), cipher, signer, store)
    }

    /// An engine whose user notifications go through `notifier`.
    pub fn with_notifier(config: EngineConfig, notifier: RecordingNotifier) -> Self {
        Self::assemble(
            config,
            SimulatedCallControl::new(),
            notifier,
            Arc::new(PqEvidenceCipher::generate()),
            Arc::new(EvidenceSigner::generate()),
            InMemoryEvidenceStore::new(),
        )
    }

    fn assemble(
        config: EngineConfig,
        call_control: SimulatedCallControl,
        notifier: RecordingNotifier,
        cipher: Arc<dyn EvidenceCipher>,
        signer: Arc<EvidenceSigner>,
        store: InMemoryEvidenceStore,
    ) -> Self {
        let call_control = Arc::new(call_control);
        let notifier = Arc::new(notifier);
        let analysis = Arc::new(ScriptedAnalysis::new());
        let services = CoordinatorServices {
            call_control: call_control.clone(),
            notifier: notifier.clone(),
            analysis: analysis.clone(),
            store: Arc::new(store.clone()),
            cipher: cipher.clone(),
            signer: signer.clone(),
        };
        let coordinator =
            SessionCoordinator::new(config, services).expect("test configuration is valid");
        Self {
            coordinator,
            call_control,
            notifier,
            analysis,
            store,
            cipher,
            signer,
        }
    }

    /// A fresh engine over the same evidence store and keys, as after a
    /// process restart.
    pub fn restarted(&self) -> Self {
        Self::build(
            self.coordinator.config().clone(),
            SimulatedCallControl::new(),
            self.cipher.clone(),
            self.signer.clone(),
            self.store.clone(),
        )
    }

    pub async fn start(&self, caller: &str) -> SessionId {
        self.coordinator
            .start_session(SessionStart::new(CallerId::new(caller)))
            .await
            .expect("session admitted")
    }

    /// Script the analysis result for a capture chunk and submit it.
    pub async fn capture(
        &self,
        session: SessionId,
        modality: Modality,
        at_ms: u64,
        score: f64,
        confidence: f64,
        tag: &str,
    ) {
        let payload = format!("{session}/{modality}/{at_ms}").into_bytes();
        let chunk = CaptureChunk::new(session, modality.clone(), at_ms, payload);
        self.analysis.respond(
            chunk.payload_ref(),
            AnalysisResponse::new(modality.as_str(), score, confidence).with_tag(tag),
        );
        self.coordinator
            .submit_chunk(chunk)
            .await
            .expect("chunk routed");
    }

    /// Poll the session until `done` holds.
    pub async fn wait_until<F>(&self, session: SessionId, done: F) -> SessionSnapshot
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let snapshot = self
                .coordinator
                .snapshot(session)
                .await
                .expect("session known");
            if done(&snapshot) {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session {session} never reached the expected state: {snapshot:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until `count` signals have been scored.
    pub async fn wait_scored(&self, session: SessionId, count: u64) -> SessionSnapshot {
        self.wait_until(session, |s| s.scoring.accepted >= count).await
    }
}

pub fn signal(
    session: SessionId,
    modality: Modality,
    at_ms: u64,
    score: f64,
    confidence: f64,
    tag: &str,
) -> Signal {
    Signal::new(session, modality, at_ms, score, confidence).with_indicator(IndicatorKind::parse(tag))
}

/// Audio authority claim, then a forged document on camera 3s later.
pub fn digital_arrest(session: SessionId) -> [Signal; 2] {
    [
        signal(session, Modality::Audio, 0, 40.0, 0.9, "authority-claim")
            .with_content(b"this is inspector sharma from the cyber cell".to_vec()),
        signal(session, Modality::Visual, 3_000, 60.0, 0.8, "forged-document")
            .with_content(b"<frame: arrest warrant>".to_vec()),
    ]
}
