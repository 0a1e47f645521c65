//! Scenario runner: pushes simulated calls through a full in-process engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};
use vigil_evidence::{EvidenceSigner, InMemoryEvidenceStore, PqEvidenceCipher};
use vigil_ingest::{AnalysisResponse, CaptureChunk};
use vigil_intervention::{RecordingNotifier, SimulatedCallControl};
use vigil_session::{
    CoordinatorServices, MetricsSnapshot, ScriptedAnalysis, SessionCoordinator, SessionStart,
    SessionSummary,
};
use vigil_types::{CallerId, EngineConfig, Modality, SessionId};

/// How long to wait for a session's analysis results before ending it anyway.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub sessions: usize,
    /// How many of the sessions follow the digital-arrest script
    pub coercive: usize,
    /// Where to write an evidence report for every intervened session
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct SimulationOutcome {
    pub sessions: Vec<SessionSummary>,
    pub rejected: usize,
    pub reports: Vec<PathBuf>,
    pub metrics: MetricsSnapshot,
}

impl SimulationOutcome {
    pub fn intervened(&self) -> usize {
        self.sessions.iter().filter(|s| s.snapshot.intervened).count()
    }
}

/// One scripted capture chunk and what analysis will say about it.
struct Step {
    modality: Modality,
    at_ms: u64,
    score: f64,
    confidence: f64,
    tag: &'static str,
}

/// A "police officer" claims authority on audio, then shows a forged
/// warrant on camera three seconds later.
fn digital_arrest() -> Vec<Step> {
    vec![
        Step {
            modality: Modality::Audio,
            at_ms: 0,
            score: 40.0,
            confidence: 0.9,
            tag: "authority-claim",
        },
        Step {
            modality: Modality::Visual,
            at_ms: 3_000,
            score: 60.0,
            confidence: 0.8,
            tag: "forged-document",
        },
    ]
}

fn ordinary_call() -> Vec<Step> {
    (0..5)
        .map(|i| Step {
            modality: if i % 2 == 0 { Modality::Audio } else { Modality::Visual },
            at_ms: i * 1_000,
            score: 12.0,
            confidence: 0.9,
            tag: "small-talk",
        })
        .collect()
}

/// The payload cipher named by `evidence.key_file`, or a throwaway one.
pub fn evidence_cipher(config: &EngineConfig) -> anyhow::Result<PqEvidenceCipher> {
    match &config.evidence.key_file {
        Some(path) => PqEvidenceCipher::load_or_generate(path)
            .with_context(|| format!("evidence key {}", path.display())),
        None => {
            warn!("No evidence.key_file configured; sealed payloads cannot be opened after exit");
            Ok(PqEvidenceCipher::generate())
        }
    }
}

pub async fn run(config: EngineConfig, options: &SimulationOptions) -> anyhow::Result<SimulationOutcome> {
    let analysis = Arc::new(ScriptedAnalysis::new());
    let services = CoordinatorServices {
        call_control: Arc::new(SimulatedCallControl::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        analysis: analysis.clone(),
        store: Arc::new(InMemoryEvidenceStore::new()),
        cipher: Arc::new(evidence_cipher(&config)?),
        signer: Arc::new(EvidenceSigner::generate()),
    };
    let coordinator = Arc::new(SessionCoordinator::new(config, services)?);

    let mut calls = tokio::task::JoinSet::new();
    for i in 0..options.sessions {
        let script = if i < options.coercive {
            digital_arrest()
        } else {
            ordinary_call()
        };
        let coordinator = coordinator.clone();
        let analysis = analysis.clone();
        calls.spawn(async move { run_call(&coordinator, &analysis, i, script).await });
    }

    let mut sessions = Vec::new();
    let mut rejected = 0;
    while let Some(joined) = calls.join_next().await {
        match joined.context("simulated call panicked")? {
            Ok(summary) => sessions.push(summary),
            Err(e) => {
                warn!(error = %e, "Simulated call rejected");
                rejected += 1;
            }
        }
    }
    sessions.sort_by_key(|s| s.snapshot.caller.clone());

    let mut reports = Vec::new();
    if let Some(dir) = &options.report_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        for summary in sessions.iter().filter(|s| s.snapshot.intervened) {
            let report = coordinator.report(summary.snapshot.session_id).await?;
            let path = dir.join(format!("{}.json", summary.snapshot.session_id));
            tokio::fs::write(&path, report.to_json()?)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            reports.push(path);
        }
    }

    let metrics = coordinator.metrics();
    info!(
        sessions = sessions.len(),
        rejected,
        interventions = metrics.interventions,
        "Simulation finished"
    );
    Ok(SimulationOutcome {
        sessions,
        rejected,
        reports,
        metrics,
    })
}

async fn run_call(
    coordinator: &SessionCoordinator,
    analysis: &ScriptedAnalysis,
    index: usize,
    script: Vec<Step>,
) -> anyhow::Result<SessionSummary> {
    let caller = CallerId::new(format!("+91-sim-{index:04}"));
    let session = coordinator.start_session(SessionStart::new(caller)).await?;

    // Capture is real time: each chunk is analyzed before the next is taken.
    for (taken, step) in (1u64..).zip(script) {
        let payload = format!("{}:{}:{}", session, step.modality, step.at_ms).into_bytes();
        let chunk = CaptureChunk::new(session, step.modality.clone(), step.at_ms, payload);
        analysis.respond(
            chunk.payload_ref(),
            AnalysisResponse::new(step.modality.as_str(), step.score, step.confidence)
                .with_tag(step.tag),
        );
        coordinator.submit_chunk(chunk).await?;
        settle(coordinator, session, taken).await;
    }

    Ok(coordinator.end_session(session).await?)
}

/// Wait until the session has scored `expected` signals, intervened, or stopped.
async fn settle(coordinator: &SessionCoordinator, session: SessionId, expected: u64) {
    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        match coordinator.snapshot(session).await {
            Ok(snapshot) if snapshot.intervened || snapshot.scoring.accepted >= expected => return,
            Ok(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            Err(_) => return,
        }
    }
}
