//! End-to-end test: many calls at once.
//!
//! Calls that never look suspicious stay memory-only, keep nothing after
//! scoring and together never hold more than the configured budgets. A
//! session loading those budgets never keeps another session from being
//! scored and protected.

use std::time::Duration;

use vigil_evidence::EvidenceStore;
use vigil_ingest::CaptureChunk;
use vigil_session::EndReason;
use vigil_tests::{digital_arrest, signal, TestEngine};
use vigil_types::{EngineConfig, Modality, PrivacyMode, SessionId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SESSIONS: usize = 10;
const SIGNALS: u64 = 20;

fn modality(i: u64) -> Modality {
    match i % 3 {
        0 => Modality::Audio,
        1 => Modality::Visual,
        _ => Modality::Behavioral,
    }
}

/// Below-suspicion score that varies per signal.
fn quiet_score(i: u64) -> f64 {
    5.0 + (i * 7 % 40) as f64
}

/// A 16 KiB scoring budget split into 1 KiB session reserves.
fn tight_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.scoring.buffer_budget_bytes = 16 * 1024;
    config.scoring.session_reserve_bytes = 1024;
    config
}

async fn wait_for_release(engine: &TestEngine) {
    for _ in 0..200 {
        if engine.coordinator.buffered_bytes() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("buffer budget never released: {} bytes", engine.coordinator.buffered_bytes());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_quiet_sessions_stay_memory_only_within_budget() {
    let config = tight_config();
    let cap = config.scoring.buffer_budget_bytes;
    let engine = TestEngine::new(config);

    let mut sessions: Vec<SessionId> = Vec::new();
    for i in 0..SESSIONS {
        sessions.push(engine.start(&format!("+91-family-{i}")).await);
    }

    for i in 0..SIGNALS {
        for session in &sessions {
            engine
                .coordinator
                .submit_signal(
                    signal(*session, modality(i), i * 500, quiet_score(i), 0.9, "small-talk")
                        .with_content(vec![0x5a; 1024]),
                )
                .await
                .unwrap();
        }
        assert!(engine.coordinator.buffered_bytes() <= cap);
    }

    for session in &sessions {
        let snapshot = engine.wait_scored(*session, SIGNALS).await;
        assert_eq!(snapshot.scoring.accepted, SIGNALS);
        assert_eq!(snapshot.scoring.rejected, 0, "valid signal rejected: {snapshot:?}");
        assert_eq!(snapshot.mode, PrivacyMode::MemoryOnly);
        assert!(snapshot.score.value < 50.0);
        assert!(!snapshot.intervened);
        assert_eq!(snapshot.ephemeral_artifacts, 0);
        assert_eq!(snapshot.pending_evidence, 0);
        assert!(snapshot.transitions.is_empty());
        assert!(engine.coordinator.buffered_bytes() <= cap);
    }
    assert_eq!(engine.coordinator.metrics().signals_rejected, 0);

    for session in sessions {
        let summary = engine.coordinator.end_session(session).await.unwrap();
        assert_eq!(summary.reason, EndReason::CallEnded);
        assert!(summary.snapshot.evidence.is_empty());
    }
    assert_eq!(engine.store.count().await.unwrap(), 0);
    assert!(engine.notifier.delivered().await.is_empty());
    wait_for_release(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn flooding_session_cannot_crowd_out_a_scam_elsewhere() {
    let config = tight_config();
    let cap = config.scoring.buffer_budget_bytes;
    let engine = TestEngine::new(config);

    let flood = engine.start("+91-chatty-relative").await;
    let victims = [
        engine.start("+91-fake-cbi").await,
        engine.start("+91-fake-customs").await,
        engine.start("+91-fake-ncb").await,
    ];

    // Enough distinct samples inside one window to exhaust the shared pool.
    for i in 0..200 {
        engine
            .coordinator
            .submit_signal(signal(flood, modality(i), i * 100, quiet_score(i), 0.9, "small-talk"))
            .await
            .unwrap();
    }
    engine.wait_scored(flood, 200).await;
    assert!(engine.coordinator.buffered_bytes() <= cap);

    for victim in victims {
        for s in digital_arrest(victim) {
            engine.coordinator.submit_signal(s).await.unwrap();
        }
    }
    for victim in victims {
        let snapshot = engine.wait_until(victim, |s| s.intervention.is_some()).await;
        assert_eq!(snapshot.scoring.rejected, 0);
        assert_eq!(snapshot.mode, PrivacyMode::EvidenceCollection);
        assert!(snapshot.intervention.as_ref().unwrap().call_terminated());
        assert_eq!(snapshot.evidence.len(), 1);
    }

    let flood_snapshot = engine.coordinator.snapshot(flood).await.unwrap();
    assert_eq!(flood_snapshot.scoring.rejected, 0);
    assert_eq!(flood_snapshot.mode, PrivacyMode::MemoryOnly);
    assert!(engine.coordinator.buffered_bytes() <= cap);

    engine.coordinator.end_session(flood).await.unwrap();
    for victim in victims {
        engine.coordinator.end_session(victim).await.unwrap();
    }
    wait_for_release(&engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_analysis_of_large_chunks_leaves_other_sessions_protected() {
    let engine = TestEngine::with_defaults();
    let share = engine.coordinator.config().coordinator.session_chunk_bytes;
    engine
        .analysis
        .set_latency(Modality::Visual, Duration::from_millis(1_500));

    let loaded = engine.start("+91-video-relative").await;
    for i in 0..5u8 {
        let frame = CaptureChunk::new(loaded, Modality::Visual, u64::from(i) * 1_000, vec![i; 1 << 20]);
        engine.coordinator.submit_chunk(frame).await.unwrap();
    }
    let held = engine.coordinator.snapshot(loaded).await.unwrap();
    assert!(held.buffered_bytes <= share, "{} bytes held", held.buffered_bytes);
    assert!(held.buffered_bytes > 0);

    let victim = engine.start("+91-fake-cbi").await;
    for s in digital_arrest(victim) {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    let snapshot = engine.wait_until(victim, |s| s.intervention.is_some()).await;
    assert_eq!(snapshot.scoring.accepted, 2);
    assert_eq!(snapshot.scoring.rejected, 0);
    assert!(snapshot.intervention.as_ref().unwrap().call_terminated());
    assert_eq!(snapshot.evidence.len(), 1);
    assert!(engine.call_control.terminated(victim).await);
    assert!(!engine.call_control.terminated(loaded).await);

    engine.coordinator.end_session(loaded).await.unwrap();
    engine.coordinator.end_session(victim).await.unwrap();
    wait_for_release(&engine).await;
}

#[tokio::test]
async fn analyzed_chunks_stay_within_a_small_budget() {
    let mut config = EngineConfig::default();
    config.scoring.buffer_budget_bytes = 4 * 1024;
    config.scoring.session_reserve_bytes = 256;
    let engine = TestEngine::new(config);
    let session = engine.start("+91-neighbour").await;

    for i in 0..8 {
        engine
            .capture(session, Modality::Audio, i * 1_000, 10.0, 0.9, "small-talk")
            .await;
        engine.wait_scored(session, i + 1).await;
    }
    let snapshot = engine.coordinator.snapshot(session).await.unwrap();
    assert_eq!(snapshot.mode, PrivacyMode::MemoryOnly);
    assert_eq!(snapshot.scoring.rejected, 0);
    assert!(snapshot.buffered_bytes <= 4 * 1024);

    engine.coordinator.end_session(session).await.unwrap();
    wait_for_release(&engine).await;
}

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let engine = TestEngine::with_defaults();
    let quiet = engine.start("+91-mother").await;
    let hostile = engine.start("+91-fake-police").await;

    engine
        .coordinator
        .submit_signal(signal(hostile, Modality::Audio, 0, 95.0, 0.9, "arrest-threat"))
        .await
        .unwrap();
    engine
        .coordinator
        .submit_signal(signal(quiet, Modality::Audio, 0, 10.0, 0.9, "small-talk"))
        .await
        .unwrap();

    let hostile = engine.wait_until(hostile, |s| s.intervened).await;
    let quiet = engine.wait_scored(quiet, 1).await;
    assert_eq!(hostile.mode, PrivacyMode::EvidenceCollection);
    assert_eq!(quiet.mode, PrivacyMode::MemoryOnly);
    assert!(!quiet.intervened);
    assert!(!engine.call_control.terminated(quiet.session_id).await);
}
