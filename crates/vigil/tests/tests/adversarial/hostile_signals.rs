//! Adversarial test: malformed, replayed and badly timed input.
//!
//! Each bad input is dropped on its own; the session keeps scoring and the
//! score never moves because of a rejected signal.

use vigil_ingest::{AnalysisResponse, CaptureChunk};
use vigil_session::CoordinatorError;
use vigil_tests::{signal, TestEngine};
use vigil_types::{Modality, PrivacyMode, SessionId, Signal};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn wait_rejected(engine: &TestEngine, session: SessionId, count: u64) {
    engine
        .wait_until(session, |s| s.scoring.rejected + s.scoring.dropped_out_of_window >= count)
        .await;
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivered_chunk_is_scored_once() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    for _ in 0..3 {
        engine
            .capture(session, Modality::Audio, 1_000, 70.0, 0.9, "arrest-threat")
            .await;
    }
    engine.wait_scored(session, 1).await;
    let snapshot = engine.coordinator.snapshot(session).await.unwrap();

    assert_eq!(snapshot.ingest.chunks_admitted, 1);
    assert_eq!(snapshot.ingest.duplicates, 2);
    assert_eq!(snapshot.scoring.accepted, 1);
    assert_eq!(engine.coordinator.metrics().duplicates, 2);
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_signal_beyond_reorder_window_is_dropped() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    engine
        .coordinator
        .submit_signal(signal(session, Modality::Audio, 5_000, 20.0, 0.9, "small-talk"))
        .await
        .unwrap();
    let before = engine.wait_scored(session, 1).await;

    // 3s behind the watermark; the reorder window is 2s.
    engine
        .coordinator
        .submit_signal(signal(session, Modality::Visual, 2_000, 95.0, 0.9, "forged-document"))
        .await
        .unwrap();
    wait_rejected(&engine, session, 1).await;
    let after = engine.coordinator.snapshot(session).await.unwrap();

    assert_eq!(after.scoring.dropped_out_of_window, 1);
    assert_eq!(after.score.value, before.score.value);
    assert_eq!(after.mode, PrivacyMode::MemoryOnly);
}

#[tokio::test]
async fn late_signal_inside_reorder_window_is_applied() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    engine
        .coordinator
        .submit_signal(signal(session, Modality::Audio, 5_000, 20.0, 0.9, "small-talk"))
        .await
        .unwrap();
    engine
        .coordinator
        .submit_signal(signal(session, Modality::Behavioral, 4_000, 30.0, 0.9, "small-talk"))
        .await
        .unwrap();
    let snapshot = engine.wait_scored(session, 2).await;

    assert_eq!(snapshot.scoring.reordered, 1);
    assert_eq!(snapshot.scoring.dropped_out_of_window, 0);
    assert_eq!(snapshot.score.as_of_ms, 5_000);
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_signals_are_rejected_and_the_session_continues() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    let hostile = [
        Signal::new(session, Modality::Other("thermal".into()), 0, 90.0, 0.9),
        Signal::new(session, Modality::Audio, 100, 150.0, 0.9),
        Signal::new(session, Modality::Audio, 200, f64::NAN, 0.9),
        Signal::new(session, Modality::Visual, 300, 50.0, 1.5),
    ];
    for s in hostile {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    wait_rejected(&engine, session, 4).await;

    let rejected = engine.coordinator.snapshot(session).await.unwrap();
    assert_eq!(rejected.scoring.accepted, 0);
    assert_eq!(rejected.score.value, 0.0);
    assert_eq!(engine.coordinator.metrics().signals_rejected, 4);
    assert!(engine.notifier.for_session(session).await.is_empty());

    engine
        .coordinator
        .submit_signal(signal(session, Modality::Audio, 400, 30.0, 0.9, "small-talk"))
        .await
        .unwrap();
    let healthy = engine.wait_scored(session, 1).await;
    assert!((healthy.score.value - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn malformed_analysis_results_are_rejected_at_ingest() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    engine
        .capture(session, Modality::Audio, 0, 180.0, 0.9, "arrest-threat")
        .await;

    let chunk = CaptureChunk::new(session, Modality::Audio, 500, b"voice".to_vec());
    engine.analysis.respond(
        chunk.payload_ref(),
        AnalysisResponse::new("visual", 60.0, 0.9).with_tag("forged-document"),
    );
    engine.coordinator.submit_chunk(chunk).await.unwrap();

    let snapshot = engine
        .wait_until(session, |s| s.ingest.signals_rejected >= 2)
        .await;
    assert_eq!(snapshot.ingest.signals_accepted, 0);
    assert_eq!(snapshot.scoring.accepted, 0);
    assert_eq!(snapshot.buffered_bytes, 0);
}

#[tokio::test]
async fn unknown_tags_are_kept_but_never_escalate() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;

    engine
        .capture(session, Modality::Audio, 0, 60.0, 0.9, "weather-chat")
        .await;
    engine.wait_scored(session, 1).await;
    engine
        .capture(session, Modality::Visual, 1_000, 60.0, 0.9, "holiday-photos")
        .await;
    let snapshot = engine.wait_scored(session, 2).await;

    assert_eq!(snapshot.ingest.unknown_tags, 2);
    assert_eq!(snapshot.score.escalation, 1.0);
    assert!(snapshot.score.value <= 60.0 + 1e-9);
    assert!(!snapshot.intervened);
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signals_for_unknown_sessions_are_refused() {
    let engine = TestEngine::with_defaults();
    let stranger = SessionId::new();
    let err = engine
        .coordinator
        .submit_signal(signal(stranger, Modality::Audio, 0, 99.0, 1.0, "arrest-threat"))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::UnknownSession(stranger));
}

#[tokio::test]
async fn signals_after_call_end_are_refused() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-unknown").await;
    engine.coordinator.end_session(session).await.unwrap();

    let err = engine
        .coordinator
        .submit_signal(signal(session, Modality::Audio, 0, 99.0, 1.0, "arrest-threat"))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::SessionClosed(session));
}

#[tokio::test]
async fn flood_of_signals_stays_bounded() {
    let engine = TestEngine::with_defaults();
    let max = engine.coordinator.config().scoring.max_window_samples;
    let session = engine.start("+91-unknown").await;

    let total = (max as u64) * 2;
    for i in 0..total {
        engine
            .coordinator
            .submit_signal(
                signal(session, Modality::Behavioral, i, 10.0, 0.9, "small-talk")
                    .with_content(vec![0u8; 256]),
            )
            .await
            .unwrap();
    }
    let snapshot = engine.wait_scored(session, total).await;
    assert!(snapshot.buffered_bytes <= engine.coordinator.config().scoring.buffer_budget_bytes);
    assert_eq!(snapshot.pending_evidence, 0);
    assert_eq!(snapshot.ephemeral_artifacts, 0);
}
