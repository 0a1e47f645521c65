//! Adversarial test: a blocked scammer calls back.
//!
//! The block is the only state shared across sessions. A repeat call from a
//! blocked number is refused at call start; other callers are unaffected,
//! and the block lapses when its duration runs out.

use std::time::Duration;

use vigil_intervention::{CallControlEvent, NotificationKind, Severity};
use vigil_session::{CoordinatorError, SessionStart};
use vigil_tests::{digital_arrest, TestEngine};
use vigil_types::{now_ms, CallerId, EngineConfig, PrivacyMode, SessionId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SCAMMER: &str = "+91-fake-cbi";

async fn first_call(engine: &TestEngine) {
    let session = engine.start(SCAMMER).await;
    for s in digital_arrest(session) {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    engine.wait_until(session, |s| s.intervention.is_some()).await;
}

async fn call_back(engine: &TestEngine) -> Result<SessionId, CoordinatorError> {
    engine
        .coordinator
        .start_session(SessionStart::new(CallerId::new(SCAMMER)))
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocked_caller_is_refused_at_call_start() {
    let engine = TestEngine::with_defaults();
    first_call(&engine).await;
    assert!(engine.coordinator.registry().get(&CallerId::new(SCAMMER)).is_some());

    let err = call_back(&engine).await.unwrap_err();
    assert_eq!(err, CoordinatorError::CallerBlocked(CallerId::new(SCAMMER)));
    assert_eq!(engine.coordinator.metrics().calls_refused, 1);
    assert_eq!(engine.coordinator.active_sessions().len(), 1);

    let refused: Vec<_> = engine
        .notifier
        .delivered()
        .await
        .into_iter()
        .filter(|n| n.kind == NotificationKind::CallRefused)
        .collect();
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].severity, Severity::Warning);

    let terminated = engine
        .call_control
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e, CallControlEvent::Terminated(_)))
        .count();
    assert_eq!(terminated, 2);
}

#[tokio::test]
async fn other_callers_are_unaffected() {
    let engine = TestEngine::with_defaults();
    first_call(&engine).await;

    let family = engine.start("+91-sister").await;
    let snapshot = engine.coordinator.snapshot(family).await.unwrap();
    assert_eq!(snapshot.mode, PrivacyMode::MemoryOnly);
    assert_eq!(engine.coordinator.metrics().calls_refused, 0);
}

#[tokio::test]
async fn block_lapses_after_its_duration() {
    let mut config = EngineConfig::default();
    config.intervention.block_duration_ms = 50;
    let engine = TestEngine::new(config);
    first_call(&engine).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let session = call_back(&engine).await.unwrap();
    assert_eq!(engine.coordinator.caller_of(session), Some(CallerId::new(SCAMMER)));
    assert_eq!(engine.coordinator.registry().sweep_expired(now_ms()), 1);
}

#[tokio::test]
async fn repeat_offence_extends_the_block() {
    let mut config = EngineConfig::default();
    config.intervention.block_duration_ms = 50;
    let engine = TestEngine::new(config);
    first_call(&engine).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = call_back(&engine).await.unwrap();
    for s in digital_arrest(second) {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    engine.wait_until(second, |s| s.intervention.is_some()).await;

    let entry = engine.coordinator.registry().get(&CallerId::new(SCAMMER)).unwrap();
    assert_eq!(entry.block_count, 2);
    assert_eq!(entry.session_id, second);
}

#[tokio::test]
async fn operator_unblock_lets_the_caller_through() {
    let engine = TestEngine::with_defaults();
    first_call(&engine).await;
    assert!(call_back(&engine).await.is_err());

    engine.coordinator.registry().unblock(&CallerId::new(SCAMMER));
    assert!(call_back(&engine).await.is_ok());
}
