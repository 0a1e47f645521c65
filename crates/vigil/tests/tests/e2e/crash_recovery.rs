//! End-to-end test: a restarted engine picks an intervened session back up
//! from its evidence chain.
//!
//! The resumed session is in evidence mode from the first signal, does not
//! intervene or notify a second time, and keeps sealing onto the same
//! custody chain.

use vigil_evidence::EvidenceStore;
use vigil_session::{CoordinatorError, SessionStart};
use vigil_tests::{digital_arrest, signal, TestEngine};
use vigil_types::{CallerId, Modality, PrivacyMode, SessionId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run the digital-arrest script to intervention and return the session.
async fn intervened(engine: &TestEngine, caller: &str) -> SessionId {
    let session = engine.start(caller).await;
    for s in digital_arrest(session) {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    engine.wait_until(session, |s| !s.evidence.is_empty()).await;
    session
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resumed_session_is_in_evidence_mode_without_renotifying() {
    let before = TestEngine::with_defaults();
    let session = intervened(&before, "+91-cyber-crime").await;
    let first = before.store.for_session(&session).await.unwrap();

    let after = before.restarted();
    let resumed = after
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("unknown")))
        .await
        .unwrap();
    assert_eq!(resumed, session);

    let snapshot = after.coordinator.snapshot(session).await.unwrap();
    assert_eq!(snapshot.mode, PrivacyMode::EvidenceCollection);
    assert!(snapshot.intervened);
    assert_eq!(snapshot.caller.as_str(), "+91-cyber-crime");
    assert_eq!(snapshot.evidence, vec![first[0].id]);
    assert!(snapshot.transitions.is_empty());

    assert!(after.notifier.delivered().await.is_empty());
    assert!(after.call_control.events().await.is_empty());
    assert_eq!(after.coordinator.metrics().interventions, 0);
}

#[tokio::test]
async fn resumed_session_seals_onto_the_same_chain() {
    let before = TestEngine::with_defaults();
    let session = intervened(&before, "+91-enforcement").await;
    let first = before
        .store
        .latest_for_session(&session)
        .await
        .unwrap()
        .unwrap();

    let after = before.restarted();
    after
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("+91-enforcement")))
        .await
        .unwrap();
    after
        .coordinator
        .submit_signal(
            signal(session, Modality::Visual, 10_000, 90.0, 0.9, "uniform-impersonation")
                .with_content(b"<frame: officer in uniform>".to_vec()),
        )
        .await
        .unwrap();
    let scored = after.wait_scored(session, 1).await;
    assert_eq!(scored.pending_evidence, 1);
    assert!(scored.intervention.is_none());

    let summary = after.coordinator.end_session(session).await.unwrap();
    assert_eq!(summary.snapshot.evidence.len(), 2);

    let latest = after
        .store
        .latest_for_session(&session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.supersedes, Some(first.id));
    assert_eq!(&latest.custody[..first.custody.len()], &first.custody[..]);
    assert!(latest.verify().is_ok());
    assert_eq!(latest.caller, first.caller);

    assert!(after.notifier.delivered().await.is_empty());
    assert!(after.coordinator.intervention_log().for_session(session).await.is_empty());
}

#[tokio::test]
async fn session_without_evidence_resumes_fresh() {
    let engine = TestEngine::with_defaults();
    let session = SessionId::new();
    let resumed = engine
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("+91-friend")))
        .await
        .unwrap();
    assert_eq!(resumed, session);

    let snapshot = engine.coordinator.snapshot(session).await.unwrap();
    assert_eq!(snapshot.mode, PrivacyMode::MemoryOnly);
    assert!(!snapshot.intervened);
    assert!(snapshot.evidence.is_empty());
    assert_eq!(snapshot.caller.as_str(), "+91-friend");
}

#[tokio::test]
async fn active_session_cannot_be_resumed_twice() {
    let engine = TestEngine::with_defaults();
    let session = engine.start("+91-colleague").await;
    let err = engine
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("+91-colleague")))
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::SessionExists(session));
}

#[tokio::test]
async fn blocked_caller_is_refused_on_a_fresh_resume() {
    let before = TestEngine::with_defaults();
    intervened(&before, "+91-repeat-offender").await;

    let err = before
        .coordinator
        .resume_session(SessionId::new(), SessionStart::new(CallerId::new("+91-repeat-offender")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::CallerBlocked(_)));
}
