//! Adversarial test: sealed evidence that was edited after the fact.
//!
//! Any change to an exported report, a stored record or its custody log
//! must fail verification, and a restarted engine must refuse to resume
//! from a chain it cannot verify.

use std::sync::Arc;

use serde_json::Value;
use vigil_evidence::{
    EvidenceError, EvidenceLocker, EvidenceSigner, EvidenceStore, InMemoryEvidenceStore,
    PqEvidenceCipher,
};
use vigil_intervention::SimulatedCallControl;
use vigil_session::{CoordinatorError, EvidenceReport, SessionStart};
use vigil_tests::{digital_arrest, TestEngine};
use vigil_types::{CallerId, EvidenceConfig, SessionId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn sealed_session(engine: &TestEngine) -> SessionId {
    let session = engine.start("+91-fake-judge").await;
    for s in digital_arrest(session) {
        engine.coordinator.submit_signal(s).await.unwrap();
    }
    engine.wait_until(session, |s| !s.evidence.is_empty()).await;
    session
}

/// Export the session report, apply `edit` to its JSON and parse it back.
async fn edited_report(engine: &TestEngine, session: SessionId, edit: impl FnOnce(&mut Value)) -> EvidenceReport {
    let report = engine.coordinator.report(session).await.unwrap();
    assert!(report.verify().is_ok());
    let mut json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    edit(&mut json);
    EvidenceReport::from_json(&json.to_string()).unwrap()
}

// ---------------------------------------------------------------------------
// Exported reports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lowered_artifact_score_is_detected() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let report = edited_report(&engine, session, |json| {
        json["evidence"][0]["artifacts"][0]["score"] = Value::from(1.0);
    })
    .await;
    assert!(matches!(
        report.verify(),
        Err(EvidenceError::IntegrityViolation(_))
    ));
}

#[tokio::test]
async fn backdated_custody_entry_is_detected() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let report = edited_report(&engine, session, |json| {
        let ts = json["evidence"][0]["custody"][0]["timestamp_ms"].as_u64().unwrap();
        json["evidence"][0]["custody"][0]["timestamp_ms"] = Value::from(ts - 60_000);
    })
    .await;
    assert!(!report.is_valid());
}

#[tokio::test]
async fn dropped_custody_entry_is_detected() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let report = edited_report(&engine, session, |json| {
        json["evidence"][0]["custody"].as_array_mut().unwrap().remove(0);
    })
    .await;
    assert!(!report.is_valid());
}

#[tokio::test]
async fn rewritten_intervention_record_is_detected() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let report = edited_report(&engine, session, |json| {
        json["interventions"][0]["trigger_score"] = Value::from(12.5);
    })
    .await;
    assert!(!report.is_valid());
}

#[tokio::test]
async fn substituted_signer_is_detected() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let mut report = engine.coordinator.report(session).await.unwrap();
    report.signer = EvidenceSigner::generate().verifying_key().to_bytes().to_vec();
    assert!(!report.is_valid());
}

#[tokio::test]
async fn wrong_key_pair_cannot_open_sealed_content() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let record = engine
        .store
        .latest_for_session(&session)
        .await
        .unwrap()
        .unwrap();

    let stranger = EvidenceLocker::resume(
        &record,
        Arc::new(PqEvidenceCipher::generate()),
        engine.signer.clone(),
        &EvidenceConfig::default(),
    )
    .unwrap();
    let index = record
        .artifacts
        .iter()
        .position(|a| a.payload.is_some())
        .unwrap();
    assert!(matches!(
        stranger.open(&record, index),
        Err(EvidenceError::Decryption(_)) | Err(EvidenceError::KeyEncapsulation(_))
    ));
}

// ---------------------------------------------------------------------------
// Resuming from a bad chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_refuses_foreign_signer() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;

    let impostor = TestEngine::build(
        engine.coordinator.config().clone(),
        SimulatedCallControl::new(),
        engine.cipher.clone(),
        Arc::new(EvidenceSigner::generate()),
        engine.store.clone(),
    );
    let err = impostor
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("+91-fake-judge")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Evidence(EvidenceError::IntegrityViolation(_))
    ));
    assert!(impostor.coordinator.active_sessions().is_empty());
}

#[tokio::test]
async fn resume_refuses_edited_record() {
    let engine = TestEngine::with_defaults();
    let session = sealed_session(&engine).await;
    let mut record = engine
        .store
        .latest_for_session(&session)
        .await
        .unwrap()
        .unwrap();
    record.artifacts[0].score = 0.0;

    let tampered = InMemoryEvidenceStore::new();
    tampered.put(record).await.unwrap();
    let restarted = TestEngine::build(
        engine.coordinator.config().clone(),
        SimulatedCallControl::new(),
        engine.cipher.clone(),
        engine.signer.clone(),
        tampered,
    );
    let err = restarted
        .coordinator
        .resume_session(session, SessionStart::new(CallerId::new("+91-fake-judge")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Evidence(_)));
    assert!(restarted.coordinator.active_sessions().is_empty());
}
