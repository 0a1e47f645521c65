//! Property tests: the intervention decision is edge-triggered.
//!
//! Whatever sequence of scores and modes a session goes through, the
//! controller fires at most once, and only on the first evaluation in
//! evidence mode.

use std::sync::Arc;

use proptest::prelude::*;
use vigil_intervention::{
    CallerBlockRegistry, InterventionController, InterventionLog, InterventionServices,
    RecordingNotifier, SimulatedCallControl,
};
use vigil_privacy::{PrivacyInput, PrivacyMachine, TransitionPolicy};
use vigil_scoring::{BufferBudget, ScoringEngine};
use vigil_types::{
    CallerId, CoercionScore, IndicatorKind, InterventionConfig, Modality, PrivacyMode,
    ScoringConfig, SessionId, Signal,
};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn services() -> InterventionServices {
    InterventionServices {
        call_control: Arc::new(SimulatedCallControl::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        registry: Arc::new(CallerBlockRegistry::new()),
        log: Arc::new(InterventionLog::new()),
    }
}

fn controller(session: SessionId) -> InterventionController {
    InterventionController::new(
        session,
        CallerId::new("+91-unknown"),
        InterventionConfig::default(),
        services(),
    )
}

fn arb_mode() -> impl Strategy<Value = PrivacyMode> {
    prop_oneof![
        Just(PrivacyMode::MemoryOnly),
        Just(PrivacyMode::EphemeralAnalysis),
        Just(PrivacyMode::EvidenceCollection),
    ]
}

fn arb_evaluation() -> impl Strategy<Value = (f64, u64, PrivacyMode)> {
    (0.0f64..=100.0, 0u64..100_000, arb_mode())
}

fn score(session: SessionId, value: f64, as_of_ms: u64) -> CoercionScore {
    let mut score = CoercionScore::zero(session);
    score.value = value;
    score.peak_signal = value;
    score.confidence = 0.9;
    score.as_of_ms = as_of_ms;
    score
}

fn arb_signal() -> impl Strategy<Value = (u64, Modality, f64, Option<IndicatorKind>)> {
    (
        0u64..3_000,
        prop_oneof![
            Just(Modality::Audio),
            Just(Modality::Visual),
            Just(Modality::Behavioral),
        ],
        0.0f64..=100.0,
        prop_oneof![
            Just(None),
            Just(Some(IndicatorKind::AuthorityClaim)),
            Just(Some(IndicatorKind::UrgencyEscalation)),
            Just(Some(IndicatorKind::ForgedDocument)),
            Just(Some(IndicatorKind::PaymentDemand)),
        ],
    )
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// The controller fires exactly at the first evidence-mode evaluation
    /// and never again.
    #[test]
    fn fires_at_most_once_on_first_evidence_mode(
        evaluations in prop::collection::vec(arb_evaluation(), 1..60),
    ) {
        let session = SessionId::new();
        let mut controller = controller(session);

        let first_evidence = evaluations
            .iter()
            .position(|(_, _, mode)| *mode == PrivacyMode::EvidenceCollection);
        let mut fired_at = Vec::new();
        for (i, (value, at_ms, mode)) in evaluations.iter().enumerate() {
            if let Some(action) = controller.evaluate(&score(session, *value, *at_ms), *mode) {
                prop_assert_eq!(action.session_id, session);
                prop_assert_eq!(action.trigger_score, *value);
                prop_assert_eq!(action.trigger_at_ms, *at_ms);
                fired_at.push(i);
            }
        }

        match first_evidence {
            Some(i) => prop_assert_eq!(fired_at, vec![i]),
            None => prop_assert!(fired_at.is_empty()),
        }
        prop_assert_eq!(controller.has_fired(), first_evidence.is_some());
    }

    /// A recovered controller whose intervention already ran stays quiet.
    #[test]
    fn recovered_controller_never_fires(
        evaluations in prop::collection::vec(arb_evaluation(), 1..40),
    ) {
        let session = SessionId::new();
        let mut controller = InterventionController::already_fired(
            session,
            CallerId::new("+91-unknown"),
            InterventionConfig::default(),
            services(),
        );
        for (value, at_ms, mode) in evaluations {
            prop_assert!(controller.evaluate(&score(session, value, at_ms), mode).is_none());
        }
    }

    /// Driven by real scores, the controller fires on the same score that
    /// moved the session into evidence mode, and only then.
    #[test]
    fn fires_exactly_when_evidence_mode_is_entered(
        signals in prop::collection::vec(arb_signal(), 1..60),
    ) {
        let session = SessionId::new();
        let config = ScoringConfig::default();
        let budget = Arc::new(BufferBudget::new(config.buffer_budget_bytes));
        let mut scoring = ScoringEngine::new(session, config, budget);
        let mut privacy = PrivacyMachine::new(session, TransitionPolicy::default());
        let mut controller = controller(session);

        let mut at_ms = 0;
        let mut fired = 0;
        for (gap_ms, modality, value, indicator) in signals {
            at_ms += gap_ms;
            let mut signal = Signal::new(session, modality, at_ms, value, 0.9);
            if let Some(indicator) = indicator {
                signal = signal.with_indicator(indicator);
            }
            let score = scoring.ingest(&signal).expect("in-order signal within range");
            let transition = privacy
                .apply(PrivacyInput::from_score(&score))
                .expect("score input never fails");

            let action = controller.evaluate(&score, transition.to());
            prop_assert_eq!(action.is_some(), transition.entered_evidence());
            if action.is_some() {
                fired += 1;
            }
        }

        let reached_evidence = privacy.mode() == PrivacyMode::EvidenceCollection;
        prop_assert_eq!(fired, usize::from(reached_evidence));
    }
}
