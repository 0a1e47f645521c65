//! Property tests: privacy mode driven by real scores.
//!
//! Scores from the scoring engine feed the privacy machine, with debounce
//! ticks in between. Evidence mode is entered at most once, only past both
//! thresholds, and never left; every downgrade purges.

use std::sync::Arc;

use proptest::prelude::*;
use vigil_privacy::{PrivacyCommand, PrivacyInput, PrivacyMachine, Transition, TransitionPolicy};
use vigil_scoring::{BufferBudget, ScoringEngine};
use vigil_types::{
    CoercionScore, IndicatorKind, Modality, PrivacyMode, ScoringConfig, SessionId, Signal,
};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Step {
    Signal {
        gap_ms: u64,
        modality: Modality,
        score: f64,
        confidence: f64,
        indicator: Option<IndicatorKind>,
    },
    Tick {
        gap_ms: u64,
    },
}

fn arb_step(max_score: f64, with_indicators: bool) -> impl Strategy<Value = Step> {
    let indicator = if with_indicators {
        prop_oneof![
            Just(None),
            Just(Some(IndicatorKind::AuthorityClaim)),
            Just(Some(IndicatorKind::ForgedDocument)),
            Just(Some(IndicatorKind::ArrestThreat)),
            Just(Some(IndicatorKind::PaymentDemand)),
        ]
        .boxed()
    } else {
        Just(None).boxed()
    };
    prop_oneof![
        4 => (
            0u64..3_000,
            prop_oneof![
                Just(Modality::Audio),
                Just(Modality::Visual),
                Just(Modality::Behavioral),
            ],
            0.0f64..max_score,
            0.1f64..=1.0,
            indicator,
        )
            .prop_map(|(gap_ms, modality, score, confidence, indicator)| Step::Signal {
                gap_ms,
                modality,
                score,
                confidence,
                indicator,
            }),
        1 => (0u64..15_000).prop_map(|gap_ms| Step::Tick { gap_ms }),
    ]
}

/// Scoring engine plus privacy machine for one session.
struct Pipeline {
    session: SessionId,
    scoring: ScoringEngine,
    privacy: PrivacyMachine,
    policy: TransitionPolicy,
    now_ms: u64,
}

impl Pipeline {
    fn new() -> Self {
        let session = SessionId::new();
        let config = ScoringConfig::default();
        let budget = Arc::new(BufferBudget::new(config.buffer_budget_bytes));
        let policy = TransitionPolicy::default();
        Self {
            session,
            scoring: ScoringEngine::new(session, config, budget),
            privacy: PrivacyMachine::new(session, policy),
            policy,
            now_ms: 0,
        }
    }

    /// Apply one step; returns the transition and the score it was made on.
    fn run(&mut self, step: &Step) -> (Transition, CoercionScore) {
        match step {
            Step::Signal {
                gap_ms,
                modality,
                score,
                confidence,
                indicator,
            } => {
                self.now_ms += gap_ms;
                let mut signal =
                    Signal::new(self.session, modality.clone(), self.now_ms, *score, *confidence);
                if let Some(indicator) = indicator {
                    signal = signal.with_indicator(indicator.clone());
                }
                let score = self
                    .scoring
                    .ingest(&signal)
                    .expect("in-order signal within range");
                let transition = self
                    .privacy
                    .apply(PrivacyInput::from_score(&score))
                    .expect("score input never fails");
                (transition, score)
            }
            Step::Tick { gap_ms } => {
                self.now_ms += gap_ms;
                let transition = self
                    .privacy
                    .apply(PrivacyInput::Tick { at_ms: self.now_ms })
                    .expect("tick never fails");
                (transition, self.scoring.current().clone())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Evidence mode is reached at most once, only when the score and the
    /// loudest observed signal clear their thresholds, and is never left.
    #[test]
    fn evidence_mode_is_sticky_and_earned(
        steps in prop::collection::vec(arb_step(100.0, true), 1..80),
    ) {
        let mut pipeline = Pipeline::new();
        let mut entries = 0;
        for step in &steps {
            let before = pipeline.privacy.mode();
            let (transition, score) = pipeline.run(step);

            if before == PrivacyMode::EvidenceCollection {
                prop_assert_eq!(transition.to(), PrivacyMode::EvidenceCollection);
                prop_assert!(transition.commands.is_empty());
            }
            if transition.entered_evidence() {
                entries += 1;
                prop_assert!(score.value >= pipeline.policy.thresholds.intervention);
                prop_assert!(score.peak_signal >= pipeline.policy.pre_trigger_floor);
                prop_assert!(transition.commands.contains(&PrivacyCommand::NotifyEvidenceMode));
                let notify = transition
                    .commands
                    .iter()
                    .position(|c| *c == PrivacyCommand::NotifyEvidenceMode);
                let capture = transition
                    .commands
                    .iter()
                    .position(|c| *c == PrivacyCommand::BeginEvidenceCapture);
                prop_assert!(notify < capture);
            }
            if transition.to().level() < transition.from.level() {
                prop_assert_eq!(&transition.commands, &vec![PrivacyCommand::PurgeBufferedContent]);
            }
        }
        prop_assert!(entries <= 1);
        let recorded = pipeline
            .privacy
            .history()
            .iter()
            .filter(|t| t.to == PrivacyMode::EvidenceCollection)
            .count();
        prop_assert_eq!(recorded, entries);
    }

    /// A call whose signals all stay below suspicion and carry no
    /// indicators never retains anything.
    #[test]
    fn quiet_calls_stay_memory_only(
        steps in prop::collection::vec(arb_step(50.0, false), 1..80),
    ) {
        let mut pipeline = Pipeline::new();
        for step in &steps {
            let (transition, score) = pipeline.run(step);
            prop_assert!(score.value < 50.0);
            prop_assert_eq!(transition.to(), PrivacyMode::MemoryOnly);
            prop_assert!(transition.commands.is_empty());
        }
        prop_assert!(pipeline.privacy.history().is_empty());
    }
}
