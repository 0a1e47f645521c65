use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigil_types::{CoercionScore, Modality, ModalityScore, ScoringConfig, SessionId, Signal};

use crate::budget::BufferBudget;
use crate::error::ScoringError;
use crate::window::{Placement, ScoredSample, SignalWindow};

/// Counters for one session's scoring engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringStats {
    pub accepted: u64,
    pub reordered: u64,
    pub dropped_out_of_window: u64,
    pub rejected: u64,
    pub degraded: u64,
}

/// Scoring state for one session.
///
/// `ingest` is a pure function of the current window plus the new signal:
/// it never blocks, and a rejected signal leaves the score unchanged.
pub struct ScoringEngine {
    session_id: SessionId,
    config: ScoringConfig,
    window: SignalWindow,
    current: CoercionScore,
    stats: ScoringStats,
}

impl ScoringEngine {
    pub fn new(session_id: SessionId, config: ScoringConfig, budget: Arc<BufferBudget>) -> Self {
        let window = SignalWindow::new(&config, budget);
        Self {
            session_id,
            config,
            window,
            current: CoercionScore::zero(session_id),
            stats: ScoringStats::default(),
        }
    }

    /// Fold one signal into the window and return the recomputed score.
    pub fn ingest(&mut self, signal: &Signal) -> Result<CoercionScore, ScoringError> {
        if let Err(e) = self.admit(signal) {
            self.stats.rejected += 1;
            return Err(e);
        }

        let sample = ScoredSample::from_signal(signal);
        match self.window.insert(sample) {
            Ok(Placement::InOrder) => {}
            Ok(Placement::Reordered) => {
                self.stats.reordered += 1;
                debug!(
                    session_id = %self.session_id,
                    timestamp_ms = signal.timestamp_ms,
                    "Late signal applied in timestamp order"
                );
            }
            Err(e @ ScoringError::OutOfWindow { .. }) => {
                self.stats.dropped_out_of_window += 1;
                warn!(
                    session_id = %self.session_id,
                    modality = %signal.modality,
                    timestamp_ms = signal.timestamp_ms,
                    watermark_ms = self.window.watermark().unwrap_or_default(),
                    "Anomaly: signal beyond reorder window dropped"
                );
                return Err(e);
            }
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e);
            }
        }

        self.stats.accepted += 1;
        if signal.degraded {
            self.stats.degraded += 1;
        }
        self.current = self.compute();
        Ok(self.current.clone())
    }

    fn admit(&self, signal: &Signal) -> Result<(), ScoringError> {
        if signal.session_id != self.session_id {
            return Err(ScoringError::ForeignSession);
        }
        if self.config.weights.weight(&signal.modality).is_none() {
            warn!(
                session_id = %self.session_id,
                modality = %signal.modality,
                "Signal with unrecognized modality rejected"
            );
            return Err(ScoringError::UnrecognizedModality(signal.modality.clone()));
        }
        if !(0.0..=100.0).contains(&signal.score) {
            return Err(ScoringError::InvalidSignal(format!(
                "score {} outside 0..=100",
                signal.score
            )));
        }
        if !(0.0..=1.0).contains(&signal.confidence) {
            return Err(ScoringError::InvalidSignal(format!(
                "confidence {} outside 0..=1",
                signal.confidence
            )));
        }
        Ok(())
    }

    /// Recompute the score from the window.
    fn compute(&self) -> CoercionScore {
        let mut score = CoercionScore::zero(self.session_id);
        score.as_of_ms = self.window.watermark().unwrap_or_default();

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut min_confidence = f64::INFINITY;
        let mut indicators = BTreeSet::new();

        for (modality, weight) in self.config.weights.iter() {
            let Some(m) = self.aggregate(&modality) else {
                continue;
            };
            let effective = weight * m.confidence * m.freshness;
            numerator += effective * m.sub_score;
            denominator += effective;
            score.modalities.insert(modality, m);
        }

        for sample in self.window.samples() {
            if self.window.decay(sample) <= 0.0 {
                continue;
            }
            min_confidence = min_confidence.min(sample.confidence);
            score.peak_signal = score.peak_signal.max(sample.score);
            indicators.extend(sample.indicators.iter().cloned());
        }

        let base = if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        };
        let distinct = indicators.iter().filter(|i| i.is_known()).count();
        score.escalation = self.escalation(distinct);
        score.value = (base * score.escalation).clamp(0.0, 100.0);
        score.confidence = if min_confidence.is_finite() {
            min_confidence
        } else {
            0.0
        };
        score.indicators = indicators;
        score
    }

    /// Decay-weighted view of one modality, `None` if nothing contributes.
    fn aggregate(&self, modality: &Modality) -> Option<ModalityScore> {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        let mut confidence = f64::INFINITY;
        let mut freshness: f64 = 0.0;
        let mut samples = 0;

        for sample in self.window.samples().filter(|s| &s.modality == modality) {
            let decay = self.window.decay(sample);
            if decay <= 0.0 {
                continue;
            }
            let w = sample.confidence * decay;
            weighted += sample.score * w;
            weight_sum += w;
            confidence = confidence.min(sample.confidence);
            freshness = freshness.max(decay);
            samples += 1;
        }

        if samples == 0 || weight_sum <= 0.0 {
            return None;
        }
        Some(ModalityScore {
            sub_score: weighted / weight_sum,
            confidence,
            freshness,
            samples,
        })
    }

    /// Multiplier for `distinct` simultaneous indicators.
    ///
    /// One or zero indicators never escalate; each further distinct indicator
    /// adds `escalation_step`, capped at `escalation_cap`.
    fn escalation(&self, distinct: usize) -> f64 {
        if distinct < 2 {
            return 1.0;
        }
        (1.0 + self.config.escalation_step * (distinct - 1) as f64).min(self.config.escalation_cap)
    }

    pub fn current(&self) -> &CoercionScore {
        &self.current
    }

    pub fn stats(&self) -> ScoringStats {
        self.stats
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Footprint of the derived samples in the window.
    pub fn buffered_bytes(&self) -> usize {
        self.window.sample_bytes()
    }

    /// Bytes held against the shared buffer budget, reserve included.
    pub fn reserved_bytes(&self) -> usize {
        self.window.reserved_bytes()
    }

    /// Drop the window and hand its reservation back to the budget.
    pub fn release(&mut self) {
        self.window.clear();
    }
}
