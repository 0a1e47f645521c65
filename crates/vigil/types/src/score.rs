use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::signal::{IndicatorKind, Modality};

/// Decay-weighted view of one modality inside the scoring window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModalityScore {
    /// Decay-weighted mean of the modality's sample scores, 0–100.
    pub sub_score: f64,
    /// Lowest confidence among the modality's samples.
    pub confidence: f64,
    /// Decay factor of the freshest sample, 0–1.
    pub freshness: f64,
    pub samples: usize,
}

/// Running coercion assessment for one session.
///
/// Transient: always recomputed from the current signal window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoercionScore {
    pub session_id: SessionId,
    /// Overall score, 0–100.
    pub value: f64,
    /// Minimum confidence across every contributing sample, 0–1.
    pub confidence: f64,
    pub modalities: BTreeMap<Modality, ModalityScore>,
    /// Distinct indicators present in the window.
    pub indicators: BTreeSet<IndicatorKind>,
    /// Multiplier applied for simultaneous indicators (1.0 when none applied).
    pub escalation: f64,
    /// Highest raw sample score currently in the window.
    pub peak_signal: f64,
    /// Watermark the score was computed at.
    pub as_of_ms: u64,
}

impl CoercionScore {
    pub fn zero(session_id: SessionId) -> Self {
        Self {
            session_id,
            value: 0.0,
            confidence: 0.0,
            modalities: BTreeMap::new(),
            indicators: BTreeSet::new(),
            escalation: 1.0,
            peak_signal: 0.0,
            as_of_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modalities.is_empty()
    }

    /// Short comma-separated indicator list for notifications and logs.
    pub fn indicator_summary(&self) -> String {
        self.indicators
            .iter()
            .map(IndicatorKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
