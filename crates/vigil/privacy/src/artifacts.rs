use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_types::{ContentHash, IndicatorKind, Modality, Signal};

/// What EphemeralAnalysis may keep about a consumed signal: its content
/// hash and analysis results, never the bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub content_hash: Option<ContentHash>,
    pub modality: Modality,
    pub timestamp_ms: u64,
    pub score: f64,
    pub indicators: BTreeSet<IndicatorKind>,
}

impl DerivedArtifact {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            content_hash: signal.content.as_ref().map(|c| c.content_hash()),
            modality: signal.modality.clone(),
            timestamp_ms: signal.timestamp_ms,
            score: signal.score,
            indicators: signal.indicators.clone(),
        }
    }
}

/// Bounded buffer of derived artifacts for one session.
#[derive(Debug)]
pub struct EphemeralBuffer {
    artifacts: VecDeque<DerivedArtifact>,
    capacity: usize,
}

impl EphemeralBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            artifacts: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, signal: &Signal) {
        if self.artifacts.len() == self.capacity {
            self.artifacts.pop_front();
        }
        self.artifacts.push_back(DerivedArtifact::from_signal(signal));
    }

    /// Discard everything. Returns how many artifacts were purged.
    pub fn purge(&mut self) -> usize {
        let purged = self.artifacts.len();
        self.artifacts.clear();
        self.artifacts.shrink_to_fit();
        if purged > 0 {
            debug!(purged, "Ephemeral artifacts purged");
        }
        purged
    }

    /// Hand the buffered artifacts over, e.g. to seed an evidence chain.
    pub fn drain(&mut self) -> Vec<DerivedArtifact> {
        self.artifacts.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DerivedArtifact> {
        self.artifacts.iter()
    }
}
