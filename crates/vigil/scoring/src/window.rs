use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigil_types::{IndicatorKind, Modality, ScoringConfig, Signal};

use crate::budget::BufferBudget;
use crate::error::ScoringError;

/// Derived view of a signal, the only thing the window retains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredSample {
    pub timestamp_ms: u64,
    pub modality: Modality,
    pub score: f64,
    pub confidence: f64,
    pub indicators: BTreeSet<IndicatorKind>,
    pub degraded: bool,
}

impl ScoredSample {
    /// Copy the derived fields of a signal. Raw content is never copied.
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            timestamp_ms: signal.timestamp_ms,
            modality: signal.modality.clone(),
            score: signal.score,
            confidence: signal.confidence,
            indicators: signal.indicators.clone(),
            degraded: signal.degraded,
        }
    }

    /// Bytes charged against the buffer budget for this sample.
    pub fn footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.indicators.len() * std::mem::size_of::<IndicatorKind>()
    }
}

/// Where an accepted sample landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// At or after the watermark.
    InOrder,
    /// Late, but inside the reorder window; inserted in timestamp order.
    Reordered,
}

/// Time-ordered window of samples for one session.
///
/// The watermark is the latest timestamp seen. Samples whose age relative to
/// the watermark reaches the window length expire; samples arriving more
/// than the reorder tolerance behind the watermark are refused.
///
/// A window takes `session_reserve_bytes` from the shared budget when it is
/// created. Samples are charged against that reserve first and only the
/// excess competes with other sessions, so a window can always hold as many
/// samples as its reserve covers.
pub struct SignalWindow {
    samples: VecDeque<ScoredSample>,
    watermark_ms: Option<u64>,
    window_ms: u64,
    reorder_ms: u64,
    max_samples: usize,
    budget: Arc<BufferBudget>,
    /// Bytes taken from the budget at creation
    floor: usize,
    /// Footprint of the samples currently held
    used: usize,
}

impl SignalWindow {
    pub fn new(config: &ScoringConfig, budget: Arc<BufferBudget>) -> Self {
        let floor = if budget.try_reserve(config.session_reserve_bytes) {
            config.session_reserve_bytes
        } else {
            warn!(
                requested = config.session_reserve_bytes,
                available = budget.available(),
                "Session reserve unavailable; window shares the budget only"
            );
            0
        };
        Self {
            samples: VecDeque::new(),
            watermark_ms: None,
            window_ms: config.window_ms.max(1),
            reorder_ms: config.reorder_window_ms,
            max_samples: config.max_window_samples.max(1),
            budget,
            floor,
            used: 0,
        }
    }

    pub fn insert(&mut self, sample: ScoredSample) -> Result<Placement, ScoringError> {
        if let Some(wm) = self.watermark_ms {
            if sample.timestamp_ms < wm && wm - sample.timestamp_ms > self.reorder_ms {
                return Err(ScoringError::OutOfWindow {
                    timestamp_ms: sample.timestamp_ms,
                    watermark_ms: wm,
                });
            }
        }

        while self.samples.len() >= self.max_samples {
            self.evict_oldest();
        }
        let bytes = sample.footprint();
        while !self.charge(bytes) {
            if !self.evict_oldest() {
                return Err(ScoringError::BufferExhausted {
                    requested: bytes,
                    available: self.budget.available(),
                });
            }
        }

        let placement = match self.watermark_ms {
            Some(wm) if sample.timestamp_ms < wm => {
                let ts = sample.timestamp_ms;
                let idx = self.samples.partition_point(|s| s.timestamp_ms <= ts);
                self.samples.insert(idx, sample);
                Placement::Reordered
            }
            _ => {
                self.watermark_ms = Some(sample.timestamp_ms);
                self.samples.push_back(sample);
                Placement::InOrder
            }
        };
        self.expire();
        Ok(placement)
    }

    /// Drop samples that have aged out of the window.
    fn expire(&mut self) {
        let Some(wm) = self.watermark_ms else {
            return;
        };
        let mut expired = 0;
        while let Some(front) = self.samples.front() {
            if wm - front.timestamp_ms < self.window_ms {
                break;
            }
            self.evict_oldest();
            expired += 1;
        }
        if expired > 0 {
            debug!(expired, remaining = self.samples.len(), "Samples aged out of window");
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.samples.pop_front() {
            Some(sample) => {
                self.discharge(sample.footprint());
                true
            }
            None => false,
        }
    }

    /// Bytes held against the budget: the reserve, or the samples once
    /// they outgrow it.
    fn held(&self) -> usize {
        self.used.max(self.floor)
    }

    /// Account for `bytes` more samples, drawing on the shared budget only
    /// past the reserve.
    fn charge(&mut self, bytes: usize) -> bool {
        let needed = (self.used + bytes).max(self.floor) - self.held();
        if needed > 0 && !self.budget.try_reserve(needed) {
            return false;
        }
        self.used += bytes;
        true
    }

    fn discharge(&mut self, bytes: usize) {
        let before = self.held();
        self.used = self.used.saturating_sub(bytes);
        self.budget.release(before - self.held());
    }

    /// Linear decay weight of a sample: 1 at the watermark, 0 at the window edge.
    pub fn decay(&self, sample: &ScoredSample) -> f64 {
        let wm = self.watermark_ms.unwrap_or(sample.timestamp_ms);
        let age = wm.saturating_sub(sample.timestamp_ms) as f64;
        (1.0 - age / self.window_ms as f64).clamp(0.0, 1.0)
    }

    pub fn samples(&self) -> impl Iterator<Item = &ScoredSample> {
        self.samples.iter()
    }

    pub fn watermark(&self) -> Option<u64> {
        self.watermark_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes this window currently holds against the shared budget,
    /// including the unused part of its reserve.
    pub fn reserved_bytes(&self) -> usize {
        self.held()
    }

    /// Footprint of the samples themselves.
    pub fn sample_bytes(&self) -> usize {
        self.used
    }

    /// Drop every sample and hand the reserve back.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.budget.release(self.held());
        self.used = 0;
        self.floor = 0;
    }
}

impl Drop for SignalWindow {
    fn drop(&mut self) {
        self.budget.release(self.held());
    }
}
