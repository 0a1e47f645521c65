use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Process-wide engine counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub sessions_started: Counter,
    pub sessions_rejected: Counter,
    pub calls_refused: Counter,
    pub chunks_received: Counter,
    pub duplicates: Counter,
    pub signals_ingested: Counter,
    pub signals_rejected: Counter,
    pub analysis_failures: Counter,
    pub degraded_signals: Counter,
    pub transitions: Counter,
    pub interventions: Counter,
    pub evidence_sealed: Counter,
    pub evidence_failures: Counter,
    pub fatal_sessions: Counter,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.get(),
            sessions_rejected: self.sessions_rejected.get(),
            calls_refused: self.calls_refused.get(),
            chunks_received: self.chunks_received.get(),
            duplicates: self.duplicates.get(),
            signals_ingested: self.signals_ingested.get(),
            signals_rejected: self.signals_rejected.get(),
            analysis_failures: self.analysis_failures.get(),
            degraded_signals: self.degraded_signals.get(),
            transitions: self.transitions.get(),
            interventions: self.interventions.get(),
            evidence_sealed: self.evidence_sealed.get(),
            evidence_failures: self.evidence_failures.get(),
            fatal_sessions: self.fatal_sessions.get(),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_rejected: u64,
    pub calls_refused: u64,
    pub chunks_received: u64,
    pub duplicates: u64,
    pub signals_ingested: u64,
    pub signals_rejected: u64,
    pub analysis_failures: u64,
    pub degraded_signals: u64,
    pub transitions: u64,
    pub interventions: u64,
    pub evidence_sealed: u64,
    pub evidence_failures: u64,
    pub fatal_sessions: u64,
}
