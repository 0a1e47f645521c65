//! Engine configuration.
//!
//! Thresholds, weights and budgets are configuration, never constants.
//! Named [`ThresholdProfile`]s override the suspicion and intervention
//! thresholds for a user segment or region.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::Modality;

const WEIGHT_EPSILON: f64 = 1e-6;

/// Root configuration for one engine instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub intervention: InterventionConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Named threshold overrides, selected per session.
    #[serde(default)]
    pub profiles: BTreeMap<String, ThresholdProfile>,
}

impl EngineConfig {
    /// Effective thresholds for a session started under `profile`.
    ///
    /// Unknown profile names fall back to the base thresholds.
    pub fn thresholds_for(&self, profile: Option<&str>) -> Thresholds {
        let base = self.privacy.thresholds;
        match profile.and_then(|name| self.profiles.get(name)) {
            Some(p) => Thresholds {
                suspicion: p.suspicion.unwrap_or(base.suspicion),
                intervention: p.intervention.unwrap_or(base.intervention),
            },
            None => base,
        }
    }

    /// Reject configurations the engine cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.scoring.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConfigError::WeightsNotNormalized(sum));
        }
        for (modality, w) in self.scoring.weights.iter() {
            if !(0.0..=1.0).contains(&w) {
                return Err(ConfigError::InvalidValue {
                    field: format!("scoring.weights.{}", modality),
                    reason: format!("{} is outside 0..=1", w),
                });
            }
        }
        if self.scoring.window_ms == 0 {
            return Err(ConfigError::invalid("scoring.window_ms", "must be non-zero"));
        }
        if self.scoring.reorder_window_ms >= self.scoring.window_ms {
            return Err(ConfigError::invalid(
                "scoring.reorder_window_ms",
                "must be shorter than the scoring window",
            ));
        }
        if self.scoring.escalation_cap < 1.0 || self.scoring.escalation_step < 0.0 {
            return Err(ConfigError::invalid(
                "scoring.escalation_cap",
                "escalation must never reduce a score",
            ));
        }
        if self.scoring.max_window_samples == 0 {
            return Err(ConfigError::invalid("scoring.max_window_samples", "must be non-zero"));
        }

        self.privacy.thresholds.check("privacy.thresholds")?;
        for name in self.profiles.keys() {
            self.thresholds_for(Some(name))
                .check(&format!("profiles.{}", name))?;
        }
        if !(0.0..=self.privacy.thresholds.intervention).contains(&self.privacy.pre_trigger_margin) {
            return Err(ConfigError::invalid(
                "privacy.pre_trigger_margin",
                "must lie between 0 and the intervention threshold",
            ));
        }

        if self.intervention.termination_budget_ms == 0 {
            return Err(ConfigError::invalid(
                "intervention.termination_budget_ms",
                "must be non-zero",
            ));
        }
        if self.intervention.notify_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "intervention.notify_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.intervention.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "intervention.retry.max_attempts",
                "at least one attempt is required",
            ));
        }

        if self.coordinator.max_sessions == 0 {
            return Err(ConfigError::invalid("coordinator.max_sessions", "must be non-zero"));
        }
        if self.coordinator.analysis_timeout_ms == 0 || self.coordinator.analysis_timeout_ms > 2_000 {
            return Err(ConfigError::invalid(
                "coordinator.analysis_timeout_ms",
                "must be between 1 and 2000",
            ));
        }
        let sessions = self.coordinator.max_sessions;
        if self.scoring.session_reserve_bytes.saturating_mul(sessions) > self.scoring.buffer_budget_bytes {
            return Err(ConfigError::invalid(
                "scoring.session_reserve_bytes",
                "the reserves of max_sessions sessions must fit in buffer_budget_bytes",
            ));
        }
        if self.coordinator.session_chunk_bytes.saturating_mul(sessions)
            > self.coordinator.chunk_budget_bytes
        {
            return Err(ConfigError::invalid(
                "coordinator.session_chunk_bytes",
                "the shares of max_sessions sessions must fit in chunk_budget_bytes",
            ));
        }
        let factor = self.coordinator.degraded_confidence_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::invalid(
                "coordinator.degraded_confidence_factor",
                "must lie in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Scoring window, weights and escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Sliding window for decay-weighted aggregation
    pub window_ms: u64,
    /// How far behind the watermark a late signal may arrive and still count
    pub reorder_window_ms: u64,
    pub weights: ModalityWeights,
    /// Escalation added per distinct indicator beyond the first
    pub escalation_step: f64,
    /// Upper bound on the escalation multiplier
    pub escalation_cap: f64,
    /// Per-session bound on retained samples
    pub max_window_samples: usize,
    /// Process-wide byte cap on buffered scoring state
    pub buffer_budget_bytes: usize,
    /// Share of the scoring budget set aside for each session up front
    pub session_reserve_bytes: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            reorder_window_ms: 2_000,
            weights: ModalityWeights::default(),
            escalation_step: 0.8,
            escalation_cap: 2.0,
            max_window_samples: 256,
            buffer_budget_bytes: 4 * 1024 * 1024, // 4 MiB
            session_reserve_bytes: 64 * 1024,
        }
    }
}

/// Per-modality weights. Must sum to 1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModalityWeights {
    pub audio: f64,
    pub visual: f64,
    pub behavioral: f64,
}

impl ModalityWeights {
    /// Weight for a modality, `None` for modalities the engine does not score.
    pub fn weight(&self, modality: &Modality) -> Option<f64> {
        match modality {
            Modality::Audio => Some(self.audio),
            Modality::Visual => Some(self.visual),
            Modality::Behavioral => Some(self.behavioral),
            Modality::Other(_) => None,
        }
    }

    pub fn sum(&self) -> f64 {
        self.audio + self.visual + self.behavioral
    }

    pub fn iter(&self) -> impl Iterator<Item = (Modality, f64)> {
        [
            (Modality::Audio, self.audio),
            (Modality::Visual, self.visual),
            (Modality::Behavioral, self.behavioral),
        ]
        .into_iter()
    }
}

impl Default for ModalityWeights {
    fn default() -> Self {
        Self {
            audio: 0.40,
            visual: 0.35,
            behavioral: 0.25,
        }
    }
}

/// Score thresholds that drive the privacy state machine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// MemoryOnly → EphemeralAnalysis
    pub suspicion: f64,
    /// → EvidenceCollection, and the intervention trigger
    pub intervention: f64,
}

impl Thresholds {
    fn check(&self, field: &str) -> Result<(), ConfigError> {
        if !(self.suspicion > 0.0 && self.suspicion < self.intervention && self.intervention <= 100.0) {
            return Err(ConfigError::ThresholdOrder {
                field: field.to_string(),
                suspicion: self.suspicion,
                intervention: self.intervention,
            });
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicion: 50.0,
            intervention: 85.0,
        }
    }
}

/// Named override of the base thresholds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    #[serde(default)]
    pub suspicion: Option<f64>,
    #[serde(default)]
    pub intervention: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub thresholds: Thresholds,
    /// EvidenceCollection requires a raw signal of at least
    /// `intervention - pre_trigger_margin` to have been observed.
    pub pre_trigger_margin: f64,
    /// How long the score must stay below suspicion before downgrading
    pub debounce_ms: u64,
    /// Bound on derived artifacts kept while in EphemeralAnalysis
    pub max_ephemeral_artifacts: usize,
}

impl PrivacyConfig {
    pub fn pre_trigger_floor(&self, thresholds: &Thresholds) -> f64 {
        (thresholds.intervention - self.pre_trigger_margin).max(0.0)
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            pre_trigger_margin: 45.0,
            debounce_ms: 10_000,
            max_ephemeral_artifacts: 512,
        }
    }
}

/// Retry policy for one intervention sub-action.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    /// Decision-to-termination budget
    pub termination_budget_ms: u64,
    /// Budget for each remaining sub-action before it is left running in the background
    pub action_budget_ms: u64,
    pub retry: RetryPolicy,
    /// How long a caller stays blocked
    pub block_duration_ms: u64,
    /// How long a session lingers after intervention before it is torn down
    pub cooldown_ms: u64,
    /// Longest a user notification may take before it is abandoned
    pub notify_timeout_ms: u64,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            termination_budget_ms: 1_000,
            action_budget_ms: 500,
            retry: RetryPolicy::default(),
            block_duration_ms: 24 * 60 * 60 * 1000,
            cooldown_ms: 5_000,
            notify_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Legal retention period for sealed records
    pub retention_days: u64,
    /// Interval of the retention sweeper
    pub sweep_interval_ms: u64,
    /// Where the payload key pair lives; generated there on first use.
    /// Without it the key exists only for the life of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl EvidenceConfig {
    pub fn retention_ms(&self) -> u64 {
        self.retention_days.saturating_mul(24 * 60 * 60 * 1000)
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            retention_days: 2_555, // 7 years
            sweep_interval_ms: 60_000,
            key_file: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Concurrent session cap
    pub max_sessions: usize,
    /// How long a new session may wait for a free slot
    pub admission_wait_ms: u64,
    /// Per-request analysis timeout
    pub analysis_timeout_ms: u64,
    /// Confidence multiplier for responses replayed from the degraded cache
    pub degraded_confidence_factor: f64,
    /// Consecutive transient failures before the user is told analysis is degraded
    pub sustained_transient_threshold: u32,
    /// Per-session command channel depth
    pub command_buffer: usize,
    /// Process-wide byte cap on raw chunks waiting for analysis
    pub chunk_budget_bytes: usize,
    /// Per-session cap on raw chunks waiting for analysis
    pub session_chunk_bytes: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            admission_wait_ms: 250,
            analysis_timeout_ms: 2_000,
            degraded_confidence_factor: 0.5,
            sustained_transient_threshold: 3,
            command_buffer: 256,
            chunk_budget_bytes: 32 * 1024 * 1024, // 32 MiB
            session_chunk_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Configuration validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("modality weights must sum to 1, got {0}")]
    WeightsNotNormalized(f64),

    #[error("{field}: need 0 < suspicion ({suspicion}) < intervention ({intervention}) <= 100")]
    ThresholdOrder {
        field: String,
        suspicion: f64,
        intervention: f64,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
