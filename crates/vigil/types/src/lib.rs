#![deny(unsafe_code)]
//! # vigil-types
//!
//! Shared vocabulary for the Vigil coercion scoring and intervention engine.
//!
//! Every other crate in the workspace speaks in these types: analysis
//! signals, coercion scores, privacy modes, content hashes and the engine
//! configuration tree.
//!
//! ## Key Types
//!
//! - [`Signal`] — one normalized analysis result for a session
//! - [`CoercionScore`] — the running assessment derived from the signal window
//! - [`PrivacyMode`] — what a session is allowed to retain
//! - [`ContentHash`] — BLAKE3 content address used by the evidence chain
//! - [`ErrorClass`] / [`Classify`] — severity classes shared by all error enums
//! - [`EngineConfig`] — thresholds, weights and budgets, with named profiles

pub mod config;
pub mod error;
pub mod hash;
pub mod ids;
pub mod privacy;
pub mod score;
pub mod signal;
pub mod time;

pub use config::{
    ConfigError, CoordinatorConfig, EngineConfig, EvidenceConfig, InterventionConfig,
    ModalityWeights, PrivacyConfig, RetryPolicy, ScoringConfig, ThresholdProfile, Thresholds,
};
pub use error::{Classify, ErrorClass};
pub use hash::{ContentHash, ContentHashError};
pub use ids::{CallerId, EvidenceId, InterventionId, SessionId};
pub use privacy::PrivacyMode;
pub use score::{CoercionScore, ModalityScore};
pub use signal::{IndicatorKind, Modality, RawContent, Signal};
pub use time::now_ms;
