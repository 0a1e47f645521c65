#![deny(unsafe_code)]
//! # vigil-scoring
//!
//! Coercion Scoring Engine.
//!
//! Combines per-session analysis signals into a single time-varying coercion
//! score. Each modality is aggregated with linear time decay over a sliding
//! window; modalities are combined by configured weight and confidence; the
//! simultaneous presence of several manipulation indicators applies a capped
//! escalation multiplier. The final score never exceeds 100.
//!
//! The engine never blocks and never holds raw content: the window stores
//! only derived [`ScoredSample`]s, accounted against a process-wide
//! [`BufferBudget`].
//!
//! ## Key Types
//!
//! - [`ScoringEngine`] — one session's scoring state; `ingest(signal) -> CoercionScore`
//! - [`SignalWindow`] — time-ordered sample window with a bounded reorder tolerance
//! - [`BufferBudget`] — shared byte budget for buffered scoring state
//! - [`ScoringError`] — per-signal rejections

pub mod budget;
pub mod engine;
pub mod error;
pub mod window;

pub use budget::BufferBudget;
pub use engine::{ScoringEngine, ScoringStats};
pub use error::ScoringError;
pub use window::{Placement, ScoredSample, SignalWindow};
