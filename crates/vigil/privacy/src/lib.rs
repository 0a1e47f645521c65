#![deny(unsafe_code)]
//! # vigil-privacy
//!
//! Privacy State Machine: governs what a session may retain.
//!
//! ```text
//!   MemoryOnly ──score ≥ suspicion──▶ EphemeralAnalysis ──score ≥ intervention──▶ EvidenceCollection
//!       ▲                                   │                                         (sticky)
//!       └──── below suspicion for debounce ─┘
//! ```
//!
//! Transitions are computed by a pure function, [`step`], which returns the
//! next state together with the side-effect [`PrivacyCommand`]s the session
//! must carry out in order. Every downgrade purges buffered content; every
//! entry into evidence mode notifies the user before capture begins.
//!
//! ## Key Types
//!
//! - [`PrivacyState`] — tagged state, including debounce bookkeeping
//! - [`PrivacyMachine`] — one session's state plus transition history
//! - [`EphemeralBuffer`] — derived artifacts kept while in EphemeralAnalysis
//! - [`PrivacyError`] — `InvalidTransition` is Fatal

pub mod artifacts;
pub mod error;
pub mod machine;
pub mod state;

pub use artifacts::{DerivedArtifact, EphemeralBuffer};
pub use error::PrivacyError;
pub use machine::{PrivacyMachine, TransitionLogEntry};
pub use state::{step, PrivacyCommand, PrivacyInput, PrivacyState, Transition, TransitionPolicy};
