#![deny(unsafe_code)]
//! # vigil-session
//!
//! Session Coordinator: one task per live call, running the whole pipeline
//! for that call in order.
//!
//! ```text
//! chunk ─► analysis ─► normalize ─► score ─► privacy ─► intervene ─► seal
//! ```
//!
//! Each session task owns its state and processes one command at a time,
//! so a session's signals are scored, transitioned and sealed strictly in
//! sequence while different sessions run fully in parallel. Analysis calls
//! are dispatched concurrently and fall back to the last good result, at
//! reduced confidence, while the capability is failing.
//!
//! ## Key Types
//!
//! - [`SessionCoordinator`] — admission, routing, resume and reporting
//! - [`AnalysisCapability`] / [`ScriptedAnalysis`] — external analysis seam
//! - [`SessionSnapshot`] / [`SessionSummary`] — observable session state
//! - [`EvidenceReport`] — exportable, self-verifying evidence bundle
//! - [`EngineMetrics`] — process-wide counters

pub mod analysis;
pub mod command;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod report;
mod worker;

pub use analysis::{AnalysisCapability, DegradedCache, ScriptedAnalysis};
pub use command::{AuditFlag, EndReason, SessionCommand, SessionSnapshot, SessionStart, SessionSummary};
pub use coordinator::{CoordinatorServices, SessionCoordinator};
pub use error::{AnalysisError, CoordinatorError};
pub use metrics::{Counter, EngineMetrics, MetricsSnapshot};
pub use report::EvidenceReport;
