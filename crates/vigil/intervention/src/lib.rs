#![deny(unsafe_code)]
//! # vigil-intervention
//!
//! Intervention Controller: decides and executes autonomous protective
//! action once a session enters evidence mode.
//!
//! Firing is edge-triggered and happens at most once per session. The
//! protective bundle runs call termination first, under a hard budget, then
//! the remaining sub-actions concurrently; anything that outlives its budget
//! keeps running in the background on a best-effort basis.
//!
//! ## Key Types
//!
//! - [`InterventionController`] — per-session `evaluate` / `execute` / `finalize`
//! - [`CallControl`] / [`SimulatedCallControl`] — call platform seam
//! - [`UserNotifier`] / [`RecordingNotifier`] — user-facing warnings
//! - [`CallerBlockRegistry`] — process-wide block list, per-entry locking
//! - [`InterventionLog`] — append-only, hash-linked intervention records

pub mod action;
pub mod control;
pub mod controller;
pub mod error;
pub mod log;
pub mod notify;
pub mod registry;

pub use action::{ActionStatus, InterventionAction, InterventionOutcome, SubAction, SubActionResult};
pub use control::{CallControl, CallControlEvent, SimulatedCallControl};
pub use controller::{InterventionController, InterventionServices};
pub use error::InterventionError;
pub use log::{InterventionLog, InterventionRecord};
pub use notify::{Notification, NotificationKind, RecordingNotifier, Severity, UserNotifier};
pub use registry::{BlockEntry, CallerBlockRegistry};
