#![deny(unsafe_code)]
//! # vigil-ingest
//!
//! Signal Ingest: the boundary between capture/analysis collaborators and the
//! scoring pipeline.
//!
//! Capture delivers timestamped chunks at least once; analysis capabilities
//! answer with loosely-typed results. This crate dedupes the former and
//! validates and normalizes the latter into [`vigil_types::Signal`]s.
//!
//! ## Key Types
//!
//! - [`CaptureChunk`] — one captured audio chunk or visual frame
//! - [`AnalysisRequest`] / [`AnalysisResponse`] — the analysis capability contract
//! - [`SignalNormalizer`] — dedupe + validation + normalization
//! - [`IngestError`] — per-signal rejections (all `Data` class)

pub mod chunk;
pub mod dedupe;
pub mod error;
pub mod normalize;

pub use chunk::{AnalysisRequest, AnalysisResponse, CaptureChunk};
pub use dedupe::DedupeWindow;
pub use error::IngestError;
pub use normalize::{IngestStats, SignalNormalizer};
