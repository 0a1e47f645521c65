#![deny(unsafe_code)]
//! # vigil-evidence
//!
//! Evidence Locker: turns a session's signals into sealed, encrypted,
//! tamper-evident evidence records once the session is in evidence mode.
//!
//! Sealing hashes each raw artifact, encrypts it under a fresh ML-KEM-768
//! encapsulation, appends one entry per artifact to the session's custody
//! chain and signs the result with Ed25519. Records never change after
//! sealing; a later seal supersedes an earlier one on the same chain.
//!
//! ## Key Types
//!
//! - [`EvidenceLocker`] — per-session `seal` / `verify` / `open`
//! - [`EvidenceRecord`] — sealed artifacts, custody log and integrity proof
//! - [`CustodyChain`] — append-only, hash-linked custody arena
//! - [`EvidenceCipher`] / [`PqEvidenceCipher`] — payload encryption seam
//! - [`EvidenceStore`] / [`InMemoryEvidenceStore`] — retention-aware storage

pub mod cipher;
pub mod custody;
pub mod error;
pub mod locker;
pub mod record;
pub mod store;

pub use cipher::{EvidenceCipher, FailingCipher, PqEvidenceCipher, SealedPayload, PQ_SUITE};
pub use custody::{verify_entries, CustodyAction, CustodyChain, CustodyEntry};
pub use error::EvidenceError;
pub use locker::{EvidenceLocker, LOCKER_ACTOR};
pub use record::{descriptor_hash, EvidenceArtifact, EvidenceRecord, EvidenceSigner, IntegrityProof};
pub use store::{spawn_retention_sweeper, EvidenceStore, InMemoryEvidenceStore};
