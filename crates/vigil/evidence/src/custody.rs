use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_types::{ContentHash, SessionId};

use crate::error::EvidenceError;

const ENTRY_DOMAIN: &[u8] = b"vigil-custody-v1:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CustodyAction {
    /// A derived artifact observed during ephemeral analysis.
    PreTriggerObservation,
    /// A raw artifact hashed and encrypted.
    ArtifactCaptured,
    /// A derived descriptor hashed (no raw bytes were available).
    DescriptorCaptured,
    /// A previously sealed record was superseded.
    Superseded,
    /// A record was sealed; the resulting hash is the record's content digest.
    Sealed,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustodyAction::PreTriggerObservation => "pre-trigger-observation",
            CustodyAction::ArtifactCaptured => "artifact-captured",
            CustodyAction::DescriptorCaptured => "descriptor-captured",
            CustodyAction::Superseded => "superseded",
            CustodyAction::Sealed => "sealed",
        }
    }
}

impl fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link of a chain-of-custody log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEntry {
    pub seq: u64,
    pub actor: String,
    pub action: CustodyAction,
    pub timestamp_ms: u64,
    pub resulting_hash: ContentHash,
    pub prev_hash: ContentHash,
    pub entry_hash: ContentHash,
}

impl CustodyEntry {
    fn compute_hash(&self, session_id: &SessionId) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ENTRY_DOMAIN);
        hasher.update(session_id.0.as_bytes());
        hasher.update(&self.seq.to_le_bytes());
        hasher.update(&(self.actor.len() as u64).to_le_bytes());
        hasher.update(self.actor.as_bytes());
        hasher.update(self.action.as_str().as_bytes());
        hasher.update(&self.timestamp_ms.to_le_bytes());
        hasher.update(self.resulting_hash.as_bytes());
        hasher.update(self.prev_hash.as_bytes());
        ContentHash::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn verify_integrity(&self, session_id: &SessionId) -> bool {
        self.entry_hash == self.compute_hash(session_id)
    }
}

/// Check a custody log end to end: sequence numbers from zero, each entry
/// linked to its predecessor, each entry hash recomputed.
pub fn verify_entries(session_id: &SessionId, entries: &[CustodyEntry]) -> Result<(), EvidenceError> {
    let mut expected_prev = ContentHash::zero();
    for (i, entry) in entries.iter().enumerate() {
        if entry.seq != i as u64
            || entry.prev_hash != expected_prev
            || !entry.verify_integrity(session_id)
        {
            return Err(EvidenceError::ChainBroken(i as u64));
        }
        expected_prev = entry.entry_hash;
    }
    Ok(())
}

/// Append-only custody chain for one session.
///
/// Entries are an arena indexed by sequence number. Nothing is ever removed
/// or edited in place.
#[derive(Clone, Debug)]
pub struct CustodyChain {
    session_id: SessionId,
    entries: Vec<CustodyEntry>,
}

impl CustodyChain {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            entries: Vec::new(),
        }
    }

    /// Rebuild a chain from stored entries, refusing a broken one.
    pub fn restore(session_id: SessionId, entries: Vec<CustodyEntry>) -> Result<Self, EvidenceError> {
        verify_entries(&session_id, &entries)?;
        Ok(Self {
            session_id,
            entries,
        })
    }

    pub fn append(
        &mut self,
        actor: &str,
        action: CustodyAction,
        timestamp_ms: u64,
        resulting_hash: ContentHash,
    ) -> &CustodyEntry {
        let mut entry = CustodyEntry {
            seq: self.entries.len() as u64,
            actor: actor.to_string(),
            action,
            timestamp_ms,
            resulting_hash,
            prev_hash: self.head_hash(),
            entry_hash: ContentHash::zero(),
        };
        entry.entry_hash = entry.compute_hash(&self.session_id);
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Hash of the newest entry, zero for an empty chain.
    pub fn head_hash(&self) -> ContentHash {
        self.entries
            .last()
            .map(|e| e.entry_hash)
            .unwrap_or_else(ContentHash::zero)
    }

    pub fn get(&self, seq: u64) -> Option<&CustodyEntry> {
        self.entries.get(seq as usize)
    }

    pub fn entries(&self) -> &[CustodyEntry] {
        &self.entries
    }

    pub fn verify(&self) -> Result<(), EvidenceError> {
        verify_entries(&self.session_id, &self.entries)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
