use std::collections::BTreeSet;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use vigil_types::{CallerId, ContentHash, EvidenceId, IndicatorKind, Modality, SessionId};
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::SealedPayload;
use crate::custody::{verify_entries, CustodyAction, CustodyEntry};
use crate::error::EvidenceError;

const RECORD_DOMAIN: &[u8] = b"vigil-evidence-v1:";
const BINDING_DOMAIN: &[u8] = b"vigil-evidence-binding-v1:";

/// One captured artifact inside a sealed record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    /// Hash of the raw bytes, or of the derived descriptor when no raw
    /// bytes were kept.
    pub content_hash: ContentHash,
    pub modality: Modality,
    pub timestamp_ms: u64,
    pub score: f64,
    pub indicators: BTreeSet<IndicatorKind>,
    /// Observed during ephemeral analysis, before evidence mode.
    #[serde(default)]
    pub pre_trigger: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<SealedPayload>,
}

impl EvidenceArtifact {
    fn absorb(&self, hasher: &mut blake3::Hasher) {
        hasher.update(self.content_hash.as_bytes());
        let modality = self.modality.as_str();
        hasher.update(&(modality.len() as u64).to_le_bytes());
        hasher.update(modality.as_bytes());
        hasher.update(&self.timestamp_ms.to_le_bytes());
        hasher.update(&self.score.to_le_bytes());
        hasher.update(&(self.indicators.len() as u64).to_le_bytes());
        for indicator in &self.indicators {
            let tag = indicator.as_str();
            hasher.update(&(tag.len() as u64).to_le_bytes());
            hasher.update(tag.as_bytes());
        }
        hasher.update(&[self.pre_trigger as u8]);
        match &self.payload {
            Some(payload) => {
                hasher.update(&[1]);
                payload.absorb(hasher);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
}

/// Hash of a derived descriptor, used when an artifact has no raw bytes.
pub fn descriptor_hash(
    modality: &Modality,
    timestamp_ms: u64,
    score: f64,
    indicators: &BTreeSet<IndicatorKind>,
) -> ContentHash {
    let mut data = Vec::new();
    data.extend_from_slice(modality.as_str().as_bytes());
    data.push(0);
    data.extend_from_slice(&timestamp_ms.to_le_bytes());
    data.extend_from_slice(&score.to_le_bytes());
    for indicator in indicators {
        data.extend_from_slice(indicator.as_str().as_bytes());
        data.push(0);
    }
    ContentHash::tagged(b"vigil-descriptor-v1", &data)
}

/// Ed25519 signature over a record's binding digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityProof {
    pub digest: ContentHash,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signer: Vec<u8>,
}

impl IntegrityProof {
    pub fn signer_key(&self) -> Result<VerifyingKey, EvidenceError> {
        let bytes: [u8; 32] = self
            .signer
            .as_slice()
            .try_into()
            .map_err(|_| EvidenceError::IntegrityViolation("signer key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| EvidenceError::IntegrityViolation("invalid signer key".into()))
    }

    /// Check the signature against the embedded signer key.
    pub fn verify_signature(&self) -> Result<(), EvidenceError> {
        let bytes: [u8; 64] = self
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| EvidenceError::IntegrityViolation("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&bytes);
        self.signer_key()?
            .verify(self.digest.as_bytes(), &signature)
            .map_err(|_| EvidenceError::IntegrityViolation("signature does not verify".into()))
    }
}

/// The locker's signing identity.
pub struct EvidenceSigner {
    signing_key: SigningKey,
}

impl EvidenceSigner {
    pub fn generate() -> Self {
        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *secret);
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn sign(&self, digest: ContentHash) -> IntegrityProof {
        let signature = self.signing_key.sign(digest.as_bytes());
        IntegrityProof {
            digest,
            signature: signature.to_bytes().to_vec(),
            signer: self.signing_key.verifying_key().as_bytes().to_vec(),
        }
    }
}

/// A sealed, immutable evidence record.
///
/// `custody` is the session's chain up to and including this record's
/// `Sealed` entry. That entry's resulting hash is the record's content
/// digest, and the proof signs the digest bound to the entry hash, so any
/// edit to the artifacts, the metadata or any custody entry is detected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: EvidenceId,
    pub session_id: SessionId,
    pub caller: CallerId,
    pub sealed_at_ms: u64,
    pub sealed_by: String,
    pub cipher_suite: String,
    pub artifacts: Vec<EvidenceArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<EvidenceId>,
    pub retention_expiry_ms: u64,
    pub custody: Vec<CustodyEntry>,
    pub proof: IntegrityProof,
}

impl EvidenceRecord {
    /// Digest over everything except the custody log and the proof.
    pub fn content_digest(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(RECORD_DOMAIN);
        hasher.update(self.id.0.as_bytes());
        hasher.update(self.session_id.0.as_bytes());
        for field in [self.caller.as_str(), self.sealed_by.as_str(), self.cipher_suite.as_str()] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(&self.sealed_at_ms.to_le_bytes());
        hasher.update(&self.retention_expiry_ms.to_le_bytes());
        match &self.supersedes {
            Some(previous) => {
                hasher.update(&[1]);
                hasher.update(previous.0.as_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&(self.artifacts.len() as u64).to_le_bytes());
        for artifact in &self.artifacts {
            artifact.absorb(&mut hasher);
        }
        ContentHash::from_bytes(*hasher.finalize().as_bytes())
    }

    pub(crate) fn binding_digest(content_digest: &ContentHash, seal_entry: &ContentHash) -> ContentHash {
        let mut data = [0u8; 64];
        data[..32].copy_from_slice(content_digest.as_bytes());
        data[32..].copy_from_slice(seal_entry.as_bytes());
        ContentHash::tagged(BINDING_DOMAIN, &data)
    }

    /// Recompute the custody chain, the content digest and the signature.
    pub fn verify(&self) -> Result<(), EvidenceError> {
        verify_entries(&self.session_id, &self.custody)?;
        let seal = self
            .custody
            .last()
            .ok_or_else(|| EvidenceError::IntegrityViolation("empty custody log".into()))?;
        let digest = self.content_digest();
        if seal.action != CustodyAction::Sealed || seal.resulting_hash != digest {
            return Err(EvidenceError::IntegrityViolation(
                "seal entry does not match record contents".into(),
            ));
        }
        if self.proof.digest != Self::binding_digest(&digest, &seal.entry_hash) {
            return Err(EvidenceError::IntegrityViolation(
                "proof does not bind this record".into(),
            ));
        }
        self.proof.verify_signature()
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.retention_expiry_ms
    }

    /// Entry hash of this record's seal entry.
    pub fn seal_hash(&self) -> Option<ContentHash> {
        self.custody.last().map(|e| e.entry_hash)
    }

    /// Overwrite every encrypted payload with zeros.
    pub fn zeroize_payloads(&mut self) {
        for artifact in &mut self.artifacts {
            if let Some(payload) = artifact.payload.as_mut() {
                payload.zeroize();
            }
        }
    }
}
