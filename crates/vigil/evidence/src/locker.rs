use std::sync::Arc;

use tracing::{debug, info, warn};
use vigil_privacy::DerivedArtifact;
use vigil_types::{
    CallerId, ContentHash, EvidenceConfig, EvidenceId, PrivacyMode, SessionId, Signal,
};
use zeroize::Zeroizing;

use crate::cipher::EvidenceCipher;
use crate::custody::{CustodyAction, CustodyChain};
use crate::error::EvidenceError;
use crate::record::{descriptor_hash, EvidenceArtifact, EvidenceRecord, EvidenceSigner, IntegrityProof};

pub const LOCKER_ACTOR: &str = "vigil-evidence-locker";

/// Per-session evidence locker.
///
/// Owns the session's single custody chain. Every sealed record extends
/// that chain; a second seal supersedes the first rather than starting a
/// new chain.
pub struct EvidenceLocker {
    session_id: SessionId,
    caller: CallerId,
    cipher: Arc<dyn EvidenceCipher>,
    signer: Arc<EvidenceSigner>,
    retention_ms: u64,
    chain: CustodyChain,
    latest: Option<(EvidenceId, ContentHash)>,
    sealed: usize,
}

impl EvidenceLocker {
    pub fn new(
        session_id: SessionId,
        caller: CallerId,
        cipher: Arc<dyn EvidenceCipher>,
        signer: Arc<EvidenceSigner>,
        config: &EvidenceConfig,
    ) -> Self {
        Self {
            session_id,
            caller,
            cipher,
            signer,
            retention_ms: config.retention_ms(),
            chain: CustodyChain::new(session_id),
            latest: None,
            sealed: 0,
        }
    }

    /// Pick the chain back up from the newest stored record of a session.
    pub fn resume(
        latest: &EvidenceRecord,
        cipher: Arc<dyn EvidenceCipher>,
        signer: Arc<EvidenceSigner>,
        config: &EvidenceConfig,
    ) -> Result<Self, EvidenceError> {
        latest.verify()?;
        let chain = CustodyChain::restore(latest.session_id, latest.custody.clone())?;
        debug!(
            session_id = %latest.session_id,
            evidence_id = %latest.id,
            entries = chain.len(),
            "Custody chain resumed"
        );
        Ok(Self {
            session_id: latest.session_id,
            caller: latest.caller.clone(),
            cipher,
            signer,
            retention_ms: config.retention_ms(),
            chain,
            latest: Some((latest.id, latest.content_digest())),
            sealed: 1,
        })
    }

    /// Seal `signals` and pre-trigger `observations` into a new record.
    ///
    /// Raw content is taken out of each signal, hashed, encrypted and then
    /// dropped. Nothing is appended to the custody chain unless every
    /// artifact sealed, so a failure leaves the chain as it was.
    pub fn seal(
        &mut self,
        mode: PrivacyMode,
        signals: Vec<Signal>,
        observations: Vec<DerivedArtifact>,
        now_ms: u64,
    ) -> Result<EvidenceRecord, EvidenceError> {
        if mode != PrivacyMode::EvidenceCollection {
            return Err(EvidenceError::NotInEvidenceMode(mode));
        }

        let mut staged = Vec::with_capacity(observations.len() + signals.len());
        for observation in observations {
            let content_hash = observation.content_hash.unwrap_or_else(|| {
                descriptor_hash(
                    &observation.modality,
                    observation.timestamp_ms,
                    observation.score,
                    &observation.indicators,
                )
            });
            staged.push((
                CustodyAction::PreTriggerObservation,
                EvidenceArtifact {
                    content_hash,
                    modality: observation.modality,
                    timestamp_ms: observation.timestamp_ms,
                    score: observation.score,
                    indicators: observation.indicators,
                    pre_trigger: true,
                    payload: None,
                },
            ));
        }
        for mut signal in signals {
            let (action, content_hash, payload) = match signal.take_content() {
                Some(raw) => {
                    let hash = raw.content_hash();
                    let payload = self.cipher.seal(raw.as_bytes(), hash.as_bytes())?;
                    (CustodyAction::ArtifactCaptured, hash, Some(payload))
                }
                None => (
                    CustodyAction::DescriptorCaptured,
                    descriptor_hash(
                        &signal.modality,
                        signal.timestamp_ms,
                        signal.score,
                        &signal.indicators,
                    ),
                    None,
                ),
            };
            staged.push((
                action,
                EvidenceArtifact {
                    content_hash,
                    modality: signal.modality,
                    timestamp_ms: signal.timestamp_ms,
                    score: signal.score,
                    indicators: signal.indicators,
                    pre_trigger: false,
                    payload,
                },
            ));
        }

        let mut chain = self.chain.clone();
        if let Some((previous, digest)) = self.latest {
            chain.append(LOCKER_ACTOR, CustodyAction::Superseded, now_ms, digest);
            debug!(session_id = %self.session_id, superseded = %previous, "Superseding evidence record");
        }
        let mut artifacts = Vec::with_capacity(staged.len());
        for (action, artifact) in staged {
            chain.append(LOCKER_ACTOR, action, now_ms, artifact.content_hash);
            artifacts.push(artifact);
        }

        let mut record = EvidenceRecord {
            id: EvidenceId::new(),
            session_id: self.session_id,
            caller: self.caller.clone(),
            sealed_at_ms: now_ms,
            sealed_by: LOCKER_ACTOR.to_string(),
            cipher_suite: self.cipher.suite().to_string(),
            artifacts,
            supersedes: self.latest.map(|(id, _)| id),
            retention_expiry_ms: now_ms.saturating_add(self.retention_ms),
            custody: Vec::new(),
            proof: IntegrityProof {
                digest: ContentHash::zero(),
                signature: Vec::new(),
                signer: Vec::new(),
            },
        };
        let digest = record.content_digest();
        let seal_hash = chain
            .append(LOCKER_ACTOR, CustodyAction::Sealed, now_ms, digest)
            .entry_hash;
        record.proof = self
            .signer
            .sign(EvidenceRecord::binding_digest(&digest, &seal_hash));
        record.custody = chain.entries().to_vec();

        self.chain = chain;
        self.latest = Some((record.id, digest));
        self.sealed += 1;
        info!(
            session_id = %self.session_id,
            evidence_id = %record.id,
            artifacts = record.artifacts.len(),
            custody_entries = record.custody.len(),
            supersedes = ?record.supersedes,
            "Evidence sealed"
        );
        Ok(record)
    }

    /// True when `record` is intact and was signed by this locker's key.
    pub fn verify(&self, record: &EvidenceRecord) -> bool {
        if record.proof.signer != self.signer.verifying_key().as_bytes() {
            warn!(evidence_id = %record.id, "Evidence record signed by a foreign key");
            return false;
        }
        match record.verify() {
            Ok(()) => true,
            Err(e) => {
                warn!(evidence_id = %record.id, error = %e, "Evidence record failed verification");
                false
            }
        }
    }

    /// Decrypt one artifact of a verified record for authorised export.
    pub fn open(
        &self,
        record: &EvidenceRecord,
        index: usize,
    ) -> Result<Zeroizing<Vec<u8>>, EvidenceError> {
        if !self.verify(record) {
            return Err(EvidenceError::IntegrityViolation(format!(
                "record {} does not verify",
                record.id
            )));
        }
        let artifact = record.artifacts.get(index);
        let payload = artifact
            .and_then(|a| a.payload.as_ref())
            .ok_or(EvidenceError::NoPayload {
                record: record.id,
                index,
            })?;
        let content_hash = artifact
            .map(|a| a.content_hash)
            .unwrap_or_else(ContentHash::zero);
        let plaintext = self.cipher.open(payload, content_hash.as_bytes())?;
        if ContentHash::tagged(b"vigil-artifact-v1", &plaintext) != content_hash {
            return Err(EvidenceError::IntegrityViolation(
                "decrypted artifact does not match its content hash".into(),
            ));
        }
        Ok(plaintext)
    }

    pub fn chain(&self) -> &CustodyChain {
        &self.chain
    }

    pub fn latest(&self) -> Option<EvidenceId> {
        self.latest.map(|(id, _)| id)
    }

    pub fn sealed_count(&self) -> usize {
        self.sealed
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}
