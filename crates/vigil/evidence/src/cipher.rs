//! Payload encryption for evidence artifacts.
//!
//! Each artifact is sealed under a fresh ML-KEM-768 encapsulation. The
//! shared secret is stretched with BLAKE3 `derive_key` into an AES-256-GCM
//! key, and the artifact's content hash is bound in as associated data so a
//! ciphertext cannot be replayed under a different hash.

use std::fmt;
use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::EvidenceError;

const PAYLOAD_KEY_CONTEXT: &str = "vigil evidence payload v1";
const NONCE_LEN: usize = 12;
const KEY_CHECK_CONTEXT: &[u8] = b"vigil key check";

pub const PQ_SUITE: &str = "ml-kem-768+blake3-kdf+aes-256-gcm";

/// An encrypted artifact payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct SealedPayload {
    #[serde(with = "hex::serde")]
    pub kem_ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Feed every byte of the payload into `hasher`, length-prefixed.
    pub fn absorb(&self, hasher: &mut blake3::Hasher) {
        for part in [&self.kem_ciphertext, &self.nonce, &self.ciphertext] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
    }

    pub fn len(&self) -> usize {
        self.kem_ciphertext.len() + self.nonce.len() + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedPayload({} bytes)", self.len())
    }
}

/// Encryption seam for the evidence locker.
pub trait EvidenceCipher: Send + Sync {
    /// Identifier of the cipher suite, recorded in every sealed record.
    fn suite(&self) -> &'static str;

    fn seal(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<SealedPayload, EvidenceError>;

    fn open(
        &self,
        payload: &SealedPayload,
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EvidenceError>;
}

type DecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;
type EncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;

/// ML-KEM-768 / AES-256-GCM cipher holding the locker's KEM key pair.
pub struct PqEvidenceCipher {
    decapsulation_key: DecapsulationKey,
    encapsulation_key: EncapsulationKey,
}

/// On-disk form of a KEM key pair.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyFile {
    suite: String,
    #[serde(with = "hex::serde")]
    decapsulation_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    encapsulation_key: Vec<u8>,
}

impl PqEvidenceCipher {
    pub fn generate() -> Self {
        let (decapsulation_key, encapsulation_key) = MlKem768::generate(&mut OsRng);
        Self {
            decapsulation_key,
            encapsulation_key,
        }
    }

    /// Rebuild a key pair from its encoded halves.
    ///
    /// The halves must belong together; a pair that cannot open its own
    /// ciphertext is refused.
    pub fn from_key_bytes(decapsulation: &[u8], encapsulation: &[u8]) -> Result<Self, EvidenceError> {
        let dk = Encoded::<DecapsulationKey>::try_from(decapsulation).map_err(|_| {
            EvidenceError::KeyFile(format!("malformed decapsulation key ({} bytes)", decapsulation.len()))
        })?;
        let ek = Encoded::<EncapsulationKey>::try_from(encapsulation).map_err(|_| {
            EvidenceError::KeyFile(format!("malformed encapsulation key ({} bytes)", encapsulation.len()))
        })?;
        let cipher = Self {
            decapsulation_key: DecapsulationKey::from_bytes(&dk),
            encapsulation_key: EncapsulationKey::from_bytes(&ek),
        };

        let sealed = cipher.seal(KEY_CHECK_CONTEXT, KEY_CHECK_CONTEXT)?;
        match cipher.open(&sealed, KEY_CHECK_CONTEXT) {
            Ok(opened) if opened.as_slice() == KEY_CHECK_CONTEXT => Ok(cipher),
            _ => Err(EvidenceError::KeyFile("key halves do not form a pair".into())),
        }
    }

    /// Load the key pair written by [`PqEvidenceCipher::save`].
    pub fn load(path: &Path) -> Result<Self, EvidenceError> {
        let json = Zeroizing::new(
            fs::read_to_string(path)
                .map_err(|e| EvidenceError::KeyFile(format!("{}: {e}", path.display())))?,
        );
        let file: KeyFile = serde_json::from_str(&json)
            .map_err(|e| EvidenceError::KeyFile(format!("{}: {e}", path.display())))?;
        if file.suite != PQ_SUITE {
            return Err(EvidenceError::KeyFile(format!(
                "{}: suite {} is not {PQ_SUITE}",
                path.display(),
                file.suite
            )));
        }
        Self::from_key_bytes(&file.decapsulation_key, &file.encapsulation_key)
    }

    /// Write the key pair to `path`. Anyone holding the file can open
    /// every payload sealed under it.
    pub fn save(&self, path: &Path) -> Result<(), EvidenceError> {
        let file = KeyFile {
            suite: PQ_SUITE.to_string(),
            decapsulation_key: self.decapsulation_key.as_bytes().to_vec(),
            encapsulation_key: self.encapsulation_key.as_bytes().to_vec(),
        };
        let json = Zeroizing::new(
            serde_json::to_string_pretty(&file)
                .map_err(|e| EvidenceError::KeyFile(e.to_string()))?,
        );
        fs::write(path, json.as_bytes())
            .map_err(|e| EvidenceError::KeyFile(format!("{}: {e}", path.display())))
    }

    /// Load the key pair at `path`, creating it on first use.
    pub fn load_or_generate(path: &Path) -> Result<Self, EvidenceError> {
        if path.exists() {
            let cipher = Self::load(path)?;
            info!(path = %path.display(), "Evidence key loaded");
            return Ok(cipher);
        }
        let cipher = Self::generate();
        cipher.save(path)?;
        info!(path = %path.display(), "Evidence key generated");
        Ok(cipher)
    }

    fn payload_key(shared: &[u8]) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(blake3::derive_key(PAYLOAD_KEY_CONTEXT, shared))
    }
}

impl EvidenceCipher for PqEvidenceCipher {
    fn suite(&self) -> &'static str {
        PQ_SUITE
    }

    fn seal(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<SealedPayload, EvidenceError> {
        let (kem_ciphertext, shared) = self
            .encapsulation_key
            .encapsulate(&mut OsRng)
            .map_err(|_| EvidenceError::KeyEncapsulation("encapsulation rejected".into()))?;
        let key = Self::payload_key(shared.as_slice());

        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| EvidenceError::Encryption(e.to_string()))?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| EvidenceError::Encryption("aead seal failed".into()))?;

        Ok(SealedPayload {
            kem_ciphertext: kem_ciphertext.as_slice().to_vec(),
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    fn open(
        &self,
        payload: &SealedPayload,
        associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EvidenceError> {
        if payload.nonce.len() != NONCE_LEN {
            return Err(EvidenceError::Decryption(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                payload.nonce.len()
            )));
        }
        let kem_ciphertext = Ciphertext::<MlKem768>::try_from(payload.kem_ciphertext.as_slice())
            .map_err(|_| EvidenceError::Decryption("malformed kem ciphertext".into()))?;
        let shared = self
            .decapsulation_key
            .decapsulate(&kem_ciphertext)
            .map_err(|_| EvidenceError::KeyEncapsulation("decapsulation rejected".into()))?;
        let key = Self::payload_key(shared.as_slice());

        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| EvidenceError::Decryption(e.to_string()))?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&payload.nonce),
                Payload {
                    msg: &payload.ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| EvidenceError::Decryption("authentication failed".into()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

/// Cipher that refuses every operation. Drives the evidence-failure path.
#[derive(Debug, Default)]
pub struct FailingCipher;

impl EvidenceCipher for FailingCipher {
    fn suite(&self) -> &'static str {
        "failing"
    }

    fn seal(&self, _plaintext: &[u8], _associated_data: &[u8]) -> Result<SealedPayload, EvidenceError> {
        Err(EvidenceError::KeyEncapsulation("kem unavailable".into()))
    }

    fn open(
        &self,
        _payload: &SealedPayload,
        _associated_data: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EvidenceError> {
        Err(EvidenceError::Decryption("kem unavailable".into()))
    }
}
