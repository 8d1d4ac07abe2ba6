//! AES-256-GCM sealing of attestation payloads.
//!
//! The sealed wire form is `iv(12) || ciphertext || tag(16)`; that exact byte
//! string is what the blob store persists and what the ciphertext digest
//! commits to.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use aegis_core::constants::{GCM_IV_LEN, GCM_TAG_LEN, SYMMETRIC_KEY_LEN};
use aegis_core::error::AegisError;

/// A sealed payload, split into its wire components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub iv: [u8; GCM_IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; GCM_TAG_LEN],
}

impl SealedEnvelope {
    /// Serialize to the canonical wire form `iv || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(GCM_IV_LEN + self.ciphertext.len() + GCM_TAG_LEN);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Parse the canonical wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AegisError> {
        if bytes.len() < GCM_IV_LEN + GCM_TAG_LEN {
            return Err(AegisError::BadRequest(format!(
                "sealed envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let mut iv = [0u8; GCM_IV_LEN];
        iv.copy_from_slice(&bytes[..GCM_IV_LEN]);
        let mut tag = [0u8; GCM_TAG_LEN];
        tag.copy_from_slice(&bytes[bytes.len() - GCM_TAG_LEN..]);
        Ok(Self {
            iv,
            ciphertext: bytes[GCM_IV_LEN..bytes.len() - GCM_TAG_LEN].to_vec(),
            tag,
        })
    }
}

/// Generate a fresh uniformly-random AES-256 key. Zeroized on drop.
pub fn generate_symmetric_key() -> Zeroizing<[u8; SYMMETRIC_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    key
}

/// Seal `plaintext` under `key` with a fresh random IV.
pub fn seal(plaintext: &[u8], key: &[u8; SYMMETRIC_KEY_LEN]) -> Result<SealedEnvelope, AegisError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AegisError::DecryptError)?;

    let mut iv = [0u8; GCM_IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    // aes-gcm appends the 16-byte tag to the ciphertext.
    let mut combined = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| AegisError::DecryptError)?;

    let tag_start = combined.len() - GCM_TAG_LEN;
    let mut tag = [0u8; GCM_TAG_LEN];
    tag.copy_from_slice(&combined[tag_start..]);
    combined.truncate(tag_start);

    Ok(SealedEnvelope { iv, ciphertext: combined, tag })
}

/// Open a sealed envelope. Fails with `DecryptError` on tag mismatch.
pub fn open(envelope: &SealedEnvelope, key: &[u8; SYMMETRIC_KEY_LEN]) -> Result<Vec<u8>, AegisError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| AegisError::DecryptError)?;

    let mut combined = Vec::with_capacity(envelope.ciphertext.len() + GCM_TAG_LEN);
    combined.extend_from_slice(&envelope.ciphertext);
    combined.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(Nonce::from_slice(&envelope.iv), combined.as_slice())
        .map_err(|_| AegisError::DecryptError)
}
