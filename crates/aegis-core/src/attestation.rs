//! Schema and encrypted-attestation records.
//!
//! An [`EncryptedAttestation`] is the anchor-side view of a claim: the
//! ciphertext itself lives in the blob store, the anchor carries the blob
//! address, the ciphertext digest, and one wrapped key per recipient. The
//! plaintext and every private key stay outside the engine.

use serde::{Deserialize, Serialize};

use crate::error::AegisError;
use crate::types::{Address, BlobId, SchemaUid, Timestamp, Uid};

// ── Schema ───────────────────────────────────────────────────────────────────

/// A reusable attestation template. Immutable once registered; the UID is
/// content-derived, so re-registering identical content collides by design.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub uid: SchemaUid,
    pub revocable: bool,
    pub schema_text: String,
    pub resolver: Option<Address>,
    pub creator: Option<Address>,
    pub created_at: Timestamp,
}

// ── EncryptedAttestation ─────────────────────────────────────────────────────

/// One recipient's entry in an attestation: the address plus the symmetric
/// key ECIES-wrapped under that recipient's public key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecipientKey {
    pub address: Address,
    pub wrapped_key: Vec<u8>,
}

/// The anchored record of an encrypted attestation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EncryptedAttestation {
    pub uid: Uid,
    pub schema_uid: SchemaUid,
    pub attester: Address,
    pub blob_id: BlobId,
    /// SHA-256 of the sealed envelope bytes stored in the blob store.
    pub ciphertext_digest: [u8; 32],
    /// Ordered recipient set; order is the caller's input order.
    pub recipients: Vec<RecipientKey>,
    pub revocable: bool,
    pub revoked: bool,
    pub revocation_time: Option<Timestamp>,
    pub expiration_time: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl EncryptedAttestation {
    /// Validate the structural invariants that must hold for every persisted
    /// record: a non-empty, bounded, duplicate-free recipient set with
    /// uniform wrapped-key lengths.
    pub fn validate_recipients(recipients: &[RecipientKey], max: usize) -> Result<(), AegisError> {
        if recipients.is_empty() {
            return Err(AegisError::NoRecipients);
        }
        if recipients.len() > max {
            return Err(AegisError::TooManyRecipients { max, got: recipients.len() });
        }
        let mut seen = std::collections::HashSet::with_capacity(recipients.len());
        for r in recipients {
            if !seen.insert(r.address) {
                return Err(AegisError::DuplicateRecipient);
            }
        }
        let first_len = recipients[0].wrapped_key.len();
        if recipients.iter().any(|r| r.wrapped_key.len() != first_len) {
            return Err(AegisError::BadRequest(
                "wrapped-key lengths differ across recipients".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up the wrapped key for `address`, if present.
    pub fn wrapped_key_for(&self, address: &Address) -> Option<&RecipientKey> {
        self.recipients.iter().find(|r| r.address == *address)
    }

    /// Whether the attestation is expired at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expiration_time, Some(exp) if now > exp)
    }
}
