//! Wallet-signature verification: EIP-191 personal-message hashing and
//! secp256k1 public-key recovery.
//!
//! The engine only ever verifies. [`WalletSigner`] is the client-side
//! counterpart used by tests and tooling.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use aegis_core::constants::{
    CREATE_ATTESTATION_DOMAIN, RETRIEVE_ATTESTATION_DOMAIN, REVOKE_ATTESTATION_DOMAIN,
    WALLET_SIGNATURE_LEN,
};
use aegis_core::error::AegisError;
use aegis_core::types::{Address, SchemaUid, Uid};

/// Keccak-256 of arbitrary bytes.
fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// EIP-191 personal-message hash: `keccak256("\x19Ethereum Signed Message:\n" || len || message)`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Derive the 20-byte address of a verifying key: the low 20 bytes of
/// Keccak-256 over the uncompressed public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let digest = keccak256(&encoded.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Address::from_bytes(addr)
}

/// Recover the signer address of an EIP-191 personal-message signature.
///
/// `signature` is the 65-byte wire form `r(32) || s(32) || v(1)` with
/// `v ∈ {0, 1, 27, 28}`. Non-canonical high-`s` signatures are rejected.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Result<Address, AegisError> {
    if signature.len() != WALLET_SIGNATURE_LEN {
        return Err(AegisError::BadSignature);
    }

    let sig = Signature::from_slice(&signature[..64]).map_err(|_| AegisError::BadSignature)?;
    if sig.normalize_s().is_some() {
        // High-s: a distinct signature over the same message would also
        // verify, so only the low-s form is accepted.
        return Err(AegisError::BadSignature);
    }

    let v = signature[64];
    let v = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(v).ok_or(AegisError::BadSignature)?;

    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| AegisError::BadSignature)?;

    Ok(address_of(&key))
}

/// Verify that `signature` over `message` recovers to `expected`.
pub fn verify_signer(message: &[u8], signature: &[u8], expected: &Address) -> Result<(), AegisError> {
    let recovered = recover_address(message, signature)?;
    if recovered != *expected {
        return Err(AegisError::BadSignature);
    }
    Ok(())
}

// ── Canonical attestation messages ───────────────────────────────────────────

/// `"create-attestation:" || schema_uid || sha256(plaintext) || sorted(addresses)`.
pub fn create_attestation_message(
    schema_uid: &SchemaUid,
    plaintext_digest: &[u8; 32],
    recipient_addresses: &[Address],
) -> Vec<u8> {
    let mut sorted: Vec<&Address> = recipient_addresses.iter().collect();
    sorted.sort();

    let mut msg = Vec::with_capacity(
        CREATE_ATTESTATION_DOMAIN.len() + 32 + 32 + sorted.len() * 20,
    );
    msg.extend_from_slice(CREATE_ATTESTATION_DOMAIN);
    msg.extend_from_slice(schema_uid.as_bytes());
    msg.extend_from_slice(plaintext_digest);
    for addr in sorted {
        msg.extend_from_slice(addr.as_bytes());
    }
    msg
}

/// `"retrieve-attestation:" || uid`.
pub fn retrieve_attestation_message(uid: &Uid) -> Vec<u8> {
    let mut msg = Vec::with_capacity(RETRIEVE_ATTESTATION_DOMAIN.len() + 32);
    msg.extend_from_slice(RETRIEVE_ATTESTATION_DOMAIN);
    msg.extend_from_slice(uid.as_bytes());
    msg
}

/// `"revoke-attestation:" || uid`.
pub fn revoke_attestation_message(uid: &Uid) -> Vec<u8> {
    let mut msg = Vec::with_capacity(REVOKE_ATTESTATION_DOMAIN.len() + 32);
    msg.extend_from_slice(REVOKE_ATTESTATION_DOMAIN);
    msg.extend_from_slice(uid.as_bytes());
    msg
}

// ── WalletSigner ─────────────────────────────────────────────────────────────

/// A secp256k1 wallet signer producing EIP-191 personal-message signatures.
/// Client-side only; the engine never holds one.
pub struct WalletSigner {
    signing_key: SigningKey,
    address: Address,
}

impl WalletSigner {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self { signing_key, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `message` in the 65-byte `r || s || v` wire form (low-s).
    pub fn sign_message(&self, message: &[u8]) -> Vec<u8> {
        let prehash = personal_message_hash(message);
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .expect("signing with a valid key is infallible");

        let mut out = sig.to_vec();
        out.push(recovery_id.to_byte() + 27);
        out
    }
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletSigner {{ address: {:?} }}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_recover_round_trip() {
        let signer = WalletSigner::generate();
        let message = b"an attestation of personhood";
        let sig = signer.sign_message(message);
        assert_eq!(sig.len(), WALLET_SIGNATURE_LEN);
        assert_eq!(recover_address(message, &sig).unwrap(), signer.address());
    }

    #[test]
    fn tampered_message_recovers_other_address() {
        let signer = WalletSigner::generate();
        let sig = signer.sign_message(b"original");
        match recover_address(b"tampered", &sig) {
            Ok(addr) => assert_ne!(addr, signer.address()),
            Err(AegisError::BadSignature) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(verify_signer(b"tampered", &sig, &signer.address()).is_err());
    }

    #[test]
    fn truncated_signature_rejected() {
        let signer = WalletSigner::generate();
        let sig = signer.sign_message(b"msg");
        assert!(matches!(recover_address(b"msg", &sig[..64]), Err(AegisError::BadSignature)));
    }

    #[test]
    fn v_offset_forms_both_accepted() {
        let signer = WalletSigner::generate();
        let mut sig = signer.sign_message(b"msg");
        assert!(sig[64] == 27 || sig[64] == 28);
        // The raw 0/1 recovery byte is accepted too.
        sig[64] -= 27;
        assert_eq!(recover_address(b"msg", &sig).unwrap(), signer.address());
    }

    #[test]
    fn create_message_sorts_recipients() {
        let schema = SchemaUid::from_bytes([1; 32]);
        let digest = [2u8; 32];
        let a = Address::from_bytes([1; 20]);
        let b = Address::from_bytes([2; 20]);
        assert_eq!(
            create_attestation_message(&schema, &digest, &[a, b]),
            create_attestation_message(&schema, &digest, &[b, a]),
        );
    }
}
