//! ECIES-style key wrapping over secp256k1.
//!
//! `wrap_key` runs on the engine side and needs only the recipient's public
//! key. `unwrap_key` is the client-side counterpart, present for wallets and
//! tests — recipient private keys never enter the engine.
//!
//! Wire form: `ephemeral_pubkey(33, SEC1 compressed) || iv(12) || ciphertext(32) || tag(16)`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use k256::ecdh::EphemeralSecret;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use aegis_core::constants::{
    COMPRESSED_PUBKEY_LEN, GCM_IV_LEN, GCM_TAG_LEN, SYMMETRIC_KEY_LEN, WRAPPED_KEY_LEN,
};
use aegis_core::error::AegisError;

const KEK_INFO: &[u8] = b"aegis-ecies-kek-v1";

/// Derive the 32-byte key-encryption key from an ECDH shared secret.
fn derive_kek(shared_secret: &[u8]) -> Zeroizing<[u8; SYMMETRIC_KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut kek = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    hk.expand(KEK_INFO, kek.as_mut())
        .expect("32-byte HKDF output length is always valid");
    kek
}

/// Wrap a symmetric key for a recipient public key (SEC1 bytes, compressed
/// or uncompressed).
pub fn wrap_key(
    symmetric_key: &[u8; SYMMETRIC_KEY_LEN],
    recipient_public_key: &[u8],
) -> Result<Vec<u8>, AegisError> {
    let recipient = PublicKey::from_sec1_bytes(recipient_public_key).map_err(|e| {
        AegisError::BadRequest(format!("invalid recipient public key: {e}"))
    })?;

    let ephemeral = EphemeralSecret::random(&mut rand::rngs::OsRng);
    let ephemeral_pub = ephemeral.public_key();
    let shared = ephemeral.diffie_hellman(&recipient);
    let kek = derive_kek(shared.raw_secret_bytes().as_slice());

    let cipher = Aes256Gcm::new_from_slice(kek.as_ref()).map_err(|_| AegisError::DecryptError)?;
    let mut iv = [0u8; GCM_IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), symmetric_key.as_slice())
        .map_err(|_| AegisError::DecryptError)?;

    let mut out = Vec::with_capacity(WRAPPED_KEY_LEN);
    out.extend_from_slice(ephemeral_pub.to_sec1_bytes().as_ref());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&sealed);
    debug_assert_eq!(out.len(), WRAPPED_KEY_LEN);
    Ok(out)
}

/// Unwrap a wrapped symmetric key with the recipient's private key.
/// Fails with `DecryptError` on tag mismatch.
pub fn unwrap_key(
    wrapped: &[u8],
    recipient_secret: &SecretKey,
) -> Result<Zeroizing<[u8; SYMMETRIC_KEY_LEN]>, AegisError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(AegisError::BadRequest(format!(
            "invalid wrapped key length: expected {WRAPPED_KEY_LEN}, got {}",
            wrapped.len()
        )));
    }

    let ephemeral_pub = PublicKey::from_sec1_bytes(&wrapped[..COMPRESSED_PUBKEY_LEN])
        .map_err(|_| AegisError::DecryptError)?;
    let iv = &wrapped[COMPRESSED_PUBKEY_LEN..COMPRESSED_PUBKEY_LEN + GCM_IV_LEN];
    let sealed = &wrapped[COMPRESSED_PUBKEY_LEN + GCM_IV_LEN..];

    let shared = k256::ecdh::diffie_hellman(
        recipient_secret.to_nonzero_scalar(),
        ephemeral_pub.as_affine(),
    );
    let kek = derive_kek(shared.raw_secret_bytes().as_slice());

    let cipher = Aes256Gcm::new_from_slice(kek.as_ref()).map_err(|_| AegisError::DecryptError)?;
    let plain = cipher
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| AegisError::DecryptError)?;

    if plain.len() != SYMMETRIC_KEY_LEN {
        return Err(AegisError::DecryptError);
    }
    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    key.copy_from_slice(&plain);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::generate_symmetric_key;

    fn recipient_keypair() -> (SecretKey, Vec<u8>) {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key().to_sec1_bytes().to_vec();
        (secret, public)
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let (secret, public) = recipient_keypair();
        let k = generate_symmetric_key();
        let wrapped = wrap_key(&k, &public).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);
        let recovered = unwrap_key(&wrapped, &secret).unwrap();
        assert_eq!(*recovered, *k);
    }

    #[test]
    fn wrap_is_randomized() {
        let (_, public) = recipient_keypair();
        let k = generate_symmetric_key();
        let a = wrap_key(&k, &public).unwrap();
        let b = wrap_key(&k, &public).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_recipient_cannot_unwrap() {
        let (_, public) = recipient_keypair();
        let (other_secret, _) = recipient_keypair();
        let k = generate_symmetric_key();
        let wrapped = wrap_key(&k, &public).unwrap();
        assert!(matches!(unwrap_key(&wrapped, &other_secret), Err(AegisError::DecryptError)));
    }

    #[test]
    fn tampered_wrapped_key_fails_closed() {
        let (secret, public) = recipient_keypair();
        let k = generate_symmetric_key();
        let mut wrapped = wrap_key(&k, &public).unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0x01;
        assert!(matches!(unwrap_key(&wrapped, &secret), Err(AegisError::DecryptError)));
    }

    #[test]
    fn invalid_recipient_key_is_a_bad_request() {
        let k = generate_symmetric_key();
        assert!(matches!(wrap_key(&k, &[0u8; 33]), Err(AegisError::BadRequest(_))));
    }
}
