use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use aegis_core::types::{DeviceId, TeeType};

/// Compute SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// SHA-256 over a sequence of byte slices, avoiding an intermediate concat.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Derive the stable device identifier from a hardware public key and TEE
/// family: `"dev_" || hex(SHA-256(public_key || tee_type))[0..16]`.
pub fn device_id_from_pubkey(public_key: &[u8], tee_type: TeeType) -> DeviceId {
    let digest = sha256_parts(&[public_key, tee_type.tag()]);
    DeviceId::from_digest_prefix(&hex::encode(digest)[..16])
}

/// Constant-time equality over digest or MAC material.
pub fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
