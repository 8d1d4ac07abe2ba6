use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AegisError;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

// ── Address ──────────────────────────────────────────────────────────────────

/// 20-byte account address: the low 20 bytes of Keccak-256 over the
/// uncompressed secp256k1 public key, as recovered from wallet signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex representation.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without a `0x` prefix, any letter case.
    pub fn from_hex(s: &str) -> Result<Self, AegisError> {
        let stripped = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| AegisError::BadRequest(format!("invalid address hex: {e}")))?;
        if bytes.len() != 20 {
            return Err(AegisError::BadRequest(format!(
                "invalid address length: expected 20 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &self.to_hex()[..10])
    }
}

// ── Uid ──────────────────────────────────────────────────────────────────────

/// 32-byte attestation identifier: SHA-256 over
/// `schema_uid || attester || now_ns || ciphertext_digest`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub [u8; 32]);

impl Uid {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, AegisError> {
        parse_digest32(s).map(Self)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({}…)", &self.to_hex()[..16])
    }
}

// ── SchemaUid ────────────────────────────────────────────────────────────────

/// 32-byte schema identifier: SHA-256 over `schema_text || resolver || revocable`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaUid(pub [u8; 32]);

impl SchemaUid {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, AegisError> {
        parse_digest32(s).map(Self)
    }
}

impl fmt::Display for SchemaUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SchemaUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaUid({}…)", &self.to_hex()[..16])
    }
}

// ── BlobId ───────────────────────────────────────────────────────────────────

/// Content address of a stored blob: SHA-256 of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub [u8; 32]);

impl BlobId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, AegisError> {
        parse_digest32(s).map(Self)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({}…)", &self.to_hex()[..16])
    }
}

// ── DeviceId ─────────────────────────────────────────────────────────────────

/// Stable device identifier: `"dev_" || hex(SHA-256(public_key || tee_type))[0..16]`.
///
/// Always exactly 20 ASCII bytes, which keeps composite sled keys fixed-width.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct DeviceId(String);

impl DeviceId {
    pub const LEN: usize = 20;

    /// Wrap a derived id. Callers derive via `aegis_crypto::hash::device_id_digest`.
    pub fn from_digest_prefix(hex_prefix: &str) -> Self {
        Self(format!("dev_{hex_prefix}"))
    }

    pub fn parse(s: &str) -> Result<Self, AegisError> {
        let valid = s.len() == Self::LEN
            && s.starts_with("dev_")
            && s[4..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(AegisError::BadRequest(format!("invalid device id: {s}")));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── TeeType ──────────────────────────────────────────────────────────────────

/// Supported Trusted-Execution-Environment families.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum TeeType {
    TrustZone,
    SecureEnclave,
}

impl TeeType {
    /// Canonical tag mixed into the device-id derivation.
    pub fn tag(&self) -> &'static [u8] {
        match self {
            TeeType::TrustZone => b"TRUSTZONE",
            TeeType::SecureEnclave => b"SECURE_ENCLAVE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AegisError> {
        match s {
            "TRUSTZONE" => Ok(TeeType::TrustZone),
            "SECURE_ENCLAVE" => Ok(TeeType::SecureEnclave),
            other => Err(AegisError::UnsupportedTee(other.to_string())),
        }
    }
}

impl fmt::Display for TeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display form matches the wire tag.
        match self {
            TeeType::TrustZone => write!(f, "TRUSTZONE"),
            TeeType::SecureEnclave => write!(f, "SECURE_ENCLAVE"),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_digest32(s: &str) -> Result<[u8; 32], AegisError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| AegisError::BadRequest(format!("invalid digest hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(AegisError::BadRequest(format!(
            "invalid digest length: expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
