//! Wire DTOs for the JSON-RPC surface.
//!
//! Binary fields travel as hex (digests, keys, signatures) or base64
//! (quotes, sealed envelopes). Errors carry the closed kind set plus a
//! correlation id in the JSON-RPC error `data` field; the error code is the
//! HTTP status the kind maps to.

use serde::{Deserialize, Serialize};

use aegis_core::attestation::{EncryptedAttestation, Schema};
use aegis_core::device::Device;
use aegis_core::profile::{AccountStats, HumanityRecord, Profile};
use aegis_core::types::Timestamp;
use aegis_scoring::DeviceTrustResult;

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcLoginChallenge {
    pub challenge: String,
    pub nonce: String,
    pub expires_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSession {
    pub ok: bool,
    pub token: String,
    pub expires_at: Timestamp,
}

// ── Schema ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRegisterSchema {
    pub schema_text: String,
    pub resolver: Option<String>,
    pub revocable: bool,
    pub creator: String,
    /// Hex signature over `"register-schema:" || uid`.
    pub signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSchema {
    pub uid: String,
    pub revocable: bool,
    pub schema_text: String,
    pub resolver: Option<String>,
    pub creator: Option<String>,
    pub created_at: Timestamp,
}

impl From<Schema> for RpcSchema {
    fn from(s: Schema) -> Self {
        Self {
            uid: s.uid.to_hex(),
            revocable: s.revocable,
            schema_text: s.schema_text,
            resolver: s.resolver.map(|a| a.to_hex()),
            creator: s.creator.map(|a| a.to_hex()),
            created_at: s.created_at,
        }
    }
}

// ── Attestations ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRecipientPublicKey {
    pub address: String,
    /// Hex SEC1 ECIES public key.
    pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreateAttestation {
    pub schema_uid: String,
    /// Base64 plaintext payload.
    pub plaintext: String,
    pub recipients: Vec<RpcRecipientPublicKey>,
    #[serde(default)]
    pub revocable: bool,
    pub expiration_time: Option<Timestamp>,
    /// Optional hex 32-byte idempotency nonce.
    pub client_nonce: Option<String>,
    pub attester: String,
    pub signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcWrappedRecipient {
    pub address: String,
    /// Hex ECIES-wrapped symmetric key.
    pub wrapped_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSubmitAttestation {
    pub schema_uid: String,
    pub blob_id: String,
    /// Hex SHA-256 of the sealed envelope.
    pub ciphertext_digest: String,
    pub recipients: Vec<RpcWrappedRecipient>,
    #[serde(default)]
    pub revocable: bool,
    pub expiration_time: Option<Timestamp>,
    pub client_nonce: Option<String>,
    pub attester: String,
    pub signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreated {
    pub uid: String,
    pub blob_id: String,
}

/// Anchor metadata. Wrapped keys are deliberately excluded; they are only
/// released through `retrieveAttestation` after the recipient check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcAttestationMeta {
    pub uid: String,
    pub schema_uid: String,
    pub attester: String,
    pub blob_id: String,
    pub ciphertext_digest: String,
    pub recipient_addresses: Vec<String>,
    pub revocable: bool,
    pub revoked: bool,
    pub revocation_time: Option<Timestamp>,
    pub expiration_time: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<EncryptedAttestation> for RpcAttestationMeta {
    fn from(a: EncryptedAttestation) -> Self {
        Self {
            uid: a.uid.to_hex(),
            schema_uid: a.schema_uid.to_hex(),
            attester: a.attester.to_hex(),
            blob_id: a.blob_id.to_hex(),
            ciphertext_digest: hex::encode(a.ciphertext_digest),
            recipient_addresses: a.recipients.iter().map(|r| r.address.to_hex()).collect(),
            revocable: a.revocable,
            revoked: a.revoked,
            revocation_time: a.revocation_time,
            expiration_time: a.expiration_time,
            created_at: a.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRetrieved {
    pub blob_id: String,
    /// Base64 sealed envelope (`iv || ciphertext || tag`).
    pub envelope: String,
    /// Hex wrapped key for the requester; absent when the attester is
    /// fetching without holding a key slot.
    pub wrapped_key: Option<String>,
}

// ── Devices ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcChallenge {
    pub nonce: String,
    pub expires_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRegisterDevice {
    /// Hex SEC1 hardware public key.
    pub public_key: String,
    /// `"TRUSTZONE"` or `"SECURE_ENCLAVE"`.
    pub tee_type: String,
    pub manufacturer: String,
    pub model: Option<String>,
    /// Hex 16-byte challenge nonce.
    pub nonce: String,
    /// Base64 quote bytes.
    pub quote: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcHeartbeatMetrics {
    pub uptime: f64,
    pub data_congruence: f64,
    pub firmware_version: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcHeartbeat {
    pub nonce: String,
    pub quote: String,
    pub metrics: RpcHeartbeatMetrics,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcDevice {
    pub device_id: String,
    pub tee_type: String,
    pub owner: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub trust_score: u32,
    pub uptime: f64,
    pub data_congruence: f64,
    pub firmware_version: u32,
    pub attestation_count: u64,
    pub last_attest_at: Timestamp,
    pub registered_at: Timestamp,
    pub is_active: bool,
    pub is_suspended: bool,
    pub suspension_reason: Option<String>,
}

impl From<Device> for RpcDevice {
    fn from(d: Device) -> Self {
        Self {
            device_id: d.device_id.to_string(),
            tee_type: d.tee_type.to_string(),
            owner: d.owner.to_hex(),
            manufacturer: d.manufacturer,
            model: d.model,
            trust_score: d.trust_score,
            uptime: d.uptime,
            data_congruence: d.data_congruence,
            firmware_version: d.firmware_version,
            attestation_count: d.attestation_count,
            last_attest_at: d.last_attest_at,
            registered_at: d.registered_at,
            is_active: d.is_active,
            is_suspended: d.is_suspended,
            suspension_reason: d.suspension_reason,
        }
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcDeviceScore {
    pub device_id: String,
    pub score: u32,
    pub tee_passed: bool,
    pub uptime_points: u32,
    pub congruence_points: u32,
    pub firmware_points: u32,
    pub flagged_for_audit: bool,
    pub banned: bool,
}

impl RpcDeviceScore {
    pub fn from_result(device_id: String, r: DeviceTrustResult) -> Self {
        Self {
            device_id,
            score: r.score,
            tee_passed: r.tee_passed,
            uptime_points: r.uptime_points,
            congruence_points: r.congruence_points,
            firmware_points: r.firmware_points,
            flagged_for_audit: r.flagged_for_audit,
            banned: r.banned,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcHumanityScore {
    pub address: String,
    pub score: u32,
    pub is_verified_human: bool,
    pub hardware_points: u32,
    pub social_points: u32,
    pub onchain_points: u32,
    pub fee_points: u32,
    pub last_updated: Timestamp,
}

impl From<HumanityRecord> for RpcHumanityScore {
    fn from(r: HumanityRecord) -> Self {
        Self {
            address: r.address.to_hex(),
            score: r.score,
            is_verified_human: r.is_verified_human,
            hardware_points: r.components.hardware_points,
            social_points: r.components.social_points,
            onchain_points: r.components.onchain_points,
            fee_points: r.components.fee_points,
            last_updated: r.last_updated,
        }
    }
}

// ── Profiles & stats ─────────────────────────────────────────────────────────

/// One field of a profile update: `{"Set": "value"}`, `"Clear"`, or `"Keep"`
/// (omitted fields default to keep).
pub type RpcFieldUpdate<T> = aegis_core::profile::FieldUpdate<T>;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RpcProfileUpdate {
    #[serde(default)]
    pub name: RpcFieldUpdate<String>,
    #[serde(default)]
    pub bio: RpcFieldUpdate<String>,
    #[serde(default)]
    pub avatar_url: RpcFieldUpdate<String>,
    #[serde(default)]
    pub social_links: RpcFieldUpdate<Vec<String>>,
    #[serde(default)]
    pub handle: RpcFieldUpdate<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcProfile {
    pub address: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: Vec<String>,
    pub handle: Option<String>,
    pub entity_type: String,
    pub updated_at: Timestamp,
}

impl RpcProfile {
    pub fn from_profile(address: String, p: Profile) -> Self {
        Self {
            address,
            name: p.name,
            bio: p.bio,
            avatar_url: p.avatar_url,
            social_links: p.social_links,
            handle: p.handle,
            entity_type: format!("{:?}", p.entity_type),
            updated_at: p.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRecordActivity {
    pub address: String,
    #[serde(default)]
    pub transactions: u64,
    #[serde(default)]
    pub fees_burned_usd: f64,
    pub verified_social_accounts: Option<u32>,
    /// First-seen timestamp used only when the account was never seen.
    pub first_seen: Option<Timestamp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcAccountStats {
    pub address: String,
    pub verified_social_accounts: u32,
    pub transaction_count: u64,
    pub total_fees_burned_usd: f64,
    pub registered_at: Timestamp,
}

impl RpcAccountStats {
    pub fn from_stats(address: String, s: AccountStats) -> Self {
        Self {
            address,
            verified_social_accounts: s.verified_social_accounts,
            transaction_count: s.transaction_count,
            total_fees_burned_usd: s.total_fees_burned_usd,
            registered_at: s.registered_at,
        }
    }
}

// ── Version ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub api_version: String,
}
