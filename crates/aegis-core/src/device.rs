//! Device records owned by the registry.

use serde::{Deserialize, Serialize};

use crate::types::{Address, DeviceId, TeeType, Timestamp};

// ── Serde default helpers ─────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

// ── Device ───────────────────────────────────────────────────────────────────

/// A registered hardware device with TEE-anchored identity.
///
/// `device_id` is stable for the lifetime of the `(public_key, tee_type)`
/// pair; re-registration attempts are rejected rather than overwritten.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub device_id: DeviceId,
    pub tee_type: TeeType,
    /// SEC1-encoded hardware public key attested by the TEE quote.
    pub hardware_public_key: Vec<u8>,
    pub owner: Address,
    pub manufacturer: String,
    pub model: Option<String>,
    /// Current Device Trust Score in [0, 100].
    pub trust_score: u32,
    /// Observed uptime fraction in [0, 1].
    pub uptime: f64,
    /// Observed data-congruence fraction in [0, 1].
    pub data_congruence: f64,
    pub firmware_version: u32,
    /// Consecutive daily heartbeats reporting congruence below 0.5.
    #[serde(default)]
    pub consecutive_low_congruence_days: u32,
    pub attestation_count: u64,
    pub last_attest_at: Timestamp,
    pub registered_at: Timestamp,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub suspension_reason: Option<String>,
    /// Append-only suspension audit trail; entries are never removed.
    #[serde(default)]
    pub suspension_history: Vec<SuspensionEvent>,
}

/// One entry in a device's suspension audit trail.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SuspensionEvent {
    pub suspended: bool,
    pub actor: Address,
    pub reason: Option<String>,
    pub at: Timestamp,
}

// ── Quote records ────────────────────────────────────────────────────────────

/// Why a quote was submitted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuoteKind {
    Initial,
    Periodic,
    Challenge,
    Boot,
}

/// The stored record of a TEE quote submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TeeAttestationRecord {
    pub device_id: DeviceId,
    pub quote_digest: [u8; 32],
    pub nonce: [u8; 16],
    pub timestamp: Timestamp,
    pub kind: QuoteKind,
    pub verified: bool,
    pub verified_at: Option<Timestamp>,
}

/// Metrics reported alongside a periodic heartbeat quote.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatMetrics {
    pub uptime: f64,
    pub data_congruence: f64,
    pub firmware_version: u32,
}
