//! ─── Aegis Protocol Constants ───────────────────────────────────────────────
//!
//! Fixed limits of the trust-and-attestation engine. Operator-tunable knobs
//! live in [`crate::config::Config`]; the values here are protocol shape, not
//! deployment policy.

// ── Attestations ─────────────────────────────────────────────────────────────

/// Maximum recipients per encrypted attestation.
pub const MAX_RECIPIENTS: usize = 50;

/// AES-256-GCM initialization vector length in bytes.
pub const GCM_IV_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const GCM_TAG_LEN: usize = 16;

/// Symmetric key length (AES-256) in bytes.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// SEC1 compressed secp256k1 public key length in bytes.
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Wire length of an ECIES-wrapped symmetric key:
/// `ephemeral_pubkey(33) || iv(12) || ciphertext(32) || tag(16)`.
pub const WRAPPED_KEY_LEN: usize = COMPRESSED_PUBKEY_LEN + GCM_IV_LEN + SYMMETRIC_KEY_LEN + GCM_TAG_LEN;

/// Domain prefix of the attestation-create signing message.
pub const CREATE_ATTESTATION_DOMAIN: &[u8] = b"create-attestation:";

/// Domain prefix of the attestation-retrieve signing message.
pub const RETRIEVE_ATTESTATION_DOMAIN: &[u8] = b"retrieve-attestation:";

/// Domain prefix of the attestation-revoke signing message.
pub const REVOKE_ATTESTATION_DOMAIN: &[u8] = b"revoke-attestation:";

// ── Challenges & sessions ────────────────────────────────────────────────────

/// Challenge nonce length in bytes.
pub const CHALLENGE_NONCE_LEN: usize = 16;

/// Wallet signature length: `r(32) || s(32) || v(1)`.
pub const WALLET_SIGNATURE_LEN: usize = 65;

/// Clock-skew tolerance applied to quote freshness checks (seconds).
pub const QUOTE_SKEW_TOLERANCE_SECS: i64 = 60;

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Device trust points granted for a passing TEE verification.
pub const TRUST_TEE_POINTS: u32 = 40;

/// Maximum device trust points from uptime.
pub const TRUST_UPTIME_POINTS: u32 = 25;

/// Maximum device trust points from data congruence.
pub const TRUST_CONGRUENCE_POINTS: u32 = 20;

/// Maximum device trust points from firmware currency.
pub const TRUST_FIRMWARE_POINTS: u32 = 15;

/// Penalty per firmware version behind latest.
pub const TRUST_FIRMWARE_PENALTY_PER_VERSION: u32 = 5;

/// Minimum linked-device trust score that activates the hardware anchor.
pub const HUMANITY_DEVICE_THRESHOLD: u32 = 80;

/// Maximum humanity points from the hardware anchor.
pub const HUMANITY_HARDWARE_POINTS: u32 = 40;

/// Humanity points per verified social account (capped at three accounts).
pub const HUMANITY_SOCIAL_POINTS_EACH: u32 = 10;

/// Maximum counted verified social accounts.
pub const HUMANITY_SOCIAL_ACCOUNTS_MAX: u32 = 3;

/// Account age (months) required for the on-chain age component.
pub const HUMANITY_AGE_MONTHS_MIN: u32 = 6;

/// Transaction count required for the on-chain activity component.
pub const HUMANITY_TX_COUNT_MIN: u64 = 5;

/// Fees burned (USD) at which the fee component saturates.
pub const HUMANITY_FEES_SATURATION_USD: f64 = 10.0;

/// Humanity score at or above which an address counts as a verified human.
pub const HUMANITY_VERIFIED_THRESHOLD: u32 = 60;
