//! Deployment configuration, populated from the environment.
//!
//! Every knob has the documented default; a fresh deployment runs with no
//! environment set. Values are read once at startup and passed down
//! explicitly — engines never consult the environment themselves.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for an Aegis deployment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Lifetime of a session bearer token. `SESSION_TTL` (seconds), default 12 h.
    pub session_ttl: Duration,

    /// Lifetime of login and TEE challenges. `CHALLENGE_TTL` (seconds), default 5 min.
    pub challenge_ttl: Duration,

    /// Maximum age of a TEE quote at verification time. `QUOTE_MAX_AGE` (seconds), default 10 min.
    pub quote_max_age: Duration,

    /// Window during which a verified `(device, nonce)` pair is rejected on
    /// replay. `REPLAY_WINDOW` (seconds), default 24 h.
    pub replay_window: Duration,

    /// Maximum recipients per encrypted attestation. `MAX_RECIPIENTS`, default 50.
    pub max_recipients: usize,

    /// Maximum blob size accepted by the store. `MAX_BLOB_SIZE`, default 100 MiB.
    pub max_blob_size: usize,

    /// Per-address request budget per minute. `RATE_LIMIT_PER_MINUTE`, default 100.
    pub rate_limit_per_minute: u32,

    /// Deadline for blob store operations. `BLOB_OP_TIMEOUT` (seconds), default 30 s.
    pub blob_op_timeout: Duration,

    /// Deadline for anchor log operations. `ANCHOR_OP_TIMEOUT` (seconds), default 10 s.
    pub anchor_op_timeout: Duration,

    /// Testnet-only quote bypass. `TEE_DEMO_MODE`, default off.
    pub tee_demo_mode: bool,

    /// Latest known firmware version, governed externally. `LATEST_FIRMWARE_VERSION`.
    pub latest_firmware_version: u32,

    /// Path to the trusted TEE root bundle (JSON). `TRUSTED_TEE_ROOTS`.
    pub trusted_tee_roots: Option<PathBuf>,

    /// Humanity score cache TTL. `SCORE_CACHE_TTL` (seconds), default 10 min.
    pub score_cache_ttl: Duration,

    /// Addresses allowed to suspend devices and ingest account stats,
    /// in addition to owners. `AUTHORITY_ADDRESSES`, comma-separated hex.
    pub authority_addresses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(12 * 60 * 60),
            challenge_ttl: Duration::from_secs(5 * 60),
            quote_max_age: Duration::from_secs(10 * 60),
            replay_window: Duration::from_secs(24 * 60 * 60),
            max_recipients: crate::constants::MAX_RECIPIENTS,
            max_blob_size: 100 * 1024 * 1024,
            rate_limit_per_minute: 100,
            blob_op_timeout: Duration::from_secs(30),
            anchor_op_timeout: Duration::from_secs(10),
            tee_demo_mode: false,
            latest_firmware_version: 1,
            trusted_tee_roots: None,
            score_cache_ttl: Duration::from_secs(10 * 60),
            authority_addresses: Vec::new(),
        }
    }
}

impl Config {
    /// Build a config from the process environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            session_ttl: env_secs("SESSION_TTL", d.session_ttl),
            challenge_ttl: env_secs("CHALLENGE_TTL", d.challenge_ttl),
            quote_max_age: env_secs("QUOTE_MAX_AGE", d.quote_max_age),
            replay_window: env_secs("REPLAY_WINDOW", d.replay_window),
            max_recipients: env_parse("MAX_RECIPIENTS", d.max_recipients),
            max_blob_size: env_parse("MAX_BLOB_SIZE", d.max_blob_size),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", d.rate_limit_per_minute),
            blob_op_timeout: env_secs("BLOB_OP_TIMEOUT", d.blob_op_timeout),
            anchor_op_timeout: env_secs("ANCHOR_OP_TIMEOUT", d.anchor_op_timeout),
            tee_demo_mode: std::env::var("TEE_DEMO_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.tee_demo_mode),
            latest_firmware_version: env_parse("LATEST_FIRMWARE_VERSION", d.latest_firmware_version),
            trusted_tee_roots: std::env::var("TRUSTED_TEE_ROOTS").ok().map(PathBuf::from),
            score_cache_ttl: env_secs("SCORE_CACHE_TTL", d.score_cache_ttl),
            authority_addresses: std::env::var("AUTHORITY_ADDRESSES")
                .map(|v| v.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        }
    }

    /// Maximum plaintext accepted by attestation create: the blob cap minus
    /// the GCM envelope overhead (iv + tag).
    pub fn max_plaintext_size(&self) -> usize {
        self.max_blob_size
            .saturating_sub(crate::constants::GCM_IV_LEN + crate::constants::GCM_TAG_LEN)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
