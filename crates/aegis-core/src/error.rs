use thiserror::Error;

use crate::types::{DeviceId, SchemaUid, Uid};

/// Sub-reason attached to a failed TEE quote verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteFailure {
    BadChain,
    BadNonce,
    BadFormat,
    ExpiredQuote,
    Replayed,
}

impl QuoteFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteFailure::BadChain => "bad_chain",
            QuoteFailure::BadNonce => "bad_nonce",
            QuoteFailure::BadFormat => "bad_format",
            QuoteFailure::ExpiredQuote => "expired_quote",
            QuoteFailure::Replayed => "replayed",
        }
    }
}

/// The closed error kind set surfaced to callers. Every `AegisError` variant
/// projects onto exactly one kind; the RPC layer maps kinds to HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthenticated,
    BadSignature,
    NotAuthorized,
    NotFound,
    AlreadyExists,
    Unavailable,
    PayloadTooLarge,
    SchemaForbidsRevocable,
    ChallengeMismatch,
    ChallengeExpired,
    AttestationFailed,
    IntegrityViolation,
    WrapFailed,
    DecryptError,
    RateLimited,
    Timeout,
    Transient,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::BadSignature => "BadSignature",
            ErrorKind::NotAuthorized => "NotAuthorized",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::SchemaForbidsRevocable => "SchemaForbidsRevocable",
            ErrorKind::ChallengeMismatch => "ChallengeMismatch",
            ErrorKind::ChallengeExpired => "ChallengeExpired",
            ErrorKind::AttestationFailed => "AttestationFailed",
            ErrorKind::IntegrityViolation => "IntegrityViolation",
            ErrorKind::WrapFailed => "WrapFailed",
            ErrorKind::DecryptError => "DecryptError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Transient => "Transient",
        }
    }

    /// HTTP status the RPC layer reports for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthenticated
            | ErrorKind::BadSignature
            | ErrorKind::ChallengeMismatch
            | ErrorKind::ChallengeExpired
            | ErrorKind::AttestationFailed => 401,
            ErrorKind::NotAuthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::Unavailable => 410,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::SchemaForbidsRevocable => 422,
            ErrorKind::RateLimited => 429,
            ErrorKind::IntegrityViolation | ErrorKind::WrapFailed | ErrorKind::DecryptError => 500,
            ErrorKind::Transient => 503,
            ErrorKind::Timeout => 504,
        }
    }

    /// Whether the facade may retry the failed downstream call.
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Transient)
    }
}

#[derive(Debug, Error)]
pub enum AegisError {
    // ── Request validation ───────────────────────────────────────────────────
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("payload exceeds maximum of {max} bytes (got {got})")]
    PayloadTooLarge { max: usize, got: usize },

    #[error("too many recipients: max {max}, got {got}")]
    TooManyRecipients { max: usize, got: usize },

    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("duplicate recipient address in recipient set")]
    DuplicateRecipient,

    #[error("schema forbids revocable attestations")]
    SchemaForbidsRevocable,

    // ── Sessions & signatures ────────────────────────────────────────────────
    #[error("missing or invalid session token")]
    Unauthenticated,

    #[error("session token expired")]
    SessionExpired,

    #[error("signature does not recover to the claimed address")]
    BadSignature,

    #[error("requester is not the attester and not in the recipient set")]
    NotAuthorized,

    // ── Challenges ───────────────────────────────────────────────────────────
    #[error("challenge does not match the expected subject or purpose")]
    ChallengeMismatch,

    #[error("challenge has expired")]
    ChallengeExpired,

    #[error("challenge not found or already consumed")]
    ChallengeConsumed,

    // ── TEE verification ─────────────────────────────────────────────────────
    #[error("TEE quote verification failed: {}", .0.as_str())]
    AttestationFailed(QuoteFailure),

    #[error("unsupported TEE family: {0}")]
    UnsupportedTee(String),

    // ── Lookups ──────────────────────────────────────────────────────────────
    #[error("attestation not found: {0}")]
    AttestationNotFound(Uid),

    #[error("schema not found: {0}")]
    SchemaNotFound(SchemaUid),

    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("profile not found for address: {0}")]
    ProfileNotFound(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    // ── Conflicts ────────────────────────────────────────────────────────────
    #[error("schema already exists: {0}")]
    SchemaAlreadyExists(SchemaUid),

    #[error("device already registered: {0}")]
    DeviceAlreadyExists(DeviceId),

    // ── Attestation lifecycle ────────────────────────────────────────────────
    #[error("attestation has been revoked")]
    Revoked,

    #[error("attestation has expired")]
    Expired,

    #[error("attestation is not revocable")]
    NotRevocable,

    // ── Crypto layer ─────────────────────────────────────────────────────────
    #[error("failed to wrap symmetric key for recipient {recipient_index}: {detail}")]
    WrapFailed { recipient_index: usize, detail: String },

    #[error("authenticated decryption failed")]
    DecryptError,

    #[error("stored blob bytes do not match the anchored ciphertext digest")]
    IntegrityViolation,

    // ── Quotas & deadlines ───────────────────────────────────────────────────
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("transient downstream failure: {0}")]
    Transient(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl AegisError {
    /// Project onto the closed kind set of the public error contract.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AegisError::BadRequest(_)
            | AegisError::TooManyRecipients { .. }
            | AegisError::NoRecipients
            | AegisError::DuplicateRecipient
            | AegisError::NotRevocable
            | AegisError::UnsupportedTee(_) => ErrorKind::BadRequest,

            AegisError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            AegisError::SchemaForbidsRevocable => ErrorKind::SchemaForbidsRevocable,

            AegisError::Unauthenticated | AegisError::SessionExpired => ErrorKind::Unauthenticated,
            AegisError::BadSignature => ErrorKind::BadSignature,
            AegisError::NotAuthorized => ErrorKind::NotAuthorized,

            AegisError::ChallengeMismatch | AegisError::ChallengeConsumed => {
                ErrorKind::ChallengeMismatch
            }
            AegisError::ChallengeExpired => ErrorKind::ChallengeExpired,
            AegisError::AttestationFailed(_) => ErrorKind::AttestationFailed,

            AegisError::AttestationNotFound(_)
            | AegisError::SchemaNotFound(_)
            | AegisError::DeviceNotFound(_)
            | AegisError::ProfileNotFound(_)
            | AegisError::BlobNotFound(_) => ErrorKind::NotFound,

            AegisError::SchemaAlreadyExists(_) | AegisError::DeviceAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }

            AegisError::Revoked | AegisError::Expired => ErrorKind::Unavailable,

            AegisError::WrapFailed { .. } => ErrorKind::WrapFailed,
            AegisError::DecryptError => ErrorKind::DecryptError,
            AegisError::IntegrityViolation => ErrorKind::IntegrityViolation,

            AegisError::RateLimited { .. } => ErrorKind::RateLimited,
            AegisError::Timeout(_) => ErrorKind::Timeout,
            AegisError::Transient(_) | AegisError::Storage(_) | AegisError::Serialization(_) => {
                ErrorKind::Transient
            }
        }
    }
}
