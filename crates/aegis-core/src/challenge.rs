//! One-time challenges and session-token payloads.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Timestamp};

/// What a challenge nonce may be consumed for. A login nonce can never
/// satisfy a TEE attestation, and vice versa.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChallengePurpose {
    Login,
    TeeAttest,
}

/// A single-use, time-bound nonce bound to a subject and purpose.
///
/// `subject` is an address hex string for logins and a device id for TEE
/// challenges. Consumption is atomic; expired rows are reaped in the
/// background.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    pub nonce: [u8; 16],
    pub subject: String,
    pub purpose: ChallengePurpose,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Challenge {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// The MAC-protected body of a session bearer token.
///
/// Wire form: `base64(bincode(TokenPayload) || hmac_sha256)`. Tokens are
/// opaque to clients; rotation of the server secret invalidates all of them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenPayload {
    pub subject: Address,
    pub nonce: [u8; 16],
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}
