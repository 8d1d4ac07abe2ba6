//! Session authentication: wallet-signature login and short-lived bearer
//! tokens.
//!
//! Login is challenge/response: the server issues a human-readable message
//! embedding a one-time nonce; the wallet signs it (EIP-191); the server
//! consumes the nonce, recovers the signer, and mints an HMAC-SHA256 bearer
//! token. Tokens are opaque; rotating the server secret invalidates every
//! outstanding token at once.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::{info, warn};

use aegis_core::challenge::{Challenge, ChallengePurpose, TokenPayload};
use aegis_core::config::Config;
use aegis_core::error::AegisError;
use aegis_core::types::{Address, Timestamp};
use aegis_crypto::signature::recover_address;
use aegis_store::StateDb;
use aegis_tee::ChallengeStore;

type HmacSha256 = Hmac<Sha256>;

/// Meta key holding the server MAC secret. Rotated by the operator.
const SESSION_SECRET_KEY: &str = "session_secret";
const SESSION_SECRET_LEN: usize = 32;
const MAC_LEN: usize = 32;

/// A freshly issued login challenge.
#[derive(Clone, Debug)]
pub struct LoginChallenge {
    pub message: String,
    pub nonce: [u8; 16],
    pub expires_at: Timestamp,
}

/// An issued session.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub expires_at: Timestamp,
}

/// The human-readable message the wallet signs.
pub fn login_message(address: &Address, nonce: &[u8; 16], issued_at: Timestamp) -> String {
    format!(
        "Aegis login\naddress: {}\nnonce: {}\nissued-at: {}",
        address.to_hex(),
        hex::encode(nonce),
        issued_at,
    )
}

pub struct SessionAuth {
    db: Arc<StateDb>,
    challenges: Arc<ChallengeStore>,
    session_ttl: Duration,
}

impl SessionAuth {
    /// Create the session authenticator, generating and persisting the
    /// server secret on first start.
    pub fn open(
        db: Arc<StateDb>,
        challenges: Arc<ChallengeStore>,
        config: &Config,
    ) -> Result<Self, AegisError> {
        if db.get_meta(SESSION_SECRET_KEY)?.is_none() {
            let mut secret = [0u8; SESSION_SECRET_LEN];
            rand::rngs::OsRng.fill_bytes(&mut secret);
            db.put_meta(SESSION_SECRET_KEY, &secret)?;
            info!("generated fresh session secret");
        }
        Ok(Self { db, challenges, session_ttl: config.session_ttl })
    }

    /// Replace the server secret, invalidating all outstanding tokens.
    pub fn rotate_secret(&self) -> Result<(), AegisError> {
        let mut secret = [0u8; SESSION_SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        self.db.put_meta(SESSION_SECRET_KEY, &secret)?;
        warn!("session secret rotated; all sessions invalidated");
        Ok(())
    }

    fn secret(&self) -> Result<Vec<u8>, AegisError> {
        self.db
            .get_meta(SESSION_SECRET_KEY)?
            .ok_or_else(|| AegisError::Storage("session secret missing".into()))
    }

    fn mac(&self, payload_bytes: &[u8]) -> Result<[u8; MAC_LEN], AegisError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret()?)
            .map_err(|_| AegisError::Storage("invalid session secret length".into()))?;
        mac.update(payload_bytes);
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    // ── Challenge ────────────────────────────────────────────────────────────

    pub fn issue_login_challenge(
        &self,
        address: &Address,
        now: Timestamp,
    ) -> Result<LoginChallenge, AegisError> {
        let challenge = self
            .challenges
            .issue(&address.to_hex(), ChallengePurpose::Login, now)?;
        Ok(LoginChallenge {
            message: login_message(address, &challenge.nonce, challenge.issued_at),
            nonce: challenge.nonce,
            expires_at: challenge.expires_at,
        })
    }

    // ── Verify ───────────────────────────────────────────────────────────────

    /// Consume the login nonce, check the wallet signature over the original
    /// challenge message, and mint a bearer token.
    pub fn verify_login(
        &self,
        address: &Address,
        nonce: &[u8; 16],
        signature: &[u8],
        now: Timestamp,
    ) -> Result<Session, AegisError> {
        let challenge: Challenge =
            self.challenges
                .consume(nonce, &address.to_hex(), ChallengePurpose::Login, now)?;

        let message = login_message(address, &challenge.nonce, challenge.issued_at);
        let recovered = recover_address(message.as_bytes(), signature)?;
        if recovered != *address {
            warn!(claimed = %address, recovered = %recovered, "login signature recovered wrong address");
            return Err(AegisError::BadSignature);
        }

        let payload = TokenPayload {
            subject: *address,
            nonce: challenge.nonce,
            issued_at: now,
            expires_at: now + self.session_ttl.as_secs() as Timestamp,
        };
        let payload_bytes =
            bincode::serialize(&payload).map_err(|e| AegisError::Serialization(e.to_string()))?;
        let mac = self.mac(&payload_bytes)?;

        let mut token_bytes = payload_bytes;
        token_bytes.extend_from_slice(&mac);

        info!(address = %address, expires_at = payload.expires_at, "session issued");
        Ok(Session {
            token: URL_SAFE_NO_PAD.encode(token_bytes),
            expires_at: payload.expires_at,
        })
    }

    // ── Authorize ────────────────────────────────────────────────────────────

    /// Validate a bearer token: recompute the MAC (constant-time compare)
    /// and check expiry. Returns the authenticated payload.
    pub fn authorize(&self, token: &str, now: Timestamp) -> Result<TokenPayload, AegisError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AegisError::Unauthenticated)?;
        if bytes.len() <= MAC_LEN {
            return Err(AegisError::Unauthenticated);
        }
        let (payload_bytes, presented_mac) = bytes.split_at(bytes.len() - MAC_LEN);

        let mut mac = HmacSha256::new_from_slice(&self.secret()?)
            .map_err(|_| AegisError::Storage("invalid session secret length".into()))?;
        mac.update(payload_bytes);
        // hmac's verify is constant-time.
        mac.verify_slice(presented_mac)
            .map_err(|_| AegisError::Unauthenticated)?;

        let payload: TokenPayload = bincode::deserialize(payload_bytes)
            .map_err(|_| AegisError::Unauthenticated)?;
        if now > payload.expires_at {
            return Err(AegisError::SessionExpired);
        }
        Ok(payload)
    }
}
