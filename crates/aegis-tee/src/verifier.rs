//! TEE quote verification.
//!
//! The verifier decides whether an opaque quote is genuine, fresh, bound to
//! the issued challenge nonce, and attests the claimed hardware key. Its
//! verdict is the sole input to the TEE gate of the device trust score.

use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use aegis_core::challenge::{Challenge, ChallengePurpose};
use aegis_core::config::Config;
use aegis_core::constants::QUOTE_SKEW_TOLERANCE_SECS;
use aegis_core::error::{AegisError, QuoteFailure};
use aegis_core::types::{DeviceId, TeeType, Timestamp};
use aegis_crypto::hash::sha256;
use aegis_store::StateDb;

use crate::challenge::ChallengeStore;
use crate::quote::{SecureEnclaveEnvelope, TrustZoneToken, TrustedRoots};

/// The quote body accepted verbatim when demo mode is enabled.
pub const DEMO_MODE_QUOTE: &[u8] = b"DEMO_MODE_VALID_SIG";

/// A successfully verified quote.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedQuote {
    /// SEC1-encoded hardware public key attested by the quote.
    pub hardware_public_key: Vec<u8>,
    /// Firmware version carried by the quote, when the family reports one.
    pub firmware_version: Option<u32>,
}

pub struct TeeVerifier {
    db: Arc<StateDb>,
    challenges: Arc<ChallengeStore>,
    roots: TrustedRoots,
    quote_max_age: Duration,
    replay_window: Duration,
    demo_mode: bool,
}

impl TeeVerifier {
    pub fn new(
        db: Arc<StateDb>,
        challenges: Arc<ChallengeStore>,
        roots: TrustedRoots,
        config: &Config,
    ) -> Self {
        Self {
            db,
            challenges,
            roots,
            quote_max_age: config.quote_max_age,
            replay_window: config.replay_window,
            demo_mode: config.tee_demo_mode,
        }
    }

    /// Issue a TEE attestation challenge for `device_id`.
    pub fn issue_challenge(&self, device_id: &DeviceId, now: Timestamp) -> Result<Challenge, AegisError> {
        self.challenges.issue(device_id.as_str(), ChallengePurpose::TeeAttest, now)
    }

    /// Verify a quote against the issued challenge.
    ///
    /// Order of checks: challenge consumption (atomic), replay, then the
    /// family-specific parse / freshness / nonce / chain / key-binding
    /// checks. Every failure is typed; the challenge is burned either way.
    pub fn verify_quote(
        &self,
        device_id: &DeviceId,
        tee_type: TeeType,
        quote_bytes: &[u8],
        nonce: [u8; 16],
        claimed_public_key: &[u8],
        now: Timestamp,
    ) -> Result<VerifiedQuote, AegisError> {
        self.challenges
            .consume(&nonce, device_id.as_str(), ChallengePurpose::TeeAttest, now)?;

        let nonce_hash = sha256(&nonce);
        if self.db.replay_mark_live(device_id, &nonce_hash, now)? {
            warn!(device_id = %device_id, "quote replay detected");
            return Err(AegisError::AttestationFailed(QuoteFailure::Replayed));
        }

        if self.demo_mode && quote_bytes == DEMO_MODE_QUOTE {
            // Testnet bypass. Deliberately loud: every acceptance is audited.
            warn!(device_id = %device_id, "TEE demo mode quote accepted — not a real attestation");
            self.record_verification(device_id, &nonce_hash, now)?;
            return Ok(VerifiedQuote {
                hardware_public_key: claimed_public_key.to_vec(),
                firmware_version: None,
            });
        }

        let verified = match tee_type {
            TeeType::TrustZone => self.verify_trustzone(quote_bytes, &nonce, claimed_public_key, now)?,
            TeeType::SecureEnclave => {
                self.verify_secure_enclave(quote_bytes, &nonce, claimed_public_key, now)?
            }
        };

        self.record_verification(device_id, &nonce_hash, now)?;
        info!(device_id = %device_id, tee_type = %tee_type, "TEE quote verified");
        Ok(verified)
    }

    fn verify_trustzone(
        &self,
        quote_bytes: &[u8],
        nonce: &[u8; 16],
        claimed_public_key: &[u8],
        now: Timestamp,
    ) -> Result<VerifiedQuote, AegisError> {
        let token = TrustZoneToken::decode(quote_bytes)?;

        self.check_freshness(token.payload.issued_at, now)?;

        if !bool::from(token.payload.nonce[..].ct_eq(&nonce[..])) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadNonce));
        }

        token.verify_signatures(&self.roots.trustzone_keys()?)?;

        if !bool::from(token.payload.hardware_public_key.ct_eq(claimed_public_key)) {
            // Genuine quote, wrong key: the chain does not attest the claim.
            return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
        }

        Ok(VerifiedQuote {
            hardware_public_key: token.payload.hardware_public_key,
            firmware_version: Some(token.payload.firmware_version),
        })
    }

    fn verify_secure_enclave(
        &self,
        quote_bytes: &[u8],
        nonce: &[u8; 16],
        claimed_public_key: &[u8],
        now: Timestamp,
    ) -> Result<VerifiedQuote, AegisError> {
        let envelope = SecureEnclaveEnvelope::decode(quote_bytes)?;

        self.check_freshness(envelope.payload.issued_at, now)?;

        // App-Attest binds the challenge through the client data hash.
        let expected = sha256(nonce);
        if !bool::from(envelope.payload.client_data_hash[..].ct_eq(&expected[..])) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadNonce));
        }

        if envelope.payload.key_id != sha256(&envelope.payload.hardware_public_key) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadFormat));
        }

        envelope.verify_signatures(&self.roots.secure_enclave_keys()?)?;

        if !bool::from(envelope.payload.hardware_public_key.ct_eq(claimed_public_key)) {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadChain));
        }

        Ok(VerifiedQuote {
            hardware_public_key: envelope.payload.hardware_public_key,
            firmware_version: None,
        })
    }

    /// Reject quotes older than the configured maximum, or issued further in
    /// the future than the skew tolerance allows.
    fn check_freshness(&self, issued_at: Timestamp, now: Timestamp) -> Result<(), AegisError> {
        let max_age = self.quote_max_age.as_secs() as Timestamp + QUOTE_SKEW_TOLERANCE_SECS;
        if now - issued_at > max_age {
            return Err(AegisError::AttestationFailed(QuoteFailure::ExpiredQuote));
        }
        if issued_at - now > QUOTE_SKEW_TOLERANCE_SECS {
            return Err(AegisError::AttestationFailed(QuoteFailure::BadFormat));
        }
        Ok(())
    }

    fn record_verification(
        &self,
        device_id: &DeviceId,
        nonce_hash: &[u8; 32],
        now: Timestamp,
    ) -> Result<(), AegisError> {
        let expires = now + self.replay_window.as_secs() as Timestamp;
        self.db.put_replay_mark(device_id, nonce_hash, expires)
    }

    /// Evict expired replay marks. Called from the node's background reaper.
    pub fn sweep_replay_marks(&self, now: Timestamp) -> Result<usize, AegisError> {
        self.db.sweep_replay_marks(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::testkit::TestManufacturer;
    use aegis_crypto::hash::device_id_from_pubkey;

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        verifier: TeeVerifier,
        manufacturer: TestManufacturer,
        _dir: tempfile::TempDir,
    }

    fn fixture(demo_mode: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let config = Config { tee_demo_mode: demo_mode, ..Config::default() };
        let challenges = Arc::new(ChallengeStore::new(Arc::clone(&db), config.challenge_ttl));

        let manufacturer = TestManufacturer::new();
        let roots = TrustedRoots {
            trustzone: vec![hex::encode(manufacturer.root_sec1())],
            secure_enclave: vec![hex::encode(manufacturer.root_sec1())],
        };
        Fixture {
            verifier: TeeVerifier::new(db, challenges, roots, &config),
            manufacturer,
            _dir: dir,
        }
    }

    fn hardware_key() -> Vec<u8> {
        vec![0x02; 33]
    }

    fn challenged_device(f: &Fixture, key: &[u8]) -> (DeviceId, [u8; 16]) {
        let device_id = device_id_from_pubkey(key, TeeType::TrustZone);
        let challenge = f.verifier.issue_challenge(&device_id, NOW).unwrap();
        (device_id, challenge.nonce)
    }

    #[test]
    fn trustzone_quote_verifies_end_to_end() {
        let f = fixture(false);
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);

        let token = f.manufacturer.trustzone_token(key.clone(), nonce, NOW - 30, 4);
        let quote = bincode::serialize(&token).unwrap();

        let verified = f
            .verifier
            .verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW)
            .unwrap();
        assert_eq!(verified.hardware_public_key, key);
        assert_eq!(verified.firmware_version, Some(4));
    }

    #[test]
    fn secure_enclave_quote_verifies_end_to_end() {
        let f = fixture(false);
        let key = hardware_key();
        let device_id = device_id_from_pubkey(&key, TeeType::SecureEnclave);
        let challenge = f.verifier.issue_challenge(&device_id, NOW).unwrap();

        let envelope =
            f.manufacturer
                .secure_enclave_envelope(key.clone(), sha256(&challenge.nonce), NOW - 5);
        let quote = bincode::serialize(&envelope).unwrap();

        let verified = f
            .verifier
            .verify_quote(&device_id, TeeType::SecureEnclave, &quote, challenge.nonce, &key, NOW)
            .unwrap();
        assert_eq!(verified.hardware_public_key, key);
        assert_eq!(verified.firmware_version, None);
    }

    #[test]
    fn wrong_nonce_in_token_is_bad_nonce() {
        let f = fixture(false);
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);

        let token = f.manufacturer.trustzone_token(key.clone(), [0xee; 16], NOW - 30, 4);
        let quote = bincode::serialize(&token).unwrap();

        assert!(matches!(
            f.verifier.verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW),
            Err(AegisError::AttestationFailed(QuoteFailure::BadNonce))
        ));
    }

    #[test]
    fn stale_quote_is_expired() {
        let f = fixture(false);
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);

        // Older than QUOTE_MAX_AGE (10 min) + skew (60 s).
        let token = f.manufacturer.trustzone_token(key.clone(), nonce, NOW - 700, 4);
        let quote = bincode::serialize(&token).unwrap();

        assert!(matches!(
            f.verifier.verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW),
            Err(AegisError::AttestationFailed(QuoteFailure::ExpiredQuote))
        ));
    }

    #[test]
    fn chain_from_unknown_manufacturer_is_bad_chain() {
        let f = fixture(false);
        let rogue = TestManufacturer::new();
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);

        let token = rogue.trustzone_token(key.clone(), nonce, NOW - 30, 4);
        let quote = bincode::serialize(&token).unwrap();

        assert!(matches!(
            f.verifier.verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW),
            Err(AegisError::AttestationFailed(QuoteFailure::BadChain))
        ));
    }

    #[test]
    fn genuine_quote_for_another_key_is_rejected() {
        let f = fixture(false);
        let key = hardware_key();
        let other_key = vec![0x03; 33];
        let (device_id, nonce) = challenged_device(&f, &key);

        let token = f.manufacturer.trustzone_token(other_key, nonce, NOW - 30, 4);
        let quote = bincode::serialize(&token).unwrap();

        assert!(matches!(
            f.verifier.verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW),
            Err(AegisError::AttestationFailed(QuoteFailure::BadChain))
        ));
    }

    #[test]
    fn consumed_challenge_cannot_be_reused() {
        let f = fixture(false);
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);

        let token = f.manufacturer.trustzone_token(key.clone(), nonce, NOW - 30, 4);
        let quote = bincode::serialize(&token).unwrap();

        f.verifier
            .verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW)
            .unwrap();
        // The nonce was consumed with the first verification.
        assert!(matches!(
            f.verifier.verify_quote(&device_id, TeeType::TrustZone, &quote, nonce, &key, NOW),
            Err(AegisError::ChallengeConsumed)
        ));
    }

    #[test]
    fn demo_quote_requires_demo_mode() {
        let f = fixture(false);
        let key = hardware_key();
        let (device_id, nonce) = challenged_device(&f, &key);
        assert!(f
            .verifier
            .verify_quote(&device_id, TeeType::TrustZone, DEMO_MODE_QUOTE, nonce, &key, NOW)
            .is_err());

        let f = fixture(true);
        let (device_id, nonce) = challenged_device(&f, &key);
        let verified = f
            .verifier
            .verify_quote(&device_id, TeeType::TrustZone, DEMO_MODE_QUOTE, nonce, &key, NOW)
            .unwrap();
        assert_eq!(verified.hardware_public_key, key);
    }
}
