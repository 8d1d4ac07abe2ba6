//! Single-use challenge nonces.
//!
//! A challenge is bound to a subject and a purpose and consumed exactly
//! once. Consumption rides on sled's atomic `remove`: of two racing
//! consumers, exactly one receives the stored row, the other observes
//! absence. A consume that fails validation burns the nonce — the caller
//! proved knowledge of it, and a fresh challenge is one request away.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;

use aegis_core::challenge::{Challenge, ChallengePurpose};
use aegis_core::error::AegisError;
use aegis_core::types::Timestamp;
use aegis_store::StateDb;

pub struct ChallengeStore {
    db: Arc<StateDb>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(db: Arc<StateDb>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Issue a fresh 16-byte nonce for `subject`, valid for the store TTL.
    pub fn issue(
        &self,
        subject: &str,
        purpose: ChallengePurpose,
        now: Timestamp,
    ) -> Result<Challenge, AegisError> {
        let mut nonce = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let challenge = Challenge {
            nonce,
            subject: subject.to_string(),
            purpose,
            issued_at: now,
            expires_at: now + self.ttl.as_secs() as Timestamp,
        };
        self.db.put_challenge(&challenge)?;
        Ok(challenge)
    }

    /// Atomically consume `nonce`, validating subject, purpose, and expiry.
    pub fn consume(
        &self,
        nonce: &[u8; 16],
        expected_subject: &str,
        expected_purpose: ChallengePurpose,
        now: Timestamp,
    ) -> Result<Challenge, AegisError> {
        let challenge = self
            .db
            .take_challenge(nonce)?
            .ok_or(AegisError::ChallengeConsumed)?;

        if challenge.subject != expected_subject || challenge.purpose != expected_purpose {
            return Err(AegisError::ChallengeMismatch);
        }
        if challenge.is_expired(now) {
            return Err(AegisError::ChallengeExpired);
        }
        Ok(challenge)
    }

    /// Evict expired rows. Called from the node's background reaper.
    pub fn sweep(&self, now: Timestamp) -> Result<usize, AegisError> {
        self.db.sweep_challenges(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ChallengeStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        (ChallengeStore::new(db, Duration::from_secs(300)), dir)
    }

    #[test]
    fn issue_then_consume() {
        let (store, _dir) = store();
        let c = store.issue("0xabc", ChallengePurpose::Login, 1000).unwrap();
        assert_eq!(c.expires_at, 1300);
        let consumed = store
            .consume(&c.nonce, "0xabc", ChallengePurpose::Login, 1100)
            .unwrap();
        assert_eq!(consumed, c);
    }

    #[test]
    fn second_consume_fails() {
        let (store, _dir) = store();
        let c = store.issue("0xabc", ChallengePurpose::Login, 1000).unwrap();
        store.consume(&c.nonce, "0xabc", ChallengePurpose::Login, 1100).unwrap();
        assert!(matches!(
            store.consume(&c.nonce, "0xabc", ChallengePurpose::Login, 1100),
            Err(AegisError::ChallengeConsumed)
        ));
    }

    #[test]
    fn subject_and_purpose_must_match() {
        let (store, _dir) = store();
        let c = store.issue("0xabc", ChallengePurpose::Login, 1000).unwrap();
        assert!(matches!(
            store.consume(&c.nonce, "0xdef", ChallengePurpose::Login, 1100),
            Err(AegisError::ChallengeMismatch)
        ));

        let c2 = store.issue("dev_0011223344556677", ChallengePurpose::TeeAttest, 1000).unwrap();
        assert!(matches!(
            store.consume(&c2.nonce, "dev_0011223344556677", ChallengePurpose::Login, 1100),
            Err(AegisError::ChallengeMismatch)
        ));
    }

    #[test]
    fn expired_challenge_rejected() {
        let (store, _dir) = store();
        let c = store.issue("0xabc", ChallengePurpose::Login, 1000).unwrap();
        assert!(matches!(
            store.consume(&c.nonce, "0xabc", ChallengePurpose::Login, 1301),
            Err(AegisError::ChallengeExpired)
        ));
    }

    #[test]
    fn concurrent_consumers_see_one_success() {
        let (store, _dir) = store();
        let store = Arc::new(store);
        let c = store.issue("0xabc", ChallengePurpose::Login, 1000).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let nonce = c.nonce;
            handles.push(std::thread::spawn(move || {
                store.consume(&nonce, "0xabc", ChallengePurpose::Login, 1100).is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
