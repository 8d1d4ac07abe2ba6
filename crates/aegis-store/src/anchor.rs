//! The anchor log interface and its single-node implementation.
//!
//! The engine relies on one guarantee only: once `append` returns, `read` of
//! the same UID returns the same record to all observers. Consensus,
//! ordering, and durability strategy are the implementation's business — a
//! Raft log or an on-chain contract can replace [`SledAnchorLog`] without
//! touching the engines.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use aegis_core::attestation::EncryptedAttestation;
use aegis_core::error::AegisError;
use aegis_core::types::{Address, Timestamp, Uid};

use crate::db::StateDb;

/// Append-only log of anchor records with secondary enumeration.
#[async_trait]
pub trait AnchorLog: Send + Sync {
    /// Append an immutable anchor record. Atomic: the record is durably
    /// visible in full or the append never happened.
    async fn append(&self, record: EncryptedAttestation) -> Result<Uid, AegisError>;

    async fn read(&self, uid: &Uid) -> Result<Option<EncryptedAttestation>, AegisError>;

    async fn enumerate_by_attester(
        &self,
        attester: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError>;

    async fn enumerate_by_recipient(
        &self,
        recipient: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError>;

    /// Mark a record revoked. Idempotent when already revoked; fails when
    /// `attester` is not the original attester or the record is not
    /// revocable.
    async fn revoke(&self, uid: &Uid, attester: &Address, now: Timestamp) -> Result<(), AegisError>;
}

/// Sled-backed anchor log.
pub struct SledAnchorLog {
    db: Arc<StateDb>,
    /// Serializes revoke read-modify-write against concurrent reads of the
    /// same record, so a retrieval sees the pre- or post-revoke record in
    /// full, never a torn intermediate.
    revoke_lock: Mutex<()>,
}

impl SledAnchorLog {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db, revoke_lock: Mutex::new(()) }
    }
}

#[async_trait]
impl AnchorLog for SledAnchorLog {
    async fn append(&self, record: EncryptedAttestation) -> Result<Uid, AegisError> {
        let uid = record.uid;
        if self.db.attestation_exists(&uid) {
            // Content-derived UIDs make duplicate appends idempotent retries.
            return Ok(uid);
        }
        self.db.put_attestation(&record)?;
        self.db.flush()?;
        info!(uid = %uid, attester = %record.attester, "anchor appended");
        Ok(uid)
    }

    async fn read(&self, uid: &Uid) -> Result<Option<EncryptedAttestation>, AegisError> {
        self.db.get_attestation(uid)
    }

    async fn enumerate_by_attester(
        &self,
        attester: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.db.iter_attestations_by_attester(attester)
    }

    async fn enumerate_by_recipient(
        &self,
        recipient: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.db.iter_attestations_by_recipient(recipient)
    }

    async fn revoke(&self, uid: &Uid, attester: &Address, now: Timestamp) -> Result<(), AegisError> {
        let _guard = self.revoke_lock.lock().expect("revoke lock poisoned");

        let mut record = self
            .db
            .get_attestation(uid)?
            .ok_or(AegisError::AttestationNotFound(*uid))?;

        if record.attester != *attester {
            return Err(AegisError::NotAuthorized);
        }
        if !record.revocable {
            return Err(AegisError::NotRevocable);
        }
        if record.revoked {
            // Monotonic: the transition happened exactly once already.
            return Ok(());
        }

        record.revoked = true;
        record.revocation_time = Some(now);
        self.db.put_attestation(&record)?;
        self.db.flush()?;
        info!(uid = %uid, "anchor revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::attestation::RecipientKey;
    use aegis_core::types::{BlobId, SchemaUid};

    fn open_log() -> (SledAnchorLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        (SledAnchorLog::new(db), dir)
    }

    fn record(revocable: bool) -> EncryptedAttestation {
        EncryptedAttestation {
            uid: Uid::from_bytes([4; 32]),
            schema_uid: SchemaUid::from_bytes([1; 32]),
            attester: Address::from_bytes([7; 20]),
            blob_id: BlobId::from_bytes([2; 32]),
            ciphertext_digest: [2; 32],
            recipients: vec![RecipientKey {
                address: Address::from_bytes([8; 20]),
                wrapped_key: vec![0; 93],
            }],
            revocable,
            revoked: false,
            revocation_time: None,
            expiration_time: None,
            created_at: 10,
        }
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let (log, _dir) = open_log();
        let r = record(true);
        let uid = log.append(r.clone()).await.unwrap();
        assert_eq!(log.read(&uid).await.unwrap().unwrap(), r);
        // Retried append of the same record is a no-op.
        assert_eq!(log.append(r.clone()).await.unwrap(), uid);
    }

    #[tokio::test]
    async fn revoke_is_monotonic_and_idempotent() {
        let (log, _dir) = open_log();
        let r = record(true);
        let attester = r.attester;
        let uid = log.append(r).await.unwrap();

        log.revoke(&uid, &attester, 50).await.unwrap();
        let revoked = log.read(&uid).await.unwrap().unwrap();
        assert!(revoked.revoked);
        assert_eq!(revoked.revocation_time, Some(50));

        // Second revoke succeeds without moving the revocation time.
        log.revoke(&uid, &attester, 60).await.unwrap();
        assert_eq!(log.read(&uid).await.unwrap().unwrap().revocation_time, Some(50));
    }

    #[tokio::test]
    async fn revoke_rejects_non_attester_and_non_revocable() {
        let (log, _dir) = open_log();
        let r = record(true);
        let uid = log.append(r).await.unwrap();
        let stranger = Address::from_bytes([99; 20]);
        assert!(matches!(
            log.revoke(&uid, &stranger, 1).await,
            Err(AegisError::NotAuthorized)
        ));

        let (log2, _dir2) = open_log();
        let fixed = record(false);
        let attester = fixed.attester;
        let uid2 = log2.append(fixed).await.unwrap();
        assert!(matches!(
            log2.revoke(&uid2, &attester, 1).await,
            Err(AegisError::NotRevocable)
        ));
    }

    #[tokio::test]
    async fn revoke_of_missing_uid_is_not_found() {
        let (log, _dir) = open_log();
        assert!(matches!(
            log.revoke(&Uid::from_bytes([0; 32]), &Address::from_bytes([1; 20]), 1).await,
            Err(AegisError::AttestationNotFound(_))
        ));
    }
}
