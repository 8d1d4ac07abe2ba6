//! The encrypted-attestation engine.
//!
//! Create is a five-step protocol: generate a per-attestation AES-256 key,
//! seal the payload, ECIES-wrap the key for every recipient, publish the
//! sealed envelope to the blob store, then anchor the
//! `(blob, digest, recipient-set)` tuple. The blob is durable before the
//! anchor exists; an anchor never references bytes that were not accepted
//! first. Orphan blobs from a failed append are harmless — content-addressed
//! stores deduplicate — and are swept by the node's reconciler.
//!
//! The engine never sees a recipient's private key and zeroizes the
//! symmetric key before returning.

use std::sync::Arc;

use tracing::{info, warn};

use aegis_core::attestation::{EncryptedAttestation, RecipientKey};
use aegis_core::error::AegisError;
use aegis_core::types::{Address, BlobId, SchemaUid, Timestamp, Uid};
use aegis_crypto::hash::{digests_equal, sha256, sha256_parts};
use aegis_crypto::signature::{
    create_attestation_message, retrieve_attestation_message, revoke_attestation_message,
    verify_signer,
};
use aegis_crypto::{seal, wrap_key};
use aegis_store::{AnchorLog, BlobStore, StateDb};

// ── Requests & results ───────────────────────────────────────────────────────

/// A create request: the caller hands the plaintext to its own node, which
/// runs the full five-step protocol.
#[derive(Clone, Debug)]
pub struct CreateAttestation {
    pub schema_uid: SchemaUid,
    pub plaintext: Vec<u8>,
    /// `(address, SEC1 ECIES public key)` in caller order.
    pub recipients: Vec<(Address, Vec<u8>)>,
    pub revocable: bool,
    pub expiration_time: Option<Timestamp>,
    /// Mixed into the UID in place of the creation nanos when supplied,
    /// making retries UID-stable.
    pub client_nonce: Option<[u8; 32]>,
    pub attester: Address,
    /// EIP-191 signature over the canonical create message.
    pub signature: Vec<u8>,
}

/// A submit request: the caller sealed locally and ships the anchor inputs
/// of the wire API — blob id, ciphertext digest, pre-wrapped keys.
#[derive(Clone, Debug)]
pub struct SubmitAttestation {
    pub schema_uid: SchemaUid,
    pub blob_id: BlobId,
    pub ciphertext_digest: [u8; 32],
    pub recipients: Vec<RecipientKey>,
    pub revocable: bool,
    pub expiration_time: Option<Timestamp>,
    pub client_nonce: Option<[u8; 32]>,
    pub attester: Address,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Created {
    pub uid: Uid,
    pub blob_id: BlobId,
}

/// A successful retrieval: the sealed envelope plus the wrapped key for the
/// requester. `wrapped_key` is `None` only when the requester is the
/// attester without being a recipient — the attester may audit the
/// ciphertext but holds no key slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retrieved {
    pub blob_id: BlobId,
    pub envelope: Vec<u8>,
    pub wrapped_key: Option<Vec<u8>>,
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct AttestationEngine {
    db: Arc<StateDb>,
    blobs: Arc<dyn BlobStore>,
    anchors: Arc<dyn AnchorLog>,
    max_recipients: usize,
    max_plaintext_size: usize,
}

impl AttestationEngine {
    pub fn new(
        db: Arc<StateDb>,
        blobs: Arc<dyn BlobStore>,
        anchors: Arc<dyn AnchorLog>,
        max_recipients: usize,
        max_plaintext_size: usize,
    ) -> Self {
        Self { db, blobs, anchors, max_recipients, max_plaintext_size }
    }

    // ── Create (five-step) ───────────────────────────────────────────────────

    pub async fn create(
        &self,
        req: CreateAttestation,
        now: Timestamp,
        now_ns: i64,
    ) -> Result<Created, AegisError> {
        // Preconditions, cheapest checks first, failing fast.
        self.check_recipient_addresses(req.recipients.iter().map(|(a, _)| *a))?;
        self.check_schema_revocability(&req.schema_uid, req.revocable)?;

        if req.plaintext.len() > self.max_plaintext_size {
            return Err(AegisError::PayloadTooLarge {
                max: self.max_plaintext_size,
                got: req.plaintext.len(),
            });
        }

        let plaintext_digest = sha256(&req.plaintext);
        let addresses: Vec<Address> = req.recipients.iter().map(|(a, _)| *a).collect();
        let message = create_attestation_message(&req.schema_uid, &plaintext_digest, &addresses);
        verify_signer(&message, &req.signature, &req.attester)?;

        // Step 1-2: fresh key, seal. The key zeroizes on drop.
        let key = aegis_crypto::generate_symmetric_key();
        let envelope = seal(&req.plaintext, &key)?.to_bytes();

        // Step 3: wrap for every recipient in input order; any failure
        // aborts with no state written.
        let mut recipients = Vec::with_capacity(req.recipients.len());
        for (i, (address, public_key)) in req.recipients.iter().enumerate() {
            let wrapped = wrap_key(&key, public_key).map_err(|e| {
                warn!(recipient = %address, error = %e, "recipient key wrap failed");
                AegisError::WrapFailed { recipient_index: i, detail: e.to_string() }
            })?;
            recipients.push(RecipientKey { address: *address, wrapped_key: wrapped });
        }
        drop(key);

        // Step 4: publish. The blob must be durably accepted before any
        // anchor references it.
        let digest = sha256(&envelope);
        let blob_id = self.blobs.put(&envelope).await?;

        // Step 5: anchor.
        let uid = derive_uid(&req.schema_uid, &req.attester, req.client_nonce, now_ns, &digest);
        let record = EncryptedAttestation {
            uid,
            schema_uid: req.schema_uid,
            attester: req.attester,
            blob_id,
            ciphertext_digest: digest,
            recipients,
            revocable: req.revocable,
            revoked: false,
            revocation_time: None,
            expiration_time: req.expiration_time,
            created_at: now,
        };
        let uid = self.anchors.append(record).await?;

        info!(uid = %uid, attester = %req.attester, recipients = addresses.len(), "attestation created");
        Ok(Created { uid, blob_id })
    }

    // ── Submit (pre-sealed) ──────────────────────────────────────────────────

    /// Anchor an attestation the caller sealed locally. The stored blob must
    /// already exist and match the declared digest; every recipient
    /// invariant of `create` applies unchanged. The signed message uses the
    /// ciphertext digest where `create` uses the plaintext digest — the
    /// engine never sees this plaintext.
    pub async fn submit(&self, req: SubmitAttestation, now: Timestamp) -> Result<Created, AegisError> {
        self.check_recipient_addresses(req.recipients.iter().map(|r| r.address))?;
        EncryptedAttestation::validate_recipients(&req.recipients, self.max_recipients)?;
        self.check_schema_revocability(&req.schema_uid, req.revocable)?;

        let addresses: Vec<Address> = req.recipients.iter().map(|r| r.address).collect();
        let message =
            create_attestation_message(&req.schema_uid, &req.ciphertext_digest, &addresses);
        verify_signer(&message, &req.signature, &req.attester)?;

        let envelope = self.blobs.get(&req.blob_id).await?;
        if !digests_equal(&sha256(&envelope), &req.ciphertext_digest) {
            return Err(AegisError::BadRequest(
                "ciphertext_digest does not match the stored blob".into(),
            ));
        }

        let uid = derive_uid(
            &req.schema_uid,
            &req.attester,
            req.client_nonce,
            now * 1_000_000_000,
            &req.ciphertext_digest,
        );
        let record = EncryptedAttestation {
            uid,
            schema_uid: req.schema_uid,
            attester: req.attester,
            blob_id: req.blob_id,
            ciphertext_digest: req.ciphertext_digest,
            recipients: req.recipients,
            revocable: req.revocable,
            revoked: false,
            revocation_time: None,
            expiration_time: req.expiration_time,
            created_at: now,
        };
        let uid = self.anchors.append(record).await?;

        info!(uid = %uid, attester = %req.attester, "pre-sealed attestation anchored");
        Ok(Created { uid, blob_id: req.blob_id })
    }

    // ── Retrieve ─────────────────────────────────────────────────────────────

    pub async fn retrieve(
        &self,
        uid: &Uid,
        requester: &Address,
        signature: &[u8],
        now: Timestamp,
    ) -> Result<Retrieved, AegisError> {
        verify_signer(&retrieve_attestation_message(uid), signature, requester)?;

        let record = self
            .anchors
            .read(uid)
            .await?
            .ok_or(AegisError::AttestationNotFound(*uid))?;

        if record.revoked {
            return Err(AegisError::Revoked);
        }
        if record.is_expired(now) {
            return Err(AegisError::Expired);
        }

        let wrapped_key = match record.wrapped_key_for(requester) {
            Some(r) => Some(r.wrapped_key.clone()),
            None if record.attester == *requester => None,
            None => return Err(AegisError::NotAuthorized),
        };

        let envelope = self.blobs.get(&record.blob_id).await?;
        if !digests_equal(&sha256(&envelope), &record.ciphertext_digest) {
            // Blob-store misbehavior, not a caller error.
            warn!(uid = %uid, blob_id = %record.blob_id, "blob digest mismatch on retrieve");
            return Err(AegisError::IntegrityViolation);
        }

        Ok(Retrieved { blob_id: record.blob_id, envelope, wrapped_key })
    }

    /// Anchor metadata without wrapped keys, for the public read path.
    pub async fn get_record(&self, uid: &Uid) -> Result<EncryptedAttestation, AegisError> {
        self.anchors
            .read(uid)
            .await?
            .ok_or(AegisError::AttestationNotFound(*uid))
    }

    pub async fn list_by_attester(&self, attester: &Address) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.anchors.enumerate_by_attester(attester).await
    }

    pub async fn list_by_recipient(&self, recipient: &Address) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.anchors.enumerate_by_recipient(recipient).await
    }

    // ── Revoke ───────────────────────────────────────────────────────────────

    pub async fn revoke(
        &self,
        uid: &Uid,
        attester: &Address,
        signature: &[u8],
        now: Timestamp,
    ) -> Result<(), AegisError> {
        verify_signer(&revoke_attestation_message(uid), signature, attester)?;
        self.anchors.revoke(uid, attester, now).await
    }

    // ── Shared checks ────────────────────────────────────────────────────────

    fn check_recipient_addresses(
        &self,
        addresses: impl Iterator<Item = Address>,
    ) -> Result<(), AegisError> {
        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        for address in addresses {
            count += 1;
            if !seen.insert(address) {
                return Err(AegisError::DuplicateRecipient);
            }
        }
        if count == 0 {
            return Err(AegisError::NoRecipients);
        }
        if count > self.max_recipients {
            return Err(AegisError::TooManyRecipients { max: self.max_recipients, got: count });
        }
        Ok(())
    }

    fn check_schema_revocability(
        &self,
        schema_uid: &SchemaUid,
        revocable: bool,
    ) -> Result<(), AegisError> {
        let schema = self
            .db
            .get_schema(schema_uid)?
            .ok_or(AegisError::SchemaNotFound(*schema_uid))?;
        if !schema.revocable && revocable {
            return Err(AegisError::SchemaForbidsRevocable);
        }
        Ok(())
    }
}

/// `uid = SHA-256(schema_uid || attester || nonce-or-now_ns || digest)`.
fn derive_uid(
    schema_uid: &SchemaUid,
    attester: &Address,
    client_nonce: Option<[u8; 32]>,
    now_ns: i64,
    digest: &[u8; 32],
) -> Uid {
    let ns_bytes = now_ns.to_be_bytes();
    let entropy: &[u8] = match &client_nonce {
        Some(nonce) => nonce,
        None => &ns_bytes,
    };
    Uid::from_bytes(sha256_parts(&[
        schema_uid.as_bytes(),
        attester.as_bytes(),
        entropy,
        digest,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use aegis_crypto::aead::SealedEnvelope;
    use aegis_crypto::{open, unwrap_key, WalletSigner};
    use aegis_store::{SledAnchorLog, SledBlobStore};
    use k256::SecretKey;

    const NOW: Timestamp = 1_700_000_000;
    const NOW_NS: i64 = 1_700_000_000_000_000_000;
    const MAX_PLAINTEXT: usize = 1024 * 1024;

    struct Fixture {
        engine: AttestationEngine,
        db: Arc<StateDb>,
        blobs: Arc<SledBlobStore>,
        schema_uid: SchemaUid,
        fixed_schema_uid: SchemaUid,
        _dir: tempfile::TempDir,
    }

    struct Recipient {
        secret: SecretKey,
        public: Vec<u8>,
        wallet: WalletSigner,
    }

    impl Recipient {
        fn generate() -> Self {
            let secret = SecretKey::random(&mut rand::rngs::OsRng);
            let public = secret.public_key().to_sec1_bytes().to_vec();
            Self { secret, public, wallet: WalletSigner::generate() }
        }

        fn address(&self) -> Address {
            self.wallet.address()
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let blobs = Arc::new(SledBlobStore::new(Arc::clone(&db), MAX_PLAINTEXT + 28));
        let anchors = Arc::new(SledAnchorLog::new(Arc::clone(&db)));

        let registry = SchemaRegistry::new(Arc::clone(&db));
        let creator = WalletSigner::generate();
        let register = |text: &str, revocable: bool| {
            let uid = SchemaRegistry::derive_uid(text, None, revocable);
            let sig = creator.sign_message(&SchemaRegistry::register_message(&uid));
            registry.register(text.into(), None, revocable, creator.address(), &sig, NOW).unwrap().uid
        };
        let schema_uid = register("string claim", true);
        let fixed_schema_uid = register("string permanentClaim", false);

        let engine = AttestationEngine::new(
            Arc::clone(&db),
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            anchors,
            50,
            MAX_PLAINTEXT,
        );
        Fixture { engine, db, blobs, schema_uid, fixed_schema_uid, _dir: dir }
    }

    fn create_request(
        f: &Fixture,
        attester: &WalletSigner,
        plaintext: &[u8],
        recipients: &[&Recipient],
    ) -> CreateAttestation {
        let recipient_keys: Vec<(Address, Vec<u8>)> =
            recipients.iter().map(|r| (r.address(), r.public.clone())).collect();
        let addresses: Vec<Address> = recipient_keys.iter().map(|(a, _)| *a).collect();
        let message =
            create_attestation_message(&f.schema_uid, &sha256(plaintext), &addresses);
        CreateAttestation {
            schema_uid: f.schema_uid,
            plaintext: plaintext.to_vec(),
            recipients: recipient_keys,
            revocable: true,
            expiration_time: None,
            client_nonce: None,
            attester: attester.address(),
            signature: attester.sign_message(&message),
        }
    }

    fn retrieve_sig(wallet: &WalletSigner, uid: &Uid) -> Vec<u8> {
        wallet.sign_message(&retrieve_attestation_message(uid))
    }

    async fn create_simple(
        f: &Fixture,
        attester: &WalletSigner,
        plaintext: &[u8],
        recipients: &[&Recipient],
    ) -> Created {
        f.engine
            .create(create_request(f, attester, plaintext, recipients), NOW, NOW_NS)
            .await
            .unwrap()
    }

    // ── Round trip & access control ──────────────────────────────────────────

    #[tokio::test]
    async fn create_then_retrieve_decrypts_for_each_recipient() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let bob = Recipient::generate();
        let plaintext = br#"{"hello":"world"}"#;

        let created = create_simple(&f, &attester, plaintext, &[&alice, &bob]).await;

        for recipient in [&alice, &bob] {
            let retrieved = f
                .engine
                .retrieve(&created.uid, &recipient.address(), &retrieve_sig(&recipient.wallet, &created.uid), NOW)
                .await
                .unwrap();

            let key = unwrap_key(&retrieved.wrapped_key.unwrap(), &recipient.secret).unwrap();
            let envelope = SealedEnvelope::from_bytes(&retrieved.envelope).unwrap();
            assert_eq!(open(&envelope, &key).unwrap(), plaintext);
        }
    }

    #[tokio::test]
    async fn round_trip_across_payload_sizes() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        for size in [0usize, 1, 64, MAX_PLAINTEXT - 1] {
            let plaintext = vec![0xa5u8; size];
            let created = create_simple(&f, &attester, &plaintext, &[&alice]).await;
            let retrieved = f
                .engine
                .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW)
                .await
                .unwrap();
            let key = unwrap_key(&retrieved.wrapped_key.unwrap(), &alice.secret).unwrap();
            let envelope = SealedEnvelope::from_bytes(&retrieved.envelope).unwrap();
            assert_eq!(open(&envelope, &key).unwrap(), plaintext);
        }
    }

    #[tokio::test]
    async fn outsider_with_valid_signature_is_not_authorized() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let carol = Recipient::generate();

        let created = create_simple(&f, &attester, b"secret", &[&alice]).await;
        let err = f
            .engine
            .retrieve(&created.uid, &carol.address(), &retrieve_sig(&carol.wallet, &created.uid), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::NotAuthorized));
    }

    #[tokio::test]
    async fn attester_may_fetch_envelope_without_key_slot() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let created = create_simple(&f, &attester, b"secret", &[&alice]).await;
        let retrieved = f
            .engine
            .retrieve(&created.uid, &attester.address(), &retrieve_sig(&attester, &created.uid), NOW)
            .await
            .unwrap();
        assert!(retrieved.wrapped_key.is_none());
    }

    #[tokio::test]
    async fn forged_retrieve_signature_is_rejected() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let created = create_simple(&f, &attester, b"secret", &[&alice]).await;

        // Carol signs but claims to be Alice.
        let carol = WalletSigner::generate();
        let err = f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&carol, &created.uid), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::BadSignature));
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn revoked_attestation_is_unavailable_to_recipients() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let created = create_simple(&f, &attester, b"secret", &[&alice]).await;

        let revoke_sig = attester.sign_message(&revoke_attestation_message(&created.uid));
        f.engine.revoke(&created.uid, &attester.address(), &revoke_sig, NOW + 5).await.unwrap();
        // Idempotent.
        f.engine.revoke(&created.uid, &attester.address(), &revoke_sig, NOW + 6).await.unwrap();

        let err = f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW + 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::Revoked));
    }

    #[tokio::test]
    async fn expired_attestation_is_unavailable() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let mut req = create_request(&f, &attester, b"fleeting", &[&alice]);
        req.expiration_time = Some(NOW + 100);
        let created = f.engine.create(req, NOW, NOW_NS).await.unwrap();

        // Inside the window.
        assert!(f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW + 50)
            .await
            .is_ok());
        // Past it.
        let err = f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW + 101)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::Expired));
    }

    #[tokio::test]
    async fn integrity_violation_when_blob_is_tampered() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let created = create_simple(&f, &attester, b"secret", &[&alice]).await;

        // Corrupt the stored blob behind the engine's back.
        let mut bytes = f.db.get_blob(&created.blob_id).unwrap().unwrap();
        bytes[20] ^= 0x01;
        f.db.put_blob(&created.blob_id, &bytes).unwrap();

        let err = f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::IntegrityViolation));
    }

    // ── Preconditions ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn oversized_plaintext_leaves_no_state() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let req = create_request(&f, &attester, &vec![0u8; MAX_PLAINTEXT + 1], &[&alice]);
        let err = f.engine.create(req, NOW, NOW_NS).await.unwrap_err();
        assert!(matches!(err, AegisError::PayloadTooLarge { .. }));
        assert!(f.db.iter_blob_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_forbids_revocable() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let mut req = create_request(&f, &attester, b"x", &[&alice]);
        req.schema_uid = f.fixed_schema_uid;
        // Re-sign for the changed schema.
        let message = create_attestation_message(
            &req.schema_uid,
            &sha256(&req.plaintext),
            &[alice.address()],
        );
        req.signature = attester.sign_message(&message);
        let err = f.engine.create(req, NOW, NOW_NS).await.unwrap_err();
        assert!(matches!(err, AegisError::SchemaForbidsRevocable));
    }

    #[tokio::test]
    async fn unknown_schema_is_not_found() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let mut req = create_request(&f, &attester, b"x", &[&alice]);
        req.schema_uid = SchemaUid::from_bytes([0xcd; 32]);
        assert!(matches!(
            f.engine.create(req, NOW, NOW_NS).await,
            Err(AegisError::SchemaNotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_recipients_rejected() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();
        let req = create_request(&f, &attester, b"x", &[&alice, &alice]);
        assert!(matches!(
            f.engine.create(req, NOW, NOW_NS).await,
            Err(AegisError::DuplicateRecipient)
        ));
    }

    #[tokio::test]
    async fn invalid_recipient_key_aborts_with_wrap_failed() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let mut req = create_request(&f, &attester, b"x", &[&alice]);
        req.recipients[0].1 = vec![0u8; 33]; // not a curve point
        let err = f.engine.create(req, NOW, NOW_NS).await.unwrap_err();
        assert!(matches!(err, AegisError::WrapFailed { recipient_index: 0, .. }));
        // No partial state: nothing was published or anchored.
        assert!(f.db.iter_blob_ids().unwrap().is_empty());
    }

    // ── Idempotence ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn client_nonce_makes_submit_retries_uid_stable() {
        // Sealing is randomized, so strong idempotence holds for a retried
        // submit of the identical envelope under the same client nonce.
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let key = aegis_crypto::generate_symmetric_key();
        let envelope = seal(b"retry me", &key).unwrap().to_bytes();
        let wrapped = wrap_key(&key, &alice.public).unwrap();
        let digest = sha256(&envelope);
        let blob_id = f.blobs.put(&envelope).await.unwrap();

        let message = create_attestation_message(&f.schema_uid, &digest, &[alice.address()]);
        let req = SubmitAttestation {
            schema_uid: f.schema_uid,
            blob_id,
            ciphertext_digest: digest,
            recipients: vec![RecipientKey { address: alice.address(), wrapped_key: wrapped }],
            revocable: true,
            expiration_time: None,
            client_nonce: Some([0x11; 32]),
            attester: attester.address(),
            signature: attester.sign_message(&message),
        };

        let first = f.engine.submit(req.clone(), NOW).await.unwrap();
        let second = f.engine.submit(req, NOW + 7).await.unwrap();
        assert_eq!(first.uid, second.uid);
        // The retried append did not produce a second record.
        assert_eq!(f.engine.list_by_attester(&attester.address()).await.unwrap().len(), 1);
    }

    // ── Anchor atomicity ─────────────────────────────────────────────────────

    /// An anchor log whose append always fails after the blob is stored.
    struct FailingAnchorLog;

    #[async_trait::async_trait]
    impl AnchorLog for FailingAnchorLog {
        async fn append(&self, _record: EncryptedAttestation) -> Result<Uid, AegisError> {
            Err(AegisError::Transient("log unavailable".into()))
        }
        async fn read(&self, _uid: &Uid) -> Result<Option<EncryptedAttestation>, AegisError> {
            Ok(None)
        }
        async fn enumerate_by_attester(
            &self,
            _attester: &Address,
        ) -> Result<Vec<EncryptedAttestation>, AegisError> {
            Ok(vec![])
        }
        async fn enumerate_by_recipient(
            &self,
            _recipient: &Address,
        ) -> Result<Vec<EncryptedAttestation>, AegisError> {
            Ok(vec![])
        }
        async fn revoke(&self, uid: &Uid, _attester: &Address, _now: i64) -> Result<(), AegisError> {
            Err(AegisError::AttestationNotFound(*uid))
        }
    }

    #[tokio::test]
    async fn failed_append_leaves_an_unreachable_orphan_only() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let failing = AttestationEngine::new(
            Arc::clone(&f.db),
            Arc::clone(&f.blobs) as Arc<dyn BlobStore>,
            Arc::new(FailingAnchorLog),
            50,
            MAX_PLAINTEXT,
        );

        let req = create_request(&f, &attester, b"never anchored", &[&alice]);
        let err = failing.create(req, NOW, NOW_NS).await.unwrap_err();
        assert!(matches!(err, AegisError::Transient(_)));

        // The blob was durably accepted before the append, so an orphan may
        // exist — but nothing surfaces it: no anchor record was written.
        assert!(!f.db.iter_blob_ids().unwrap().is_empty());
        assert!(f
            .engine
            .list_by_attester(&attester.address())
            .await
            .unwrap()
            .is_empty());
    }

    // ── Submit (pre-sealed) ──────────────────────────────────────────────────

    #[tokio::test]
    async fn submit_anchors_client_sealed_envelope() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        // Client-side sealing.
        let key = aegis_crypto::generate_symmetric_key();
        let envelope = seal(b"sealed at the edge", &key).unwrap().to_bytes();
        let wrapped = wrap_key(&key, &alice.public).unwrap();
        let digest = sha256(&envelope);
        let blob_id = f.blobs.put(&envelope).await.unwrap();

        let recipients = vec![RecipientKey { address: alice.address(), wrapped_key: wrapped }];
        let message = create_attestation_message(&f.schema_uid, &digest, &[alice.address()]);
        let created = f
            .engine
            .submit(
                SubmitAttestation {
                    schema_uid: f.schema_uid,
                    blob_id,
                    ciphertext_digest: digest,
                    recipients,
                    revocable: true,
                    expiration_time: None,
                    client_nonce: Some([0x22; 32]),
                    attester: attester.address(),
                    signature: attester.sign_message(&message),
                },
                NOW,
            )
            .await
            .unwrap();

        let retrieved = f
            .engine
            .retrieve(&created.uid, &alice.address(), &retrieve_sig(&alice.wallet, &created.uid), NOW)
            .await
            .unwrap();
        let key = unwrap_key(&retrieved.wrapped_key.unwrap(), &alice.secret).unwrap();
        let envelope = SealedEnvelope::from_bytes(&retrieved.envelope).unwrap();
        assert_eq!(open(&envelope, &key).unwrap(), b"sealed at the edge");
    }

    #[tokio::test]
    async fn submit_rejects_digest_mismatch() {
        let f = fixture();
        let attester = WalletSigner::generate();
        let alice = Recipient::generate();

        let blob_id = f.blobs.put(b"some other bytes").await.unwrap();
        let claimed_digest = [0xee; 32];
        let message = create_attestation_message(&f.schema_uid, &claimed_digest, &[alice.address()]);
        let err = f
            .engine
            .submit(
                SubmitAttestation {
                    schema_uid: f.schema_uid,
                    blob_id,
                    ciphertext_digest: claimed_digest,
                    recipients: vec![RecipientKey {
                        address: alice.address(),
                        wrapped_key: vec![0; 93],
                    }],
                    revocable: true,
                    expiration_time: None,
                    client_nonce: None,
                    attester: attester.address(),
                    signature: attester.sign_message(&message),
                },
                NOW,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AegisError::BadRequest(_)));
    }
}
