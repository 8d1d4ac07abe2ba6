//! The device registry: registration, heartbeats, suspension, enumeration.
//!
//! Device records are write-rare and read-frequent; a single writer lock
//! serializes the read-modify-write paths. No lock is held across I/O to
//! anything but the local store.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use aegis_core::config::Config;
use aegis_core::device::{Device, HeartbeatMetrics, SuspensionEvent};
use aegis_core::error::AegisError;
use aegis_core::types::{Address, DeviceId, TeeType, Timestamp};
use aegis_crypto::hash::device_id_from_pubkey;
use aegis_scoring::{device_trust, DeviceTrustFactors, DeviceTrustResult};
use aegis_store::StateDb;
use aegis_tee::TeeVerifier;

/// A device registration request, already session-authenticated to `owner`.
#[derive(Clone, Debug)]
pub struct RegisterDevice {
    pub owner: Address,
    pub public_key: Vec<u8>,
    pub tee_type: TeeType,
    pub manufacturer: String,
    pub model: Option<String>,
    pub nonce: [u8; 16],
    pub quote: Vec<u8>,
}

pub struct DeviceRegistry {
    db: Arc<StateDb>,
    verifier: Arc<TeeVerifier>,
    latest_firmware_version: u32,
    authorities: Vec<Address>,
    write_lock: Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(db: Arc<StateDb>, verifier: Arc<TeeVerifier>, config: &Config) -> Self {
        let authorities = config
            .authority_addresses
            .iter()
            .filter_map(|s| Address::from_hex(s).ok())
            .collect();
        Self {
            db,
            verifier,
            latest_firmware_version: config.latest_firmware_version,
            authorities,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_authority(&self, address: &Address) -> bool {
        self.authorities.contains(address)
    }

    /// Register a new device after verifying its initial quote.
    pub fn register(&self, msg: RegisterDevice, now: Timestamp) -> Result<Device, AegisError> {
        let device_id = device_id_from_pubkey(&msg.public_key, msg.tee_type);

        if self.db.get_device(&device_id)?.is_some() {
            return Err(AegisError::DeviceAlreadyExists(device_id));
        }

        let verified = self.verifier.verify_quote(
            &device_id,
            msg.tee_type,
            &msg.quote,
            msg.nonce,
            &msg.public_key,
            now,
        )?;

        let device = Device {
            device_id: device_id.clone(),
            tee_type: msg.tee_type,
            hardware_public_key: verified.hardware_public_key,
            owner: msg.owner,
            manufacturer: msg.manufacturer,
            model: msg.model,
            trust_score: 0,
            uptime: 0.0,
            data_congruence: 0.0,
            firmware_version: verified.firmware_version.unwrap_or(self.latest_firmware_version),
            consecutive_low_congruence_days: 0,
            attestation_count: 1,
            last_attest_at: now,
            registered_at: now,
            is_active: true,
            is_suspended: false,
            suspension_reason: None,
            suspension_history: Vec::new(),
        };

        let _guard = self.write_lock.lock().expect("registry lock poisoned");
        if !self.db.insert_device_if_absent(&device)? {
            // Lost a registration race for the same (key, family) pair.
            return Err(AegisError::DeviceAlreadyExists(device_id));
        }
        // The owner is the first usage link; further accounts dilute the
        // hardware anchor via the Sybil split.
        self.db.put_device_link(&device_id, &msg.owner)?;

        info!(device_id = %device_id, owner = %msg.owner, "device_registered");
        Ok(device)
    }

    /// Process a periodic heartbeat: verify the quote, fold in metrics,
    /// recompute the trust score.
    pub fn report_heartbeat(
        &self,
        device_id: &DeviceId,
        session_address: &Address,
        nonce: [u8; 16],
        quote: &[u8],
        metrics: HeartbeatMetrics,
        now: Timestamp,
    ) -> Result<Device, AegisError> {
        let device = self
            .db
            .get_device(device_id)?
            .ok_or_else(|| AegisError::DeviceNotFound(device_id.clone()))?;

        if device.owner != *session_address {
            return Err(AegisError::NotAuthorized);
        }
        if device.is_suspended {
            return Err(AegisError::BadRequest(format!(
                "device {device_id} is suspended"
            )));
        }

        let verify_result = self.verifier.verify_quote(
            device_id,
            device.tee_type,
            quote,
            nonce,
            &device.hardware_public_key,
            now,
        );

        let _guard = self.write_lock.lock().expect("registry lock poisoned");
        // Re-read under the lock; a concurrent heartbeat may have landed.
        let mut device = self
            .db
            .get_device(device_id)?
            .ok_or_else(|| AegisError::DeviceNotFound(device_id.clone()))?;

        if let Err(e) = verify_result {
            // A failed periodic quote is a critical trust fail: zero the
            // score and deactivate until a quote verifies again.
            warn!(device_id = %device_id, error = %e, "heartbeat quote rejected");
            device.trust_score = 0;
            device.is_active = false;
            self.db.put_device(&device)?;
            return Err(e);
        }

        device.uptime = metrics.uptime.clamp(0.0, 1.0);
        device.data_congruence = metrics.data_congruence.clamp(0.0, 1.0);
        device.firmware_version = metrics.firmware_version;
        device.consecutive_low_congruence_days = if device.data_congruence < 0.5 {
            device.consecutive_low_congruence_days + 1
        } else {
            0
        };
        device.attestation_count += 1;
        device.last_attest_at = now;
        device.is_active = true;

        let result = self.score_of(&device);
        device.trust_score = result.score;
        self.db.put_device(&device)?;

        info!(
            device_id = %device_id,
            trust_score = device.trust_score,
            flagged = result.flagged_for_audit,
            "heartbeat applied"
        );
        Ok(device)
    }

    /// Suspend a device. Owner or a configured authority only; every
    /// transition lands in the append-only audit trail.
    pub fn suspend(
        &self,
        device_id: &DeviceId,
        actor: &Address,
        reason: String,
        now: Timestamp,
    ) -> Result<Device, AegisError> {
        self.set_suspension(device_id, actor, Some(reason), now)
    }

    pub fn unsuspend(
        &self,
        device_id: &DeviceId,
        actor: &Address,
        now: Timestamp,
    ) -> Result<Device, AegisError> {
        self.set_suspension(device_id, actor, None, now)
    }

    fn set_suspension(
        &self,
        device_id: &DeviceId,
        actor: &Address,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<Device, AegisError> {
        let _guard = self.write_lock.lock().expect("registry lock poisoned");
        let mut device = self
            .db
            .get_device(device_id)?
            .ok_or_else(|| AegisError::DeviceNotFound(device_id.clone()))?;

        if device.owner != *actor && !self.is_authority(actor) {
            return Err(AegisError::NotAuthorized);
        }

        let suspending = reason.is_some();
        device.is_suspended = suspending;
        device.suspension_reason = reason.clone();
        device.suspension_history.push(SuspensionEvent {
            suspended: suspending,
            actor: *actor,
            reason,
            at: now,
        });
        self.db.put_device(&device)?;

        info!(device_id = %device_id, actor = %actor, suspended = suspending, "device suspension updated");
        Ok(device)
    }

    pub fn get(&self, device_id: &DeviceId) -> Result<Device, AegisError> {
        self.db
            .get_device(device_id)?
            .ok_or_else(|| AegisError::DeviceNotFound(device_id.clone()))
    }

    pub fn list_by_owner(&self, owner: &Address) -> Result<Vec<Device>, AegisError> {
        self.db.iter_devices_by_owner(owner)
    }

    /// Record a usage link between a device and an account. Idempotent.
    pub fn link_account(&self, device_id: &DeviceId, address: &Address) -> Result<(), AegisError> {
        // Ensure the device exists before indexing it.
        self.get(device_id)?;
        self.db.put_device_link(device_id, address)
    }

    /// Current trust-score breakdown for a device, recomputed from its
    /// stored factors.
    pub fn score_breakdown(&self, device_id: &DeviceId) -> Result<DeviceTrustResult, AegisError> {
        let device = self.get(device_id)?;
        Ok(self.score_of(&device))
    }

    fn score_of(&self, device: &Device) -> DeviceTrustResult {
        device_trust(&DeviceTrustFactors {
            tee_valid: device.is_active,
            uptime: device.uptime,
            data_congruence: device.data_congruence,
            firmware_version: device.firmware_version,
            latest_firmware_version: self.latest_firmware_version,
            consecutive_low_congruence_days: device.consecutive_low_congruence_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::challenge::ChallengePurpose;
    use aegis_core::constants::*;
    use aegis_tee::{ChallengeStore, TrustedRoots, DEMO_MODE_QUOTE};

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        registry: DeviceRegistry,
        verifier: Arc<TeeVerifier>,
        db: Arc<StateDb>,
        _dir: tempfile::TempDir,
    }

    /// Registry backed by a demo-mode verifier; quote plumbing is covered in
    /// aegis-tee, here the demo path keeps fixtures small.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let config = Config {
            tee_demo_mode: true,
            latest_firmware_version: 10,
            authority_addresses: vec![Address::from_bytes([0xaa; 20]).to_hex()],
            ..Config::default()
        };
        let challenges = Arc::new(ChallengeStore::new(Arc::clone(&db), config.challenge_ttl));
        let verifier = Arc::new(TeeVerifier::new(
            Arc::clone(&db),
            challenges,
            TrustedRoots::default(),
            &config,
        ));
        Fixture {
            registry: DeviceRegistry::new(Arc::clone(&db), Arc::clone(&verifier), &config),
            verifier,
            db,
            _dir: dir,
        }
    }

    fn register(f: &Fixture, owner: Address, key_byte: u8) -> Device {
        let public_key = vec![key_byte; 33];
        let device_id = device_id_from_pubkey(&public_key, TeeType::TrustZone);
        let challenge = f.verifier.issue_challenge(&device_id, NOW).unwrap();
        f.registry
            .register(
                RegisterDevice {
                    owner,
                    public_key,
                    tee_type: TeeType::TrustZone,
                    manufacturer: "acme".into(),
                    model: Some("m1".into()),
                    nonce: challenge.nonce,
                    quote: DEMO_MODE_QUOTE.to_vec(),
                },
                NOW,
            )
            .unwrap()
    }

    fn heartbeat(
        f: &Fixture,
        device: &Device,
        metrics: HeartbeatMetrics,
        at: Timestamp,
    ) -> Result<Device, AegisError> {
        let challenge = f.verifier.issue_challenge(&device.device_id, at).unwrap();
        f.registry.report_heartbeat(
            &device.device_id,
            &device.owner,
            challenge.nonce,
            DEMO_MODE_QUOTE,
            metrics,
            at,
        )
    }

    #[test]
    fn registration_starts_untrusted_and_indexed() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);

        assert_eq!(device.trust_score, 0);
        assert_eq!(device.attestation_count, 1);
        assert!(device.is_active);
        assert_eq!(f.registry.list_by_owner(&owner).unwrap().len(), 1);
    }

    #[test]
    fn re_registration_is_rejected_not_overwritten() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);

        let other_owner = Address::from_bytes([2; 20]);
        let challenge = f.verifier.issue_challenge(&device.device_id, NOW).unwrap();
        let err = f
            .registry
            .register(
                RegisterDevice {
                    owner: other_owner,
                    public_key: vec![7; 33],
                    tee_type: TeeType::TrustZone,
                    manufacturer: "evil".into(),
                    model: None,
                    nonce: challenge.nonce,
                    quote: DEMO_MODE_QUOTE.to_vec(),
                },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, AegisError::DeviceAlreadyExists(_)));
        assert_eq!(f.registry.get(&device.device_id).unwrap().owner, owner);
    }

    #[test]
    fn heartbeat_updates_metrics_and_score() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);

        let updated = heartbeat(
            &f,
            &device,
            HeartbeatMetrics { uptime: 1.0, data_congruence: 1.0, firmware_version: 10 },
            NOW + 60,
        )
        .unwrap();

        assert_eq!(updated.trust_score, 100);
        assert_eq!(updated.attestation_count, 2);
        assert_eq!(updated.last_attest_at, NOW + 60);
    }

    #[test]
    fn low_congruence_streak_accumulates_and_resets() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let mut device = register(&f, owner, 7);

        for day in 1..=3 {
            device = heartbeat(
                &f,
                &device,
                HeartbeatMetrics { uptime: 1.0, data_congruence: 0.4, firmware_version: 10 },
                NOW + day * 86_400,
            )
            .unwrap();
        }
        assert_eq!(device.consecutive_low_congruence_days, 3);
        assert!(f.registry.score_breakdown(&device.device_id).unwrap().flagged_for_audit);

        device = heartbeat(
            &f,
            &device,
            HeartbeatMetrics { uptime: 1.0, data_congruence: 0.9, firmware_version: 10 },
            NOW + 4 * 86_400,
        )
        .unwrap();
        assert_eq!(device.consecutive_low_congruence_days, 0);
    }

    #[test]
    fn heartbeat_from_non_owner_is_not_authorized() {
        let f = fixture();
        let device = register(&f, Address::from_bytes([1; 20]), 7);
        let challenge = f.verifier.issue_challenge(&device.device_id, NOW).unwrap();
        let err = f
            .registry
            .report_heartbeat(
                &device.device_id,
                &Address::from_bytes([9; 20]),
                challenge.nonce,
                DEMO_MODE_QUOTE,
                HeartbeatMetrics { uptime: 1.0, data_congruence: 1.0, firmware_version: 10 },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, AegisError::NotAuthorized));
    }

    #[test]
    fn suspension_is_owner_or_authority_and_audited() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);
        let authority = Address::from_bytes([0xaa; 20]);
        let stranger = Address::from_bytes([9; 20]);

        assert!(matches!(
            f.registry.suspend(&device.device_id, &stranger, "spam".into(), NOW),
            Err(AegisError::NotAuthorized)
        ));

        let suspended = f
            .registry
            .suspend(&device.device_id, &authority, "metric fraud".into(), NOW + 1)
            .unwrap();
        assert!(suspended.is_suspended);
        assert_eq!(suspended.suspension_reason.as_deref(), Some("metric fraud"));

        let restored = f.registry.unsuspend(&device.device_id, &owner, NOW + 2).unwrap();
        assert!(!restored.is_suspended);
        assert_eq!(restored.suspension_history.len(), 2);
        assert!(restored.suspension_history[0].suspended);
        assert!(!restored.suspension_history[1].suspended);
    }

    #[test]
    fn suspended_device_rejects_heartbeats() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);
        f.registry.suspend(&device.device_id, &owner, "lost".into(), NOW).unwrap();

        let err = heartbeat(
            &f,
            &device,
            HeartbeatMetrics { uptime: 1.0, data_congruence: 1.0, firmware_version: 10 },
            NOW + 60,
        )
        .unwrap_err();
        assert!(matches!(err, AegisError::BadRequest(_)));
    }

    #[test]
    fn firmware_drift_shows_in_breakdown() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = register(&f, owner, 7);
        heartbeat(
            &f,
            &device,
            HeartbeatMetrics { uptime: 1.0, data_congruence: 1.0, firmware_version: 8 },
            NOW + 60,
        )
        .unwrap();

        let breakdown = f.registry.score_breakdown(&device.device_id).unwrap();
        assert_eq!(breakdown.firmware_points, TRUST_FIRMWARE_POINTS - 2 * TRUST_FIRMWARE_PENALTY_PER_VERSION);
        assert_eq!(breakdown.score, 90);
    }

    #[test]
    fn challenge_purpose_is_enforced_for_quotes() {
        // A login challenge cannot satisfy a TEE verification.
        let f = fixture();
        let public_key = vec![7u8; 33];
        let device_id = device_id_from_pubkey(&public_key, TeeType::TrustZone);
        let challenges =
            ChallengeStore::new(Arc::clone(&f.db), std::time::Duration::from_secs(300));
        let login = challenges.issue(device_id.as_str(), ChallengePurpose::Login, NOW).unwrap();
        let err = f
            .registry
            .register(
                RegisterDevice {
                    owner: Address::from_bytes([1; 20]),
                    public_key,
                    tee_type: TeeType::TrustZone,
                    manufacturer: "acme".into(),
                    model: None,
                    nonce: login.nonce,
                    quote: DEMO_MODE_QUOTE.to_vec(),
                },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, AegisError::ChallengeMismatch));
    }
}
