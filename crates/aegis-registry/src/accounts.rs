//! Account directory: profiles, observed activity stats, and the cached
//! humanity projection.

use std::sync::Arc;

use tracing::info;

use aegis_core::config::Config;
use aegis_core::error::AegisError;
use aegis_core::profile::{
    AccountStats, HumanityComponents, HumanityRecord, Profile, ProfileUpdate,
};
use aegis_core::types::{Address, Timestamp};
use aegis_scoring::{humanity, HumanityFactors, HumanityResult};
use aegis_store::StateDb;

pub struct AccountDirectory {
    db: Arc<StateDb>,
    score_cache_ttl: Timestamp,
}

impl AccountDirectory {
    pub fn new(db: Arc<StateDb>, config: &Config) -> Self {
        Self { db, score_cache_ttl: config.score_cache_ttl.as_secs() as Timestamp }
    }

    // ── Profiles ─────────────────────────────────────────────────────────────

    pub fn get_profile(&self, address: &Address) -> Result<Option<Profile>, AegisError> {
        self.db.get_profile(address)
    }

    /// Apply an explicit field-update struct to the stored profile, creating
    /// an empty profile on first touch.
    pub fn update_profile(
        &self,
        address: &Address,
        update: ProfileUpdate,
        now: Timestamp,
    ) -> Result<Profile, AegisError> {
        let current = self.db.get_profile(address)?.unwrap_or_default();
        let updated = current.apply(update, now);
        self.db.put_profile(address, &updated)?;
        Ok(updated)
    }

    // ── Activity stats ───────────────────────────────────────────────────────

    pub fn get_stats(&self, address: &Address) -> Result<AccountStats, AegisError> {
        Ok(self.db.get_account_stats(address)?.unwrap_or_default())
    }

    /// Fold observed activity into the stored stats. `first_seen` stamps
    /// `registered_at` only when it was never set.
    pub fn record_activity(
        &self,
        address: &Address,
        transactions: u64,
        fees_burned_usd: f64,
        verified_social_accounts: Option<u32>,
        first_seen: Timestamp,
    ) -> Result<AccountStats, AegisError> {
        let mut stats = self.get_stats(address)?;
        stats.transaction_count += transactions;
        stats.total_fees_burned_usd += fees_burned_usd.max(0.0);
        if let Some(social) = verified_social_accounts {
            stats.verified_social_accounts = social;
        }
        if stats.registered_at == 0 {
            stats.registered_at = first_seen;
        }
        self.db.put_account_stats(address, &stats)?;
        // A score cached before this ingest is stale now.
        self.invalidate_humanity(address)?;
        Ok(stats)
    }

    // ── Humanity score ───────────────────────────────────────────────────────

    /// Humanity score for `address`, served from cache within the TTL and
    /// recomputed on demand otherwise.
    pub fn humanity_score(&self, address: &Address, now: Timestamp) -> Result<HumanityRecord, AegisError> {
        if let Some(cached) = self.db.get_humanity_record(address)? {
            if now - cached.last_updated < self.score_cache_ttl {
                return Ok(cached);
            }
        }

        let result = self.compute_humanity(address, now)?;
        let record = HumanityRecord {
            address: *address,
            score: result.score,
            is_verified_human: result.is_verified_human,
            components: HumanityComponents {
                hardware_points: result.hardware_points,
                social_points: result.social_points,
                onchain_points: result.onchain_points,
                fee_points: result.fee_points,
            },
            last_updated: now,
        };
        self.db.put_humanity_record(&record)?;
        info!(address = %address, score = record.score, "humanity score recomputed");
        Ok(record)
    }

    fn compute_humanity(&self, address: &Address, now: Timestamp) -> Result<HumanityResult, AegisError> {
        // Hardware anchor: the best-scoring linked device, diluted by how
        // many accounts share it.
        let mut best_score = 0u32;
        let mut shared_accounts = 1u32;
        for device_id in self.db.devices_linked_to(address)? {
            let Some(device) = self.db.get_device(&device_id)? else {
                continue;
            };
            if device.is_suspended || !device.is_active {
                continue;
            }
            if device.trust_score > best_score {
                best_score = device.trust_score;
                shared_accounts = self.db.linked_accounts(&device_id)?.len().max(1) as u32;
            }
        }
        let stats = self.get_stats(address)?;
        let account_age_months = if stats.registered_at > 0 && now > stats.registered_at {
            ((now - stats.registered_at) / (30 * 86_400)) as u32
        } else {
            0
        };

        Ok(humanity(&HumanityFactors {
            linked_device_score: best_score,
            linked_device_shared_accounts: shared_accounts,
            verified_social_accounts: stats.verified_social_accounts,
            account_age_months,
            transaction_count: stats.transaction_count,
            total_fees_burned_usd: stats.total_fees_burned_usd,
        }))
    }

    fn invalidate_humanity(&self, address: &Address) -> Result<(), AegisError> {
        if let Some(mut cached) = self.db.get_humanity_record(address)? {
            cached.last_updated = 0;
            self.db.put_humanity_record(&cached)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::profile::FieldUpdate;
    use aegis_core::types::TeeType;
    use aegis_crypto::hash::device_id_from_pubkey;
    use aegis_tee::{ChallengeStore, TeeVerifier, TrustedRoots, DEMO_MODE_QUOTE};
    use crate::registry::{DeviceRegistry, RegisterDevice};
    use aegis_core::device::HeartbeatMetrics;

    const NOW: Timestamp = 1_700_000_000;

    struct Fixture {
        directory: AccountDirectory,
        registry: DeviceRegistry,
        verifier: Arc<TeeVerifier>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(StateDb::open(dir.path()).unwrap());
        let config = Config { tee_demo_mode: true, latest_firmware_version: 10, ..Config::default() };
        let challenges = Arc::new(ChallengeStore::new(Arc::clone(&db), config.challenge_ttl));
        let verifier = Arc::new(TeeVerifier::new(
            Arc::clone(&db),
            challenges,
            TrustedRoots::default(),
            &config,
        ));
        Fixture {
            directory: AccountDirectory::new(Arc::clone(&db), &config),
            registry: DeviceRegistry::new(db, Arc::clone(&verifier), &config),
            verifier,
            _dir: dir,
        }
    }

    /// Register a device for `owner` and heartbeat it to a perfect score.
    fn trusted_device(f: &Fixture, owner: Address, key_byte: u8) -> aegis_core::device::Device {
        let public_key = vec![key_byte; 33];
        let device_id = device_id_from_pubkey(&public_key, TeeType::TrustZone);
        let challenge = f.verifier.issue_challenge(&device_id, NOW).unwrap();
        let device = f
            .registry
            .register(
                RegisterDevice {
                    owner,
                    public_key,
                    tee_type: TeeType::TrustZone,
                    manufacturer: "acme".into(),
                    model: None,
                    nonce: challenge.nonce,
                    quote: DEMO_MODE_QUOTE.to_vec(),
                },
                NOW,
            )
            .unwrap();
        let challenge = f.verifier.issue_challenge(&device.device_id, NOW + 1).unwrap();
        f.registry
            .report_heartbeat(
                &device.device_id,
                &owner,
                challenge.nonce,
                DEMO_MODE_QUOTE,
                HeartbeatMetrics { uptime: 1.0, data_congruence: 1.0, firmware_version: 10 },
                NOW + 1,
            )
            .unwrap()
    }

    #[test]
    fn profile_updates_use_field_semantics() {
        let f = fixture();
        let addr = Address::from_bytes([1; 20]);
        let p = f
            .directory
            .update_profile(
                &addr,
                ProfileUpdate { name: FieldUpdate::Set("alice".into()), ..ProfileUpdate::default() },
                NOW,
            )
            .unwrap();
        assert_eq!(p.name.as_deref(), Some("alice"));

        let p = f
            .directory
            .update_profile(
                &addr,
                ProfileUpdate {
                    bio: FieldUpdate::Set("hi".into()),
                    name: FieldUpdate::Keep,
                    ..ProfileUpdate::default()
                },
                NOW + 1,
            )
            .unwrap();
        assert_eq!(p.name.as_deref(), Some("alice"));
        assert_eq!(p.bio.as_deref(), Some("hi"));
    }

    #[test]
    fn humanity_with_exclusive_trusted_device() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        trusted_device(&f, owner, 7);
        f.directory
            .record_activity(&owner, 10, 15.0, Some(3), NOW - 365 * 86_400)
            .unwrap();

        let record = f.directory.humanity_score(&owner, NOW).unwrap();
        assert_eq!(record.components.hardware_points, 40);
        assert_eq!(record.components.social_points, 30);
        assert_eq!(record.components.onchain_points, 20);
        assert_eq!(record.components.fee_points, 10);
        assert_eq!(record.score, 100);
        assert!(record.is_verified_human);
    }

    #[test]
    fn shared_device_dilutes_hardware_anchor() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = trusted_device(&f, owner, 7);

        // Four more accounts share the device: 5 links in total.
        for b in 2..=5u8 {
            f.registry.link_account(&device.device_id, &Address::from_bytes([b; 20])).unwrap();
        }

        let record = f.directory.humanity_score(&owner, NOW + 2).unwrap();
        assert_eq!(record.components.hardware_points, 8); // floor(40 / 5)
        assert!(!record.is_verified_human);
    }

    #[test]
    fn humanity_cache_respects_ttl() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        trusted_device(&f, owner, 7);

        let first = f.directory.humanity_score(&owner, NOW + 2).unwrap();
        assert_eq!(first.components.hardware_points, 40);

        // New link inside the TTL: the cached score is still served.
        let device_id = device_id_from_pubkey(&vec![7u8; 33], TeeType::TrustZone);
        f.registry.link_account(&device_id, &Address::from_bytes([2; 20])).unwrap();
        let cached = f.directory.humanity_score(&owner, NOW + 60).unwrap();
        assert_eq!(cached.components.hardware_points, 40);

        // Past the TTL (10 min) the split shows up.
        let fresh = f.directory.humanity_score(&owner, NOW + 700).unwrap();
        assert_eq!(fresh.components.hardware_points, 20);
    }

    #[test]
    fn activity_ingest_invalidates_cache() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let first = f.directory.humanity_score(&owner, NOW).unwrap();
        assert_eq!(first.score, 0);

        f.directory.record_activity(&owner, 10, 15.0, Some(3), NOW - 200 * 86_400).unwrap();
        let fresh = f.directory.humanity_score(&owner, NOW + 1).unwrap();
        assert_eq!(fresh.components.social_points, 30);
        assert_eq!(fresh.components.onchain_points, 20);
        assert_eq!(fresh.components.fee_points, 10);
    }

    #[test]
    fn suspended_device_loses_its_anchor() {
        let f = fixture();
        let owner = Address::from_bytes([1; 20]);
        let device = trusted_device(&f, owner, 7);
        f.registry.suspend(&device.device_id, &owner, "lost".into(), NOW + 2).unwrap();

        let record = f.directory.humanity_score(&owner, NOW + 700).unwrap();
        assert_eq!(record.components.hardware_points, 0);
    }
}
