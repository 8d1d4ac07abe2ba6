use std::path::Path;

use aegis_core::attestation::{EncryptedAttestation, Schema};
use aegis_core::challenge::Challenge;
use aegis_core::device::Device;
use aegis_core::error::AegisError;
use aegis_core::profile::{AccountStats, HumanityRecord, Profile};
use aegis_core::types::{Address, BlobId, DeviceId, SchemaUid, Timestamp, Uid};

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   schemas            — schema uid (32)            → bincode(Schema)
///   attestations       — uid (32)                   → bincode(EncryptedAttestation)
///   attester_index     — attester (20) ‖ uid (32)   → [] (membership set)
///   recipient_index    — recipient (20) ‖ uid (32)  → [] (membership set)
///   devices            — device id utf8 (20)        → bincode(Device)
///   owner_device_index — owner (20) ‖ device id (20)→ [] (membership set)
///   device_links       — device id (20) ‖ addr (20) → [] (usage links)
///   challenges         — nonce (16)                 → bincode(Challenge)
///   replay             — device id (20) ‖ hash (32) → expires_at i64 be bytes
///   profiles           — address (20)               → bincode(Profile)
///   account_stats      — address (20)               → bincode(AccountStats)
///   humanity_cache     — address (20)               → bincode(HumanityRecord)
///   blobs              — digest (32)                → raw envelope bytes
///   blob_pins          — digest (32)                → [] (membership set)
///   meta               — utf8 key bytes             → raw bytes
pub struct StateDb {
    _db: sled::Db,
    schemas: sled::Tree,
    attestations: sled::Tree,
    attester_index: sled::Tree,
    recipient_index: sled::Tree,
    devices: sled::Tree,
    owner_device_index: sled::Tree,
    device_links: sled::Tree,
    challenges: sled::Tree,
    replay: sled::Tree,
    profiles: sled::Tree,
    account_stats: sled::Tree,
    humanity_cache: sled::Tree,
    blobs: sled::Tree,
    blob_pins: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: sled::Error) -> AegisError {
    AegisError::Storage(e.to_string())
}

fn ser_err(e: bincode::Error) -> AegisError {
    AegisError::Serialization(e.to_string())
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AegisError> {
        let db = sled::open(path).map_err(storage_err)?;
        let schemas            = db.open_tree("schemas").map_err(storage_err)?;
        let attestations       = db.open_tree("attestations").map_err(storage_err)?;
        let attester_index     = db.open_tree("attester_index").map_err(storage_err)?;
        let recipient_index    = db.open_tree("recipient_index").map_err(storage_err)?;
        let devices            = db.open_tree("devices").map_err(storage_err)?;
        let owner_device_index = db.open_tree("owner_device_index").map_err(storage_err)?;
        let device_links       = db.open_tree("device_links").map_err(storage_err)?;
        let challenges         = db.open_tree("challenges").map_err(storage_err)?;
        let replay             = db.open_tree("replay").map_err(storage_err)?;
        let profiles           = db.open_tree("profiles").map_err(storage_err)?;
        let account_stats      = db.open_tree("account_stats").map_err(storage_err)?;
        let humanity_cache     = db.open_tree("humanity_cache").map_err(storage_err)?;
        let blobs              = db.open_tree("blobs").map_err(storage_err)?;
        let blob_pins          = db.open_tree("blob_pins").map_err(storage_err)?;
        let meta               = db.open_tree("meta").map_err(storage_err)?;
        Ok(Self {
            _db: db, schemas, attestations, attester_index, recipient_index,
            devices, owner_device_index, device_links, challenges, replay,
            profiles, account_stats, humanity_cache, blobs, blob_pins, meta,
        })
    }

    // ── Schemas ──────────────────────────────────────────────────────────────

    pub fn get_schema(&self, uid: &SchemaUid) -> Result<Option<Schema>, AegisError> {
        match self.schemas.get(uid.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Insert a schema if absent. Returns `false` when the uid already exists
    /// (the stored record is never overwritten).
    pub fn insert_schema_if_absent(&self, schema: &Schema) -> Result<bool, AegisError> {
        let bytes = bincode::serialize(schema).map_err(ser_err)?;
        let prior = self
            .schemas
            .compare_and_swap(schema.uid.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        Ok(prior.is_ok())
    }

    // ── Attestations ─────────────────────────────────────────────────────────

    pub fn get_attestation(&self, uid: &Uid) -> Result<Option<EncryptedAttestation>, AegisError> {
        match self.attestations.get(uid.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Persist an attestation record plus its attester and recipient index
    /// rows. The record row goes last so a partially-indexed record is never
    /// observable through `get_attestation`.
    pub fn put_attestation(&self, record: &EncryptedAttestation) -> Result<(), AegisError> {
        let bytes = bincode::serialize(record).map_err(ser_err)?;
        self.attester_index
            .insert(index_key(&record.attester, &record.uid), b"".as_ref())
            .map_err(storage_err)?;
        for r in &record.recipients {
            self.recipient_index
                .insert(index_key(&r.address, &record.uid), b"".as_ref())
                .map_err(storage_err)?;
        }
        self.attestations
            .insert(record.uid.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn attestation_exists(&self, uid: &Uid) -> bool {
        self.attestations.contains_key(uid.as_bytes()).unwrap_or(false)
    }

    pub fn iter_attestations_by_attester(
        &self,
        attester: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.collect_indexed(&self.attester_index, attester)
    }

    pub fn iter_attestations_by_recipient(
        &self,
        recipient: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError> {
        self.collect_indexed(&self.recipient_index, recipient)
    }

    fn collect_indexed(
        &self,
        index: &sled::Tree,
        address: &Address,
    ) -> Result<Vec<EncryptedAttestation>, AegisError> {
        let mut out = Vec::new();
        for item in index.scan_prefix(address.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            let mut uid = [0u8; 32];
            uid.copy_from_slice(&key[20..52]);
            if let Some(record) = self.get_attestation(&Uid::from_bytes(uid))? {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// All blob ids referenced by any anchored attestation. Used by the
    /// orphan-blob reconciler.
    pub fn referenced_blob_ids(&self) -> Result<std::collections::HashSet<[u8; 32]>, AegisError> {
        let mut out = std::collections::HashSet::new();
        for item in self.attestations.iter() {
            let (_, b) = item.map_err(storage_err)?;
            let record: EncryptedAttestation = bincode::deserialize(&b).map_err(ser_err)?;
            out.insert(*record.blob_id.as_bytes());
        }
        Ok(out)
    }

    // ── Devices ──────────────────────────────────────────────────────────────

    pub fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, AegisError> {
        match self.devices.get(id.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Insert a device if absent. Returns `false` when the id is taken; a
    /// registered device is never overwritten by re-registration.
    pub fn insert_device_if_absent(&self, device: &Device) -> Result<bool, AegisError> {
        let bytes = bincode::serialize(device).map_err(ser_err)?;
        let prior = self
            .devices
            .compare_and_swap(device.device_id.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        if prior.is_ok() {
            self.owner_device_index
                .insert(owner_device_key(&device.owner, &device.device_id), b"".as_ref())
                .map_err(storage_err)?;
        }
        Ok(prior.is_ok())
    }

    pub fn put_device(&self, device: &Device) -> Result<(), AegisError> {
        let bytes = bincode::serialize(device).map_err(ser_err)?;
        self.devices
            .insert(device.device_id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn iter_devices_by_owner(&self, owner: &Address) -> Result<Vec<Device>, AegisError> {
        let mut out = Vec::new();
        for item in self.owner_device_index.scan_prefix(owner.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            let id_str = std::str::from_utf8(&key[20..])
                .map_err(|e| AegisError::Storage(format!("corrupt owner index key: {e}")))?;
            let id = DeviceId::parse(id_str)?;
            if let Some(device) = self.get_device(&id)? {
                out.push(device);
            }
        }
        Ok(out)
    }

    // ── Device-account usage links ───────────────────────────────────────────

    pub fn put_device_link(&self, device_id: &DeviceId, address: &Address) -> Result<(), AegisError> {
        self.device_links
            .insert(device_link_key(device_id, address), b"".as_ref())
            .map_err(storage_err)?;
        Ok(())
    }

    /// Addresses sharing this device through usage links.
    pub fn linked_accounts(&self, device_id: &DeviceId) -> Result<Vec<Address>, AegisError> {
        let mut out = Vec::new();
        for item in self.device_links.scan_prefix(device_id.as_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            let mut addr = [0u8; 20];
            addr.copy_from_slice(&key[DeviceId::LEN..DeviceId::LEN + 20]);
            out.push(Address::from_bytes(addr));
        }
        Ok(out)
    }

    /// Devices linked to an address through usage links. Scans the link tree;
    /// link rows are few (one per device-account pair).
    pub fn devices_linked_to(&self, address: &Address) -> Result<Vec<DeviceId>, AegisError> {
        let mut out = Vec::new();
        for item in self.device_links.iter() {
            let (key, _) = item.map_err(storage_err)?;
            if &key[DeviceId::LEN..DeviceId::LEN + 20] == address.as_bytes() {
                let id_str = std::str::from_utf8(&key[..DeviceId::LEN])
                    .map_err(|e| AegisError::Storage(format!("corrupt link key: {e}")))?;
                out.push(DeviceId::parse(id_str)?);
            }
        }
        Ok(out)
    }

    // ── Challenges ───────────────────────────────────────────────────────────

    pub fn put_challenge(&self, challenge: &Challenge) -> Result<(), AegisError> {
        let bytes = bincode::serialize(challenge).map_err(ser_err)?;
        self.challenges
            .insert(challenge.nonce, bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Atomically remove and return the challenge stored under `nonce`.
    /// sled's `remove` hands the old value to exactly one of two racing
    /// callers, which is what makes consumption linearizable.
    pub fn take_challenge(&self, nonce: &[u8; 16]) -> Result<Option<Challenge>, AegisError> {
        match self.challenges.remove(nonce).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    /// Drop expired challenge rows. Returns the number evicted.
    pub fn sweep_challenges(&self, now: Timestamp) -> Result<usize, AegisError> {
        let mut evicted = 0;
        for item in self.challenges.iter() {
            let (key, b) = item.map_err(storage_err)?;
            let challenge: Challenge = bincode::deserialize(&b).map_err(ser_err)?;
            if challenge.is_expired(now) {
                self.challenges.remove(key).map_err(storage_err)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    // ── Replay marks ─────────────────────────────────────────────────────────

    pub fn put_replay_mark(
        &self,
        device_id: &DeviceId,
        nonce_hash: &[u8; 32],
        expires_at: Timestamp,
    ) -> Result<(), AegisError> {
        self.replay
            .insert(replay_key(device_id, nonce_hash), &expires_at.to_be_bytes()[..])
            .map_err(storage_err)?;
        Ok(())
    }

    /// Whether a still-live replay mark exists for `(device_id, nonce_hash)`.
    pub fn replay_mark_live(
        &self,
        device_id: &DeviceId,
        nonce_hash: &[u8; 32],
        now: Timestamp,
    ) -> Result<bool, AegisError> {
        match self.replay.get(replay_key(device_id, nonce_hash)).map_err(storage_err)? {
            Some(b) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                Ok(Timestamp::from_be_bytes(arr) > now)
            }
            None => Ok(false),
        }
    }

    /// Drop expired replay marks. Returns the number evicted.
    pub fn sweep_replay_marks(&self, now: Timestamp) -> Result<usize, AegisError> {
        let mut evicted = 0;
        for item in self.replay.iter() {
            let (key, b) = item.map_err(storage_err)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&b[..8]);
            if Timestamp::from_be_bytes(arr) <= now {
                self.replay.remove(key).map_err(storage_err)?;
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    // ── Profiles & account stats ─────────────────────────────────────────────

    pub fn get_profile(&self, address: &Address) -> Result<Option<Profile>, AegisError> {
        match self.profiles.get(address.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_profile(&self, address: &Address, profile: &Profile) -> Result<(), AegisError> {
        let bytes = bincode::serialize(profile).map_err(ser_err)?;
        self.profiles.insert(address.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_account_stats(&self, address: &Address) -> Result<Option<AccountStats>, AegisError> {
        match self.account_stats.get(address.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_account_stats(&self, address: &Address, stats: &AccountStats) -> Result<(), AegisError> {
        let bytes = bincode::serialize(stats).map_err(ser_err)?;
        self.account_stats.insert(address.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    // ── Humanity cache ───────────────────────────────────────────────────────

    pub fn get_humanity_record(&self, address: &Address) -> Result<Option<HumanityRecord>, AegisError> {
        match self.humanity_cache.get(address.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(bincode::deserialize(&b).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_humanity_record(&self, record: &HumanityRecord) -> Result<(), AegisError> {
        let bytes = bincode::serialize(record).map_err(ser_err)?;
        self.humanity_cache
            .insert(record.address.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Blobs ────────────────────────────────────────────────────────────────

    pub fn put_blob(&self, id: &BlobId, bytes: &[u8]) -> Result<(), AegisError> {
        self.blobs.insert(id.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, AegisError> {
        Ok(self.blobs.get(id.as_bytes()).map_err(storage_err)?.map(|iv| iv.to_vec()))
    }

    pub fn remove_blob(&self, id: &BlobId) -> Result<(), AegisError> {
        self.blobs.remove(id.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    pub fn pin_blob(&self, id: &BlobId) -> Result<(), AegisError> {
        self.blob_pins.insert(id.as_bytes(), b"".as_ref()).map_err(storage_err)?;
        Ok(())
    }

    pub fn unpin_blob(&self, id: &BlobId) -> Result<(), AegisError> {
        self.blob_pins.remove(id.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    pub fn blob_pinned(&self, id: &BlobId) -> bool {
        self.blob_pins.contains_key(id.as_bytes()).unwrap_or(false)
    }

    pub fn iter_blob_ids(&self) -> Result<Vec<BlobId>, AegisError> {
        let mut out = Vec::new();
        for item in self.blobs.iter() {
            let (key, _) = item.map_err(storage_err)?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&key[..32]);
            out.push(BlobId::from_bytes(arr));
        }
        Ok(out)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), AegisError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, AegisError> {
        Ok(self.meta.get(key.as_bytes()).map_err(storage_err)?.map(|iv| iv.to_vec()))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), AegisError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}

// ── Composite keys ────────────────────────────────────────────────────────────

fn index_key(address: &Address, uid: &Uid) -> Vec<u8> {
    let mut key = Vec::with_capacity(52);
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(uid.as_bytes());
    key
}

fn owner_device_key(owner: &Address, device_id: &DeviceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(20 + DeviceId::LEN);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(device_id.as_bytes());
    key
}

fn device_link_key(device_id: &DeviceId, address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(DeviceId::LEN + 20);
    key.extend_from_slice(device_id.as_bytes());
    key.extend_from_slice(address.as_bytes());
    key
}

fn replay_key(device_id: &DeviceId, nonce_hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(DeviceId::LEN + 32);
    key.extend_from_slice(device_id.as_bytes());
    key.extend_from_slice(nonce_hash);
    key
}
