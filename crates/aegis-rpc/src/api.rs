use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcAccountStats, RpcAttestationMeta, RpcChallenge, RpcCreateAttestation, RpcCreated,
    RpcDevice, RpcDeviceScore, RpcHeartbeat, RpcHumanityScore, RpcLoginChallenge, RpcProfile,
    RpcProfileUpdate, RpcRecordActivity, RpcRegisterDevice, RpcRegisterSchema, RpcRetrieved,
    RpcSchema, RpcSession, RpcSubmitAttestation, RpcVersionInfo,
};

/// Aegis JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "aegis_" via `namespace = "aegis"`.
/// Methods that mutate owner-bound state take the session bearer `token` as
/// their first parameter.
#[rpc(server, namespace = "aegis")]
pub trait AegisApi {
    // ── Session authentication ────────────────────────────────────────────────

    /// Issue a login challenge for a wallet address.
    #[method(name = "authChallenge")]
    async fn auth_challenge(&self, address: String) -> RpcResult<RpcLoginChallenge>;

    /// Verify a signed login challenge and mint a bearer token.
    /// `signature` is the hex `r || s || v` wallet signature over the
    /// challenge message.
    #[method(name = "authVerify")]
    async fn auth_verify(
        &self,
        address: String,
        nonce: String,
        signature: String,
    ) -> RpcResult<RpcSession>;

    // ── Schemas ───────────────────────────────────────────────────────────────

    /// Register a schema. The UID is content-derived; duplicates collide.
    #[method(name = "registerSchema")]
    async fn register_schema(&self, req: RpcRegisterSchema) -> RpcResult<RpcSchema>;

    /// Fetch a schema by UID hex.
    #[method(name = "getSchema")]
    async fn get_schema(&self, uid: String) -> RpcResult<Option<RpcSchema>>;

    // ── Encrypted attestations ────────────────────────────────────────────────

    /// Run the full five-step create protocol over a base64 plaintext.
    #[method(name = "createAttestation")]
    async fn create_attestation(
        &self,
        token: String,
        req: RpcCreateAttestation,
    ) -> RpcResult<RpcCreated>;

    /// Anchor an attestation sealed on the client side.
    #[method(name = "submitAttestation")]
    async fn submit_attestation(
        &self,
        token: String,
        req: RpcSubmitAttestation,
    ) -> RpcResult<RpcCreated>;

    /// Anchor metadata by UID hex, wrapped keys excluded.
    #[method(name = "getAttestation")]
    async fn get_attestation(&self, uid: String) -> RpcResult<Option<RpcAttestationMeta>>;

    /// Retrieve the sealed envelope and the requester's wrapped key.
    #[method(name = "retrieveAttestation")]
    async fn retrieve_attestation(
        &self,
        uid: String,
        requester: String,
        signature: String,
    ) -> RpcResult<RpcRetrieved>;

    /// Revoke an attestation. Idempotent for the original attester.
    #[method(name = "revokeAttestation")]
    async fn revoke_attestation(
        &self,
        uid: String,
        attester: String,
        signature: String,
    ) -> RpcResult<bool>;

    /// List anchor metadata where `address` is attester (`role = "attester"`)
    /// or a recipient (`role = "recipient"`).
    #[method(name = "listAttestations")]
    async fn list_attestations(
        &self,
        address: String,
        role: String,
    ) -> RpcResult<Vec<RpcAttestationMeta>>;

    // ── Devices ───────────────────────────────────────────────────────────────

    /// Issue a TEE attestation challenge for a device.
    #[method(name = "teeChallenge")]
    async fn tee_challenge(&self, device_id: String) -> RpcResult<RpcChallenge>;

    /// Register a device after verifying its initial quote.
    #[method(name = "registerDevice")]
    async fn register_device(
        &self,
        token: String,
        req: RpcRegisterDevice,
    ) -> RpcResult<RpcDevice>;

    /// Submit a periodic heartbeat quote plus metrics.
    #[method(name = "deviceHeartbeat")]
    async fn device_heartbeat(
        &self,
        token: String,
        device_id: String,
        req: RpcHeartbeat,
    ) -> RpcResult<RpcDevice>;

    /// Fetch a device record.
    #[method(name = "getDevice")]
    async fn get_device(&self, device_id: String) -> RpcResult<Option<RpcDevice>>;

    /// List devices owned by an address.
    #[method(name = "listDevices")]
    async fn list_devices(&self, owner: String) -> RpcResult<Vec<RpcDevice>>;

    /// Suspend a device (owner or configured authority).
    #[method(name = "suspendDevice")]
    async fn suspend_device(
        &self,
        token: String,
        device_id: String,
        reason: String,
    ) -> RpcResult<RpcDevice>;

    /// Lift a suspension (owner or configured authority).
    #[method(name = "unsuspendDevice")]
    async fn unsuspend_device(&self, token: String, device_id: String) -> RpcResult<RpcDevice>;

    /// Record a usage link between the session account and a device.
    #[method(name = "linkDeviceAccount")]
    async fn link_device_account(&self, token: String, device_id: String) -> RpcResult<bool>;

    // ── Scoring ───────────────────────────────────────────────────────────────

    /// Current Device Trust Score with component breakdown.
    #[method(name = "getDeviceScore")]
    async fn get_device_score(&self, device_id: String) -> RpcResult<RpcDeviceScore>;

    /// Humanity Score with component breakdown (cached with a TTL).
    #[method(name = "getHumanityScore")]
    async fn get_humanity_score(&self, address: String) -> RpcResult<RpcHumanityScore>;

    // ── Profiles & observed activity ──────────────────────────────────────────

    /// Update the session account's profile with explicit set/clear/keep
    /// field semantics.
    #[method(name = "updateProfile")]
    async fn update_profile(
        &self,
        token: String,
        update: RpcProfileUpdate,
    ) -> RpcResult<RpcProfile>;

    /// Fetch a public profile.
    #[method(name = "getProfile")]
    async fn get_profile(&self, address: String) -> RpcResult<Option<RpcProfile>>;

    /// Ingest observed on-chain activity for an address. Authority sessions
    /// only.
    #[method(name = "recordActivity")]
    async fn record_activity(
        &self,
        token: String,
        req: RpcRecordActivity,
    ) -> RpcResult<RpcAccountStats>;

    // ── Meta ──────────────────────────────────────────────────────────────────

    /// Node and API version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;
}
