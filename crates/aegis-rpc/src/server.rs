use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use aegis_attest::{AttestationEngine, CreateAttestation, SchemaRegistry, SubmitAttestation};
use aegis_auth::SessionAuth;
use aegis_core::attestation::RecipientKey;
use aegis_core::challenge::TokenPayload;
use aegis_core::config::Config;
use aegis_core::device::HeartbeatMetrics;
use aegis_core::error::AegisError;
use aegis_core::types::{Address, BlobId, DeviceId, SchemaUid, TeeType, Timestamp, Uid};
use aegis_registry::{AccountDirectory, DeviceRegistry, RegisterDevice};
use aegis_tee::TeeVerifier;

use crate::api::AegisApiServer;
use crate::limit::RateLimiter;
use crate::retry::with_retry;
use crate::types::{
    RpcAccountStats, RpcAttestationMeta, RpcChallenge, RpcCreateAttestation, RpcCreated,
    RpcDevice, RpcDeviceScore, RpcHeartbeat, RpcHumanityScore, RpcLoginChallenge, RpcProfile,
    RpcProfileUpdate, RpcRecordActivity, RpcRegisterDevice, RpcRegisterSchema, RpcRetrieved,
    RpcSchema, RpcSession, RpcSubmitAttestation, RpcVersionInfo,
};

/// Shared state passed to the RPC server. This layer is the policy facade:
/// it authenticates, rate-limits, validates shapes, and normalizes errors —
/// it performs no cryptography itself.
pub struct RpcServerState {
    pub config: Config,
    pub auth: SessionAuth,
    pub schemas: SchemaRegistry,
    pub engine: AttestationEngine,
    pub registry: DeviceRegistry,
    pub directory: AccountDirectory,
    pub verifier: Arc<TeeVerifier>,
    pub limiter: RateLimiter,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

// ── Error normalization ───────────────────────────────────────────────────────

/// Map an engine error to the normalized wire error: code = HTTP status of
/// the kind, `data = {error, correlation_id}`.
fn rpc_err(e: &AegisError, correlation_id: &str) -> ErrorObject<'static> {
    let kind = e.kind();
    if matches!(
        kind,
        aegis_core::error::ErrorKind::BadSignature
            | aegis_core::error::ErrorKind::DecryptError
            | aegis_core::error::ErrorKind::WrapFailed
            | aegis_core::error::ErrorKind::IntegrityViolation
    ) {
        warn!(correlation_id, error = %e, "request failed in the crypto layer");
    }
    ErrorObject::owned(
        i32::from(kind.http_status()),
        e.to_string(),
        Some(serde_json::json!({
            "error": kind.as_str(),
            "correlation_id": correlation_id,
        })),
    )
}

fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_ts() -> Timestamp {
    chrono::Utc::now().timestamp()
}

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

fn parse_hex(field: &str, value: &str) -> Result<Vec<u8>, AegisError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| AegisError::BadRequest(format!("invalid {field} hex: {e}")))
}

fn parse_b64(field: &str, value: &str) -> Result<Vec<u8>, AegisError> {
    BASE64
        .decode(value)
        .map_err(|e| AegisError::BadRequest(format!("invalid {field} base64: {e}")))
}

fn parse_nonce16(value: &str) -> Result<[u8; 16], AegisError> {
    let bytes = parse_hex("nonce", value)?;
    bytes
        .try_into()
        .map_err(|_| AegisError::BadRequest("nonce must be 16 bytes".into()))
}

fn parse_digest32(field: &str, value: &str) -> Result<[u8; 32], AegisError> {
    let bytes = parse_hex(field, value)?;
    bytes
        .try_into()
        .map_err(|_| AegisError::BadRequest(format!("{field} must be 32 bytes")))
}

// ── RPC implementation ────────────────────────────────────────────────────────

impl RpcServer {
    fn limit(&self, subject: &str, cid: &str) -> Result<(), ErrorObject<'static>> {
        self.state.limiter.check(subject).map_err(|e| rpc_err(&e, cid))
    }

    fn authed(&self, token: &str, cid: &str) -> Result<TokenPayload, ErrorObject<'static>> {
        self.state
            .auth
            .authorize(token, now_ts())
            .map_err(|e| rpc_err(&e, cid))
    }

    fn authority_session(&self, token: &str, cid: &str) -> Result<TokenPayload, ErrorObject<'static>> {
        let session = self.authed(token, cid)?;
        if !self.state.registry.is_authority(&session.subject) {
            return Err(rpc_err(&AegisError::NotAuthorized, cid));
        }
        Ok(session)
    }
}

#[async_trait]
impl AegisApiServer for RpcServer {
    // ── Session authentication ────────────────────────────────────────────────

    async fn auth_challenge(&self, address: String) -> RpcResult<RpcLoginChallenge> {
        let cid = correlation_id();
        let address = Address::from_hex(&address).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(&address.to_hex(), &cid)?;

        let challenge = self
            .state
            .auth
            .issue_login_challenge(&address, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;

        Ok(RpcLoginChallenge {
            challenge: challenge.message,
            nonce: hex::encode(challenge.nonce),
            expires_at: challenge.expires_at,
        })
    }

    async fn auth_verify(
        &self,
        address: String,
        nonce: String,
        signature: String,
    ) -> RpcResult<RpcSession> {
        let cid = correlation_id();
        let address = Address::from_hex(&address).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(&address.to_hex(), &cid)?;
        let nonce = parse_nonce16(&nonce).map_err(|e| rpc_err(&e, &cid))?;
        let signature = parse_hex("signature", &signature).map_err(|e| rpc_err(&e, &cid))?;

        let session = self
            .state
            .auth
            .verify_login(&address, &nonce, &signature, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, address = %address, "login verified");
        Ok(RpcSession { ok: true, token: session.token, expires_at: session.expires_at })
    }

    // ── Schemas ───────────────────────────────────────────────────────────────

    async fn register_schema(&self, req: RpcRegisterSchema) -> RpcResult<RpcSchema> {
        let cid = correlation_id();
        let creator = Address::from_hex(&req.creator).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(&creator.to_hex(), &cid)?;
        let resolver = req
            .resolver
            .as_deref()
            .map(Address::from_hex)
            .transpose()
            .map_err(|e| rpc_err(&e, &cid))?;
        let signature = parse_hex("signature", &req.signature).map_err(|e| rpc_err(&e, &cid))?;

        let schema = self
            .state
            .schemas
            .register(req.schema_text, resolver, req.revocable, creator, &signature, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, uid = %schema.uid, "schema registered");
        Ok(schema.into())
    }

    async fn get_schema(&self, uid: String) -> RpcResult<Option<RpcSchema>> {
        let cid = correlation_id();
        let uid = SchemaUid::from_hex(&uid).map_err(|e| rpc_err(&e, &cid))?;
        match self.state.schemas.get(&uid) {
            Ok(schema) => Ok(Some(schema.into())),
            Err(AegisError::SchemaNotFound(_)) => Ok(None),
            Err(e) => Err(rpc_err(&e, &cid)),
        }
    }

    // ── Encrypted attestations ────────────────────────────────────────────────

    async fn create_attestation(
        &self,
        token: String,
        req: RpcCreateAttestation,
    ) -> RpcResult<RpcCreated> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let attester = Address::from_hex(&req.attester).map_err(|e| rpc_err(&e, &cid))?;
        if attester != session.subject {
            return Err(rpc_err(&AegisError::NotAuthorized, &cid));
        }

        let schema_uid = SchemaUid::from_hex(&req.schema_uid).map_err(|e| rpc_err(&e, &cid))?;
        let plaintext = parse_b64("plaintext", &req.plaintext).map_err(|e| rpc_err(&e, &cid))?;
        // Reject oversized payloads before any store traffic.
        if plaintext.len() > self.state.config.max_plaintext_size() {
            return Err(rpc_err(
                &AegisError::PayloadTooLarge {
                    max: self.state.config.max_plaintext_size(),
                    got: plaintext.len(),
                },
                &cid,
            ));
        }

        let mut recipients = Vec::with_capacity(req.recipients.len());
        for r in &req.recipients {
            let address = Address::from_hex(&r.address).map_err(|e| rpc_err(&e, &cid))?;
            let public_key = parse_hex("recipient public_key", &r.public_key)
                .map_err(|e| rpc_err(&e, &cid))?;
            recipients.push((address, public_key));
        }

        let client_nonce = req
            .client_nonce
            .as_deref()
            .map(|n| parse_digest32("client_nonce", n))
            .transpose()
            .map_err(|e| rpc_err(&e, &cid))?;
        let signature = parse_hex("signature", &req.signature).map_err(|e| rpc_err(&e, &cid))?;

        let request = CreateAttestation {
            schema_uid,
            plaintext,
            recipients,
            revocable: req.revocable,
            expiration_time: req.expiration_time,
            client_nonce,
            attester,
            signature,
        };

        let deadline = self.state.config.blob_op_timeout + self.state.config.anchor_op_timeout;
        let created = tokio::time::timeout(deadline, self.state.engine.create(request, now_ts(), now_ns()))
            .await
            .map_err(|_| rpc_err(&AegisError::Timeout("create attestation".into()), &cid))?
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, uid = %created.uid, "attestation created");
        Ok(RpcCreated { uid: created.uid.to_hex(), blob_id: created.blob_id.to_hex() })
    }

    async fn submit_attestation(
        &self,
        token: String,
        req: RpcSubmitAttestation,
    ) -> RpcResult<RpcCreated> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let attester = Address::from_hex(&req.attester).map_err(|e| rpc_err(&e, &cid))?;
        if attester != session.subject {
            return Err(rpc_err(&AegisError::NotAuthorized, &cid));
        }

        let schema_uid = SchemaUid::from_hex(&req.schema_uid).map_err(|e| rpc_err(&e, &cid))?;
        let blob_id = BlobId::from_hex(&req.blob_id).map_err(|e| rpc_err(&e, &cid))?;
        let ciphertext_digest = parse_digest32("ciphertext_digest", &req.ciphertext_digest)
            .map_err(|e| rpc_err(&e, &cid))?;

        let mut recipients = Vec::with_capacity(req.recipients.len());
        for r in &req.recipients {
            let address = Address::from_hex(&r.address).map_err(|e| rpc_err(&e, &cid))?;
            let wrapped_key =
                parse_hex("wrapped_key", &r.wrapped_key).map_err(|e| rpc_err(&e, &cid))?;
            recipients.push(RecipientKey { address, wrapped_key });
        }

        let client_nonce = req
            .client_nonce
            .as_deref()
            .map(|n| parse_digest32("client_nonce", n))
            .transpose()
            .map_err(|e| rpc_err(&e, &cid))?;
        let signature = parse_hex("signature", &req.signature).map_err(|e| rpc_err(&e, &cid))?;

        let request = SubmitAttestation {
            schema_uid,
            blob_id,
            ciphertext_digest,
            recipients,
            revocable: req.revocable,
            expiration_time: req.expiration_time,
            client_nonce,
            attester,
            signature,
        };

        let deadline = self.state.config.blob_op_timeout + self.state.config.anchor_op_timeout;
        let created = tokio::time::timeout(deadline, self.state.engine.submit(request, now_ts()))
            .await
            .map_err(|_| rpc_err(&AegisError::Timeout("submit attestation".into()), &cid))?
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, uid = %created.uid, "pre-sealed attestation anchored");
        Ok(RpcCreated { uid: created.uid.to_hex(), blob_id: created.blob_id.to_hex() })
    }

    async fn get_attestation(&self, uid: String) -> RpcResult<Option<RpcAttestationMeta>> {
        let cid = correlation_id();
        let uid = Uid::from_hex(&uid).map_err(|e| rpc_err(&e, &cid))?;
        let deadline = self.state.config.anchor_op_timeout;
        let result = with_retry("read anchor", deadline, || self.state.engine.get_record(&uid)).await;
        match result {
            Ok(record) => Ok(Some(record.into())),
            Err(AegisError::AttestationNotFound(_)) => Ok(None),
            Err(e) => Err(rpc_err(&e, &cid)),
        }
    }

    async fn retrieve_attestation(
        &self,
        uid: String,
        requester: String,
        signature: String,
    ) -> RpcResult<RpcRetrieved> {
        let cid = correlation_id();
        let uid = Uid::from_hex(&uid).map_err(|e| rpc_err(&e, &cid))?;
        let requester = Address::from_hex(&requester).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(&requester.to_hex(), &cid)?;
        let signature = parse_hex("signature", &signature).map_err(|e| rpc_err(&e, &cid))?;

        let deadline = self.state.config.blob_op_timeout + self.state.config.anchor_op_timeout;
        let retrieved = with_retry("retrieve attestation", deadline, || {
            self.state.engine.retrieve(&uid, &requester, &signature, now_ts())
        })
        .await
        .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, uid = %uid, requester = %requester, "attestation retrieved");
        Ok(RpcRetrieved {
            blob_id: retrieved.blob_id.to_hex(),
            envelope: BASE64.encode(retrieved.envelope),
            wrapped_key: retrieved.wrapped_key.map(hex::encode),
        })
    }

    async fn revoke_attestation(
        &self,
        uid: String,
        attester: String,
        signature: String,
    ) -> RpcResult<bool> {
        let cid = correlation_id();
        let uid = Uid::from_hex(&uid).map_err(|e| rpc_err(&e, &cid))?;
        let attester = Address::from_hex(&attester).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(&attester.to_hex(), &cid)?;
        let signature = parse_hex("signature", &signature).map_err(|e| rpc_err(&e, &cid))?;

        let deadline = self.state.config.anchor_op_timeout;
        tokio::time::timeout(deadline, self.state.engine.revoke(&uid, &attester, &signature, now_ts()))
            .await
            .map_err(|_| rpc_err(&AegisError::Timeout("revoke attestation".into()), &cid))?
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, uid = %uid, "attestation revoked");
        Ok(true)
    }

    async fn list_attestations(
        &self,
        address: String,
        role: String,
    ) -> RpcResult<Vec<RpcAttestationMeta>> {
        let cid = correlation_id();
        let address = Address::from_hex(&address).map_err(|e| rpc_err(&e, &cid))?;

        let deadline = self.state.config.anchor_op_timeout;
        let records = match role.as_str() {
            "attester" => {
                with_retry("enumerate by attester", deadline, || {
                    self.state.engine.list_by_attester(&address)
                })
                .await
            }
            "recipient" => {
                with_retry("enumerate by recipient", deadline, || {
                    self.state.engine.list_by_recipient(&address)
                })
                .await
            }
            other => Err(AegisError::BadRequest(format!(
                "role must be \"attester\" or \"recipient\", got {other:?}"
            ))),
        }
        .map_err(|e| rpc_err(&e, &cid))?;

        let mut metas: Vec<RpcAttestationMeta> = records.into_iter().map(Into::into).collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(metas)
    }

    // ── Devices ───────────────────────────────────────────────────────────────

    async fn tee_challenge(&self, device_id: String) -> RpcResult<RpcChallenge> {
        let cid = correlation_id();
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;
        self.limit(device_id.as_str(), &cid)?;

        let challenge = self
            .state
            .verifier
            .issue_challenge(&device_id, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;
        Ok(RpcChallenge { nonce: hex::encode(challenge.nonce), expires_at: challenge.expires_at })
    }

    async fn register_device(
        &self,
        token: String,
        req: RpcRegisterDevice,
    ) -> RpcResult<RpcDevice> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let tee_type = TeeType::parse(&req.tee_type).map_err(|e| rpc_err(&e, &cid))?;
        let public_key = parse_hex("public_key", &req.public_key).map_err(|e| rpc_err(&e, &cid))?;
        let nonce = parse_nonce16(&req.nonce).map_err(|e| rpc_err(&e, &cid))?;
        let quote = parse_b64("quote", &req.quote).map_err(|e| rpc_err(&e, &cid))?;

        let device = self
            .state
            .registry
            .register(
                RegisterDevice {
                    owner: session.subject,
                    public_key,
                    tee_type,
                    manufacturer: req.manufacturer,
                    model: req.model,
                    nonce,
                    quote,
                },
                now_ts(),
            )
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, device_id = %device.device_id, "device registered");
        Ok(device.into())
    }

    async fn device_heartbeat(
        &self,
        token: String,
        device_id: String,
        req: RpcHeartbeat,
    ) -> RpcResult<RpcDevice> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;
        let nonce = parse_nonce16(&req.nonce).map_err(|e| rpc_err(&e, &cid))?;
        let quote = parse_b64("quote", &req.quote).map_err(|e| rpc_err(&e, &cid))?;

        let device = self
            .state
            .registry
            .report_heartbeat(
                &device_id,
                &session.subject,
                nonce,
                &quote,
                HeartbeatMetrics {
                    uptime: req.metrics.uptime,
                    data_congruence: req.metrics.data_congruence,
                    firmware_version: req.metrics.firmware_version,
                },
                now_ts(),
            )
            .map_err(|e| rpc_err(&e, &cid))?;

        Ok(device.into())
    }

    async fn get_device(&self, device_id: String) -> RpcResult<Option<RpcDevice>> {
        let cid = correlation_id();
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;
        match self.state.registry.get(&device_id) {
            Ok(device) => Ok(Some(device.into())),
            Err(AegisError::DeviceNotFound(_)) => Ok(None),
            Err(e) => Err(rpc_err(&e, &cid)),
        }
    }

    async fn list_devices(&self, owner: String) -> RpcResult<Vec<RpcDevice>> {
        let cid = correlation_id();
        let owner = Address::from_hex(&owner).map_err(|e| rpc_err(&e, &cid))?;
        let devices = self.state.registry.list_by_owner(&owner).map_err(|e| rpc_err(&e, &cid))?;
        Ok(devices.into_iter().map(Into::into).collect())
    }

    async fn suspend_device(
        &self,
        token: String,
        device_id: String,
        reason: String,
    ) -> RpcResult<RpcDevice> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;

        let device = self
            .state
            .registry
            .suspend(&device_id, &session.subject, reason, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;
        info!(correlation_id = %cid, device_id = %device_id, "device suspended");
        Ok(device.into())
    }

    async fn unsuspend_device(&self, token: String, device_id: String) -> RpcResult<RpcDevice> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;

        let device = self
            .state
            .registry
            .unsuspend(&device_id, &session.subject, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;
        info!(correlation_id = %cid, device_id = %device_id, "device suspension lifted");
        Ok(device.into())
    }

    async fn link_device_account(&self, token: String, device_id: String) -> RpcResult<bool> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;

        self.state
            .registry
            .link_account(&device_id, &session.subject)
            .map_err(|e| rpc_err(&e, &cid))?;
        Ok(true)
    }

    // ── Scoring ───────────────────────────────────────────────────────────────

    async fn get_device_score(&self, device_id: String) -> RpcResult<RpcDeviceScore> {
        let cid = correlation_id();
        let device_id = DeviceId::parse(&device_id).map_err(|e| rpc_err(&e, &cid))?;
        let breakdown = self
            .state
            .registry
            .score_breakdown(&device_id)
            .map_err(|e| rpc_err(&e, &cid))?;
        Ok(RpcDeviceScore::from_result(device_id.to_string(), breakdown))
    }

    async fn get_humanity_score(&self, address: String) -> RpcResult<RpcHumanityScore> {
        let cid = correlation_id();
        let address = Address::from_hex(&address).map_err(|e| rpc_err(&e, &cid))?;
        let record = self
            .state
            .directory
            .humanity_score(&address, now_ts())
            .map_err(|e| rpc_err(&e, &cid))?;
        Ok(record.into())
    }

    // ── Profiles & observed activity ──────────────────────────────────────────

    async fn update_profile(
        &self,
        token: String,
        update: RpcProfileUpdate,
    ) -> RpcResult<RpcProfile> {
        let cid = correlation_id();
        let session = self.authed(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let profile = self
            .state
            .directory
            .update_profile(
                &session.subject,
                aegis_core::profile::ProfileUpdate {
                    name: update.name,
                    bio: update.bio,
                    avatar_url: update.avatar_url,
                    social_links: update.social_links,
                    handle: update.handle,
                },
                now_ts(),
            )
            .map_err(|e| rpc_err(&e, &cid))?;
        Ok(RpcProfile::from_profile(session.subject.to_hex(), profile))
    }

    async fn get_profile(&self, address: String) -> RpcResult<Option<RpcProfile>> {
        let cid = correlation_id();
        let address = Address::from_hex(&address).map_err(|e| rpc_err(&e, &cid))?;
        let profile = self.state.directory.get_profile(&address).map_err(|e| rpc_err(&e, &cid))?;
        Ok(profile.map(|p| RpcProfile::from_profile(address.to_hex(), p)))
    }

    async fn record_activity(
        &self,
        token: String,
        req: RpcRecordActivity,
    ) -> RpcResult<RpcAccountStats> {
        let cid = correlation_id();
        let session = self.authority_session(&token, &cid)?;
        self.limit(&session.subject.to_hex(), &cid)?;

        let address = Address::from_hex(&req.address).map_err(|e| rpc_err(&e, &cid))?;
        let stats = self
            .state
            .directory
            .record_activity(
                &address,
                req.transactions,
                req.fees_burned_usd,
                req.verified_social_accounts,
                req.first_seen.unwrap_or_else(now_ts),
            )
            .map_err(|e| rpc_err(&e, &cid))?;

        info!(correlation_id = %cid, address = %address, "account activity ingested");
        Ok(RpcAccountStats::from_stats(address.to_hex(), stats))
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: "1".to_string(),
        })
    }
}
