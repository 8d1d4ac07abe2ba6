//! Schema registry.
//!
//! Schema UIDs are content-derived — `SHA-256(schema_text || resolver || revocable)`
//! — so identical definitions collide on registration instead of
//! accumulating duplicates, and a UID can be recomputed client-side before
//! asking the registry.

use std::sync::Arc;

use tracing::info;

use aegis_core::attestation::Schema;
use aegis_core::error::AegisError;
use aegis_core::types::{Address, SchemaUid, Timestamp};
use aegis_crypto::hash::sha256_parts;
use aegis_crypto::signature::verify_signer;
use aegis_store::StateDb;

/// Domain prefix of the schema-registration signing message.
const REGISTER_SCHEMA_DOMAIN: &[u8] = b"register-schema:";

pub struct SchemaRegistry {
    db: Arc<StateDb>,
}

impl SchemaRegistry {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    /// Derive the content UID of a schema definition.
    pub fn derive_uid(schema_text: &str, resolver: Option<&Address>, revocable: bool) -> SchemaUid {
        let resolver_bytes: &[u8] = match resolver {
            Some(a) => a.as_bytes(),
            None => &[],
        };
        SchemaUid::from_bytes(sha256_parts(&[
            schema_text.as_bytes(),
            resolver_bytes,
            &[u8::from(revocable)],
        ]))
    }

    /// The message a creator signs to register a schema:
    /// `"register-schema:" || uid`.
    pub fn register_message(uid: &SchemaUid) -> Vec<u8> {
        let mut msg = Vec::with_capacity(REGISTER_SCHEMA_DOMAIN.len() + 32);
        msg.extend_from_slice(REGISTER_SCHEMA_DOMAIN);
        msg.extend_from_slice(uid.as_bytes());
        msg
    }

    /// Register a schema. Fails with `SchemaAlreadyExists` on a UID
    /// collision; stored schemas are immutable.
    pub fn register(
        &self,
        schema_text: String,
        resolver: Option<Address>,
        revocable: bool,
        creator: Address,
        signature: &[u8],
        now: Timestamp,
    ) -> Result<Schema, AegisError> {
        if schema_text.is_empty() {
            return Err(AegisError::BadRequest("schema_text must not be empty".into()));
        }

        let uid = Self::derive_uid(&schema_text, resolver.as_ref(), revocable);
        verify_signer(&Self::register_message(&uid), signature, &creator)?;

        let schema = Schema {
            uid,
            revocable,
            schema_text,
            resolver,
            creator: Some(creator),
            created_at: now,
        };

        if !self.db.insert_schema_if_absent(&schema)? {
            return Err(AegisError::SchemaAlreadyExists(uid));
        }

        info!(uid = %uid, creator = %creator, "schema registered");
        Ok(schema)
    }

    pub fn get(&self, uid: &SchemaUid) -> Result<Schema, AegisError> {
        self.db.get_schema(uid)?.ok_or(AegisError::SchemaNotFound(*uid))
    }
}
