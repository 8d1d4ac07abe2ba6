//! Content-addressed blob storage.
//!
//! The engine consumes the [`BlobStore`] trait only; the sled-backed
//! implementation here is the single-node default. A remote content store
//! (IPFS, object storage keyed by digest) slots in behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;

use aegis_core::error::AegisError;
use aegis_core::types::BlobId;
use aegis_crypto::hash::sha256;

use crate::db::StateDb;

/// Content-addressed byte store. `put` is idempotent on identical content;
/// `get` returns exactly the bytes previously put.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<BlobId, AegisError>;
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>, AegisError>;
    async fn pin(&self, id: &BlobId) -> Result<(), AegisError>;
    async fn unpin(&self, id: &BlobId) -> Result<(), AegisError>;
}

/// Sled-backed blob store: key = SHA-256 of content.
pub struct SledBlobStore {
    db: Arc<StateDb>,
    max_blob_size: usize,
}

impl SledBlobStore {
    pub fn new(db: Arc<StateDb>, max_blob_size: usize) -> Self {
        Self { db, max_blob_size }
    }
}

#[async_trait]
impl BlobStore for SledBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<BlobId, AegisError> {
        if bytes.len() > self.max_blob_size {
            return Err(AegisError::PayloadTooLarge {
                max: self.max_blob_size,
                got: bytes.len(),
            });
        }
        let id = BlobId::from_bytes(sha256(bytes));
        // Idempotent: identical content lands on the identical key.
        self.db.put_blob(&id, bytes)?;
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>, AegisError> {
        self.db
            .get_blob(id)?
            .ok_or_else(|| AegisError::BlobNotFound(id.to_hex()))
    }

    async fn pin(&self, id: &BlobId) -> Result<(), AegisError> {
        self.db.pin_blob(id)
    }

    async fn unpin(&self, id: &BlobId) -> Result<(), AegisError> {
        self.db.unpin_blob(id)
    }
}
