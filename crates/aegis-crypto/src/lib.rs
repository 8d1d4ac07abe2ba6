pub mod aead;
pub mod ecies;
pub mod hash;
pub mod signature;

pub use aead::{generate_symmetric_key, open, seal, SealedEnvelope};
pub use ecies::{unwrap_key, wrap_key};
pub use hash::{device_id_from_pubkey, digests_equal, sha256, sha256_parts};
pub use signature::{
    create_attestation_message, personal_message_hash, recover_address,
    retrieve_attestation_message, revoke_attestation_message, verify_signer, WalletSigner,
};
