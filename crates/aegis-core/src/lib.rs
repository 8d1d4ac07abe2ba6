pub mod attestation;
pub mod challenge;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod profile;
pub mod types;

pub use attestation::{EncryptedAttestation, RecipientKey, Schema};
pub use challenge::{Challenge, ChallengePurpose, TokenPayload};
pub use device::{Device, HeartbeatMetrics, QuoteKind, SuspensionEvent, TeeAttestationRecord};
pub use config::Config;
pub use constants::*;
pub use error::{AegisError, ErrorKind, QuoteFailure};
pub use profile::{AccountStats, EntityType, FieldUpdate, HumanityComponents, HumanityRecord, Profile, ProfileUpdate};
pub use types::*;
