pub mod challenge;
pub mod quote;
pub mod verifier;

pub use challenge::ChallengeStore;
pub use quote::{CertLink, SecureEnclaveEnvelope, TrustZoneToken, TrustedRoots};
pub use verifier::{TeeVerifier, VerifiedQuote, DEMO_MODE_QUOTE};
