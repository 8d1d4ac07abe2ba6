//! Deterministic reputation scoring.
//!
//! Both scores are pure functions over explicit input records: no clock, no
//! I/O, no hidden state. Equal inputs produce equal outputs across runs and
//! across machines — application policy (airdrop gating, voting weight)
//! depends on that.

pub mod device;
pub mod humanity;

pub use device::{device_trust, DeviceTrustFactors, DeviceTrustResult};
pub use humanity::{humanity, HumanityFactors, HumanityResult};
