//! Account-side records: profiles, observed activity stats, and the cached
//! humanity projection.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Timestamp};

// ── EntityType ───────────────────────────────────────────────────────────────

/// Account taxonomy tag. Carried for display and policy layers; scoring
/// never reads it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EntityType {
    #[default]
    Individual,
    Institution,
    SystemAdmin,
    Bot,
}

// ── Profile ──────────────────────────────────────────────────────────────────

/// Public profile attached to an address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Profile {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub social_links: Vec<String>,
    pub handle: Option<String>,
    #[serde(default)]
    pub entity_type: EntityType,
    pub updated_at: Timestamp,
}

/// Presence semantics for one profile field in an update request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub enum FieldUpdate<T> {
    Set(T),
    Clear,
    #[default]
    Keep,
}

impl<T> FieldUpdate<T> {
    /// Fold this update into the current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            FieldUpdate::Set(v) => Some(v),
            FieldUpdate::Clear => None,
            FieldUpdate::Keep => current,
        }
    }
}

/// An explicit profile update: exactly the five recognized fields, each with
/// set / clear / keep semantics. Unknown fields do not exist by construction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: FieldUpdate<String>,
    #[serde(default)]
    pub bio: FieldUpdate<String>,
    #[serde(default)]
    pub avatar_url: FieldUpdate<String>,
    #[serde(default)]
    pub social_links: FieldUpdate<Vec<String>>,
    #[serde(default)]
    pub handle: FieldUpdate<String>,
}

impl Profile {
    /// Apply an update, stamping `updated_at`.
    pub fn apply(mut self, update: ProfileUpdate, now: Timestamp) -> Self {
        self.name = update.name.apply(self.name);
        self.bio = update.bio.apply(self.bio);
        self.avatar_url = update.avatar_url.apply(self.avatar_url);
        self.social_links = update.social_links.apply(Some(self.social_links)).unwrap_or_default();
        self.handle = update.handle.apply(self.handle);
        self.updated_at = now;
        self
    }
}

// ── AccountStats ─────────────────────────────────────────────────────────────

/// Observed on-chain history for an address: the raw inputs of the Humanity
/// Score that the engine does not derive itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct AccountStats {
    pub verified_social_accounts: u32,
    pub transaction_count: u64,
    pub total_fees_burned_usd: f64,
    /// First-seen timestamp; 0 means unknown.
    pub registered_at: Timestamp,
}

// ── HumanityRecord ───────────────────────────────────────────────────────────

/// Per-component breakdown of a humanity score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HumanityComponents {
    pub hardware_points: u32,
    pub social_points: u32,
    pub onchain_points: u32,
    pub fee_points: u32,
}

/// Cached humanity projection for an address. Recomputed on demand once the
/// TTL lapses.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HumanityRecord {
    pub address: Address,
    pub score: u32,
    pub is_verified_human: bool,
    pub components: HumanityComponents,
    pub last_updated: Timestamp,
}
