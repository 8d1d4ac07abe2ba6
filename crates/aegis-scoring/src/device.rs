//! Device Trust Score.
//!
//! Weights: TEE 40, uptime 25, congruence 20, firmware 15. A failed TEE
//! verification is a critical fail — score 0, device banned — regardless of
//! every other factor.

use serde::{Deserialize, Serialize};

use aegis_core::constants::{
    TRUST_CONGRUENCE_POINTS, TRUST_FIRMWARE_PENALTY_PER_VERSION, TRUST_FIRMWARE_POINTS,
    TRUST_TEE_POINTS, TRUST_UPTIME_POINTS,
};

/// Inputs of the Device Trust Score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeviceTrustFactors {
    pub tee_valid: bool,
    /// Fraction in [0, 1]; out-of-range inputs are clamped.
    pub uptime: f64,
    /// Fraction in [0, 1]; out-of-range inputs are clamped.
    pub data_congruence: f64,
    pub firmware_version: u32,
    pub latest_firmware_version: u32,
    pub consecutive_low_congruence_days: u32,
}

/// Score with per-component breakdown.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceTrustResult {
    pub score: u32,
    pub tee_passed: bool,
    pub uptime_points: u32,
    pub congruence_points: u32,
    pub firmware_points: u32,
    pub flagged_for_audit: bool,
    pub banned: bool,
}

/// Compute the Device Trust Score.
pub fn device_trust(factors: &DeviceTrustFactors) -> DeviceTrustResult {
    if !factors.tee_valid {
        return DeviceTrustResult {
            score: 0,
            tee_passed: false,
            uptime_points: 0,
            congruence_points: 0,
            firmware_points: 0,
            flagged_for_audit: false,
            banned: true,
        };
    }

    let uptime_points = (factors.uptime.clamp(0.0, 1.0) * TRUST_UPTIME_POINTS as f64).floor() as u32;
    let congruence_points =
        (factors.data_congruence.clamp(0.0, 1.0) * TRUST_CONGRUENCE_POINTS as f64).floor() as u32;

    // Ahead-of-latest counts as latest (operators: this masks downgrade
    // detection during a version rollout).
    let firmware_points = if factors.firmware_version >= factors.latest_firmware_version {
        TRUST_FIRMWARE_POINTS
    } else {
        let versions_behind = factors.latest_firmware_version - factors.firmware_version;
        TRUST_FIRMWARE_POINTS
            .saturating_sub(TRUST_FIRMWARE_PENALTY_PER_VERSION.saturating_mul(versions_behind))
    };

    let score = (TRUST_TEE_POINTS + uptime_points + congruence_points + firmware_points).min(100);

    let flagged_for_audit =
        factors.data_congruence < 0.5 && factors.consecutive_low_congruence_days >= 3;

    DeviceTrustResult {
        score,
        tee_passed: true,
        uptime_points,
        congruence_points,
        firmware_points,
        flagged_for_audit,
        banned: false,
    }
}
