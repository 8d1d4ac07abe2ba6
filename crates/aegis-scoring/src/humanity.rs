//! Humanity Score.
//!
//! Components: hardware anchor 40, social 30, on-chain 20, fees 10. The
//! hardware anchor applies the Sybil split: credit for a shared device is
//! divided by the number of accounts linked to it.

use serde::{Deserialize, Serialize};

use aegis_core::constants::{
    HUMANITY_AGE_MONTHS_MIN, HUMANITY_DEVICE_THRESHOLD, HUMANITY_FEES_SATURATION_USD,
    HUMANITY_HARDWARE_POINTS, HUMANITY_SOCIAL_ACCOUNTS_MAX, HUMANITY_SOCIAL_POINTS_EACH,
    HUMANITY_TX_COUNT_MIN, HUMANITY_VERIFIED_THRESHOLD,
};

/// Inputs of the Humanity Score.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct HumanityFactors {
    /// Trust score of the best device linked to the account.
    pub linked_device_score: u32,
    /// Accounts sharing that device; at least 1 once a device is linked.
    pub linked_device_shared_accounts: u32,
    pub verified_social_accounts: u32,
    pub account_age_months: u32,
    pub transaction_count: u64,
    pub total_fees_burned_usd: f64,
}

/// Score with per-component breakdown.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HumanityResult {
    pub score: u32,
    pub hardware_points: u32,
    pub social_points: u32,
    pub onchain_points: u32,
    pub fee_points: u32,
    pub is_verified_human: bool,
}

/// Compute the Humanity Score.
pub fn humanity(factors: &HumanityFactors) -> HumanityResult {
    let hardware_points = if factors.linked_device_score >= HUMANITY_DEVICE_THRESHOLD {
        let shared = factors.linked_device_shared_accounts.max(1);
        if shared > 1 {
            // Sybil split: one device anchors at most 40 points total.
            HUMANITY_HARDWARE_POINTS / shared
        } else {
            HUMANITY_HARDWARE_POINTS
        }
    } else {
        0
    };

    let social_points =
        factors.verified_social_accounts.min(HUMANITY_SOCIAL_ACCOUNTS_MAX) * HUMANITY_SOCIAL_POINTS_EACH;

    let onchain_points = u32::from(factors.account_age_months >= HUMANITY_AGE_MONTHS_MIN) * 10
        + u32::from(factors.transaction_count >= HUMANITY_TX_COUNT_MIN) * 10;

    let fee_points = if factors.total_fees_burned_usd >= HUMANITY_FEES_SATURATION_USD {
        10
    } else {
        ((factors.total_fees_burned_usd.max(0.0) / HUMANITY_FEES_SATURATION_USD) * 10.0).floor()
            as u32
    };

    let score = (hardware_points + social_points + onchain_points + fee_points).min(100);

    HumanityResult {
        score,
        hardware_points,
        social_points,
        onchain_points,
        fee_points,
        is_verified_human: score >= HUMANITY_VERIFIED_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn factors(
        device: u32,
        shared: u32,
        social: u32,
        age: u32,
        txs: u64,
        fees: f64,
    ) -> HumanityFactors {
        HumanityFactors {
            linked_device_score: device,
            linked_device_shared_accounts: shared,
            verified_social_accounts: social,
            account_age_months: age,
            transaction_count: txs,
            total_fees_burned_usd: fees,
        }
    }

    #[test]
    fn fully_anchored_account_scores_100() {
        let r = humanity(&factors(85, 1, 3, 12, 10, 15.0));
        assert_eq!(r.hardware_points, 40);
        assert_eq!(r.social_points, 30);
        assert_eq!(r.onchain_points, 20);
        assert_eq!(r.fee_points, 10);
        assert_eq!(r.score, 100);
        assert!(r.is_verified_human);
    }

    #[test]
    fn shared_device_splits_hardware_credit() {
        let r = humanity(&factors(85, 5, 0, 0, 0, 0.0));
        assert_eq!(r.hardware_points, 8); // floor(40 / 5)
        assert_eq!(r.score, 8);
        assert!(!r.is_verified_human);
    }

    #[test]
    fn weak_device_contributes_nothing() {
        let r = humanity(&factors(79, 1, 0, 0, 0, 0.0));
        assert_eq!(r.hardware_points, 0);
    }

    #[test]
    fn social_caps_at_three_accounts() {
        assert_eq!(humanity(&factors(0, 1, 2, 0, 0, 0.0)).social_points, 20);
        assert_eq!(humanity(&factors(0, 1, 7, 0, 0, 0.0)).social_points, 30);
    }

    #[test]
    fn onchain_components_are_independent() {
        assert_eq!(humanity(&factors(0, 1, 0, 6, 0, 0.0)).onchain_points, 10);
        assert_eq!(humanity(&factors(0, 1, 0, 0, 5, 0.0)).onchain_points, 10);
        assert_eq!(humanity(&factors(0, 1, 0, 6, 5, 0.0)).onchain_points, 20);
    }

    #[test]
    fn fee_ramp_floors_below_saturation() {
        assert_eq!(humanity(&factors(0, 1, 0, 0, 0, 10.0)).fee_points, 10);
        assert_eq!(humanity(&factors(0, 1, 0, 0, 0, 7.5)).fee_points, 7);
        assert_eq!(humanity(&factors(0, 1, 0, 0, 0, 0.99)).fee_points, 0);
        assert_eq!(humanity(&factors(0, 1, 0, 0, 0, -3.0)).fee_points, 0);
    }

    #[test]
    fn verified_threshold_is_exactly_60() {
        // 40 hardware + 20 social = 60.
        let at = humanity(&factors(85, 1, 2, 0, 0, 0.0));
        assert_eq!(at.score, 60);
        assert!(at.is_verified_human);

        // 40 hardware + 10 social + fee 9 = 59.
        let below = humanity(&factors(85, 1, 1, 0, 0, 9.99));
        assert_eq!(below.score, 59);
        assert!(!below.is_verified_human);
    }

    proptest! {
        #[test]
        fn deterministic_bounded_and_threshold_consistent(
            device in 0u32..101,
            shared in 1u32..64,
            social in 0u32..10,
            age in 0u32..240,
            txs in 0u64..1000,
            fees in -5.0f64..50.0,
        ) {
            let f = factors(device, shared, social, age, txs, fees);
            let a = humanity(&f);
            let b = humanity(&f);
            prop_assert_eq!(a, b);
            prop_assert!(a.score <= 100);
            prop_assert_eq!(a.is_verified_human, a.score >= 60);
        }

        #[test]
        fn sybil_split_is_floor_of_40_over_k(k in 1u32..=40) {
            let r = humanity(&factors(85, k, 0, 0, 0, 0.0));
            prop_assert_eq!(r.hardware_points, 40 / k);
        }
    }
}
