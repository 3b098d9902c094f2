//! Rule-based risk flags.
//!
//! Flags are derived from the extracted features, not from the classifier's
//! internals, so an analyst can read them independently of the score. Every
//! rule is evaluated; multiple flags may fire for one transaction.

use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};

pub const FLAG_LARGE_AMOUNT: &str = "large_amount";
pub const FLAG_UNUSUAL_AMOUNT_FOR_USER: &str = "unusual_amount_for_user";
pub const FLAG_HIGH_VELOCITY: &str = "high_velocity";
pub const FLAG_NEW_DEVICE: &str = "new_device";
pub const FLAG_UNUSUAL_LOCATION: &str = "unusual_location";
pub const FLAG_UNUSUAL_TIME: &str = "unusual_time";
pub const FLAG_WEEKEND_TRANSACTION: &str = "weekend_transaction";

/// Appended by the engine when history lookups were degraded and the
/// feature vector fell back to cold-start defaults.
pub const FLAG_LOW_CONFIDENCE_CONTEXT: &str = "low_confidence_context";

/// Policy constants for the flag rules. Defaults match the shipped rule
/// table; deployments tune them through configuration, not code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagThresholds {
    /// Absolute amount above which a transaction is flagged large.
    pub large_amount: f64,
    /// Amount z-score against user history above which the amount is
    /// unusual for that user.
    pub unusual_zscore: f64,
    /// Transactions in the trailing hour above which velocity is high.
    pub high_velocity_1h: f64,
    /// Location risk score above which the location is unusual.
    pub unusual_location_risk: f64,
    /// Hours strictly before this are unusual (night-time).
    pub unusual_hour_before: f64,
    /// Hours strictly after this are unusual.
    pub unusual_hour_after: f64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            large_amount: 1000.0,
            unusual_zscore: 2.0,
            high_velocity_1h: 3.0,
            unusual_location_risk: 0.7,
            unusual_hour_before: 6.0,
            unusual_hour_after: 23.0,
        }
    }
}

/// Deterministic rule engine producing human-readable risk flags.
pub struct FlagGenerator {
    thresholds: FlagThresholds,
}

impl FlagGenerator {
    pub fn new() -> Self {
        Self {
            thresholds: FlagThresholds::default(),
        }
    }

    pub fn with_thresholds(thresholds: FlagThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FlagThresholds {
        &self.thresholds
    }

    /// Evaluate every rule against the extracted features. No
    /// short-circuiting: co-occurring flags all fire.
    pub fn flags(&self, features: &FeatureVector) -> Vec<String> {
        let mut flags = Vec::new();

        if features.amount() > self.thresholds.large_amount {
            flags.push(FLAG_LARGE_AMOUNT.to_string());
        }
        if features.amount_zscore() > self.thresholds.unusual_zscore {
            flags.push(FLAG_UNUSUAL_AMOUNT_FOR_USER.to_string());
        }
        if features.velocity_1h() > self.thresholds.high_velocity_1h {
            flags.push(FLAG_HIGH_VELOCITY.to_string());
        }
        if features.is_new_device() {
            flags.push(FLAG_NEW_DEVICE.to_string());
        }
        if features.location_risk() > self.thresholds.unusual_location_risk {
            flags.push(FLAG_UNUSUAL_LOCATION.to_string());
        }
        let hour = features.hour_of_day();
        if hour < self.thresholds.unusual_hour_before || hour > self.thresholds.unusual_hour_after
        {
            flags.push(FLAG_UNUSUAL_TIME.to_string());
        }
        if features.is_weekend() {
            flags.push(FLAG_WEEKEND_TRANSACTION.to_string());
        }

        flags
    }
}

impl Default for FlagGenerator {
    fn default() -> Self {
        Self::new()
    }
}
