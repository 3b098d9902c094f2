//! Feature extraction for the fraud classifier.
//!
//! Turns a raw score request plus user history into a fixed-order numeric
//! vector. The order is load-bearing: training and inference must see the
//! same 15 features in the same positions, so the vector type owns the
//! canonical ordering and nothing else in the crate restates it.

use crate::history::{HistoryProvider, UserHistory};
use crate::ScoreRequest;
use chrono::{Datelike, Timelike};
use log::warn;
use serde::{Deserialize, Serialize};

/// Number of features in the canonical vector.
pub const FEATURE_COUNT: usize = 15;

/// Canonical feature order, identical at training and inference time.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "hour_of_day",
    "day_of_week",
    "is_weekend",
    "amount_zscore",
    "velocity_1h",
    "velocity_24h",
    "is_new_device",
    "location_risk",
    "merchant_risk",
    "account_age_days",
    "avg_amount",
    "transaction_frequency",
    "refund_ratio",
    "failed_attempts",
];

const IDX_AMOUNT: usize = 0;
const IDX_HOUR_OF_DAY: usize = 1;
const IDX_IS_WEEKEND: usize = 3;
const IDX_AMOUNT_ZSCORE: usize = 4;
const IDX_VELOCITY_1H: usize = 5;
const IDX_IS_NEW_DEVICE: usize = 7;
const IDX_LOCATION_RISK: usize = 8;

/// Position of a feature name in the canonical order.
pub fn canonical_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Fixed-order feature vector for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Build a vector from values already in canonical order.
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    /// All values in canonical order.
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Value of a feature by canonical name.
    pub fn get(&self, name: &str) -> Option<f64> {
        canonical_index(name).map(|i| self.values[i])
    }

    pub fn amount(&self) -> f64 {
        self.values[IDX_AMOUNT]
    }

    pub fn hour_of_day(&self) -> f64 {
        self.values[IDX_HOUR_OF_DAY]
    }

    pub fn is_weekend(&self) -> bool {
        self.values[IDX_IS_WEEKEND] > 0.5
    }

    pub fn amount_zscore(&self) -> f64 {
        self.values[IDX_AMOUNT_ZSCORE]
    }

    pub fn velocity_1h(&self) -> f64 {
        self.values[IDX_VELOCITY_1H]
    }

    pub fn is_new_device(&self) -> bool {
        self.values[IDX_IS_NEW_DEVICE] > 0.5
    }

    pub fn location_risk(&self) -> f64 {
        self.values[IDX_LOCATION_RISK]
    }
}

/// Result of feature extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub vector: FeatureVector,
    /// True when the history provider failed and cold-start defaults were
    /// substituted. The response is still produced, flagged as
    /// low-confidence context.
    pub history_degraded: bool,
}

/// Extracts the canonical feature vector from a request plus user history.
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features for one transaction.
    ///
    /// Never fails: unknown users resolve to cold-start defaults, and an
    /// unreachable provider degrades to the same defaults with
    /// `history_degraded` set rather than erroring.
    pub fn extract(&self, request: &ScoreRequest, provider: &dyn HistoryProvider) -> Extraction {
        let as_of = request.effective_timestamp();
        let mut degraded = false;

        let history = match provider.user_history(&request.user_id, as_of) {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    "history lookup failed for user {}, using cold-start defaults: {}",
                    request.user_id, e
                );
                degraded = true;
                UserHistory::cold_start()
            }
        };

        // A device the provider was never shown cannot be vouched for, so
        // a missing device id counts as new.
        let is_new_device = match &request.device_id {
            Some(device_id) => match provider.device_seen(&request.user_id, device_id) {
                Ok(seen) => !seen,
                Err(e) => {
                    warn!(
                        "device lookup failed for user {}: {}",
                        request.user_id, e
                    );
                    degraded = true;
                    true
                }
            },
            None => true,
        };

        let location_risk = match provider.location_risk(&request.location) {
            Ok(risk) => risk,
            Err(e) => {
                warn!("location risk lookup failed for {}: {}", request.location, e);
                degraded = true;
                0.0
            }
        };

        let merchant_risk = match &request.merchant_category {
            Some(category) => match provider.merchant_risk(category) {
                Ok(risk) => risk,
                Err(e) => {
                    warn!("merchant risk lookup failed for {}: {}", category, e);
                    degraded = true;
                    0.0
                }
            },
            None => 0.0,
        };

        let zscore = if history.amount_std_dev == 0.0 {
            0.0
        } else {
            (request.amount - history.average_amount) / history.amount_std_dev
        };

        let day_of_week = as_of.weekday().num_days_from_monday();
        let is_weekend = if day_of_week >= 5 { 1.0 } else { 0.0 };

        let vector = FeatureVector::from_values([
            request.amount,
            as_of.hour() as f64,
            day_of_week as f64,
            is_weekend,
            zscore,
            history.count_last_hour as f64,
            history.count_last_day as f64,
            if is_new_device { 1.0 } else { 0.0 },
            location_risk,
            merchant_risk,
            history.account_age_days,
            history.average_amount,
            history.transaction_frequency,
            history.refund_ratio,
            history.recent_failed_attempts as f64,
        ]);

        Extraction {
            vector,
            history_degraded: degraded,
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryError, InMemoryHistoryStore};
    use chrono::{DateTime, TimeZone, Utc};

    struct FailingProvider;

    impl HistoryProvider for FailingProvider {
        fn user_history(
            &self,
            _user_id: &str,
            _as_of: DateTime<Utc>,
        ) -> Result<UserHistory, HistoryError> {
            Err(HistoryError::Unavailable("store offline".to_string()))
        }

        fn device_seen(&self, _user_id: &str, _device_id: &str) -> Result<bool, HistoryError> {
            Err(HistoryError::Unavailable("store offline".to_string()))
        }

        fn location_risk(&self, _location: &str) -> Result<f64, HistoryError> {
            Err(HistoryError::Unavailable("store offline".to_string()))
        }

        fn merchant_risk(&self, _category: &str) -> Result<f64, HistoryError> {
            Err(HistoryError::Unavailable("store offline".to_string()))
        }
    }

    /// History aggregation times out; the cheap lookups still answer.
    struct TimingOutProvider;

    impl HistoryProvider for TimingOutProvider {
        fn user_history(
            &self,
            _user_id: &str,
            _as_of: DateTime<Utc>,
        ) -> Result<UserHistory, HistoryError> {
            Err(HistoryError::Timeout(250))
        }

        fn device_seen(&self, _user_id: &str, _device_id: &str) -> Result<bool, HistoryError> {
            Ok(true)
        }

        fn location_risk(&self, _location: &str) -> Result<f64, HistoryError> {
            Ok(0.4)
        }

        fn merchant_risk(&self, _category: &str) -> Result<f64, HistoryError> {
            Ok(0.1)
        }
    }

    fn request_at(hour: u32, day: u32) -> ScoreRequest {
        ScoreRequest {
            transaction_id: "TXN-001".to_string(),
            user_id: "USER-001".to_string(),
            amount: 250.0,
            location: "Berlin".to_string(),
            device_id: Some("DEV-1".to_string()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 6, day, hour, 30, 0).unwrap()),
            payment_method: None,
            merchant_category: None,
        }
    }

    #[test]
    fn test_vector_length_and_order() {
        let store = InMemoryHistoryStore::new();
        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &store);

        assert_eq!(extraction.vector.values().len(), FEATURE_COUNT);
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        assert_eq!(canonical_index("amount"), Some(0));
        assert_eq!(canonical_index("failed_attempts"), Some(14));
        assert_eq!(canonical_index("shoe_size"), None);
    }

    #[test]
    fn test_time_features() {
        let store = InMemoryHistoryStore::new();
        // 2024-06-15 is a Saturday
        let extraction = FeatureExtractor::new().extract(&request_at(2, 15), &store);

        assert_eq!(extraction.vector.hour_of_day(), 2.0);
        assert_eq!(extraction.vector.get("day_of_week"), Some(5.0));
        assert!(extraction.vector.is_weekend());

        // 2024-06-12 is a Wednesday
        let extraction = FeatureExtractor::new().extract(&request_at(14, 12), &store);
        assert_eq!(extraction.vector.get("day_of_week"), Some(2.0));
        assert!(!extraction.vector.is_weekend());
    }

    #[test]
    fn test_cold_start_defaults() {
        let store = InMemoryHistoryStore::new();
        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &store);
        let vector = &extraction.vector;

        assert!(!extraction.history_degraded);
        assert_eq!(vector.velocity_1h(), 0.0);
        assert_eq!(vector.get("velocity_24h"), Some(0.0));
        assert!(vector.is_new_device());
        assert_eq!(vector.get("refund_ratio"), Some(0.0));
        assert_eq!(vector.get("account_age_days"), Some(0.0));
    }

    #[test]
    fn test_zscore_zero_when_std_dev_zero() {
        let store = InMemoryHistoryStore::new();
        // Two identical amounts: std dev is exactly zero
        let earlier = Utc.with_ymd_and_hms(2024, 6, 12, 8, 0, 0).unwrap();
        store.record_transaction("USER-001", 100.0, earlier, None);
        store.record_transaction("USER-001", 100.0, earlier, None);

        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &store);
        assert_eq!(extraction.vector.amount_zscore(), 0.0);
    }

    #[test]
    fn test_zscore_against_history() {
        let store = InMemoryHistoryStore::new();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 12, 8, 0, 0).unwrap();
        store.record_transaction("USER-001", 100.0, earlier, None);
        store.record_transaction("USER-001", 300.0, earlier, None);

        // avg 200, std 100, amount 250 -> z = 0.5
        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &store);
        assert!((extraction.vector.amount_zscore() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_known_device_not_new() {
        let store = InMemoryHistoryStore::new();
        let earlier = Utc.with_ymd_and_hms(2024, 6, 12, 8, 0, 0).unwrap();
        store.record_transaction("USER-001", 100.0, earlier, Some("DEV-1"));

        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &store);
        assert!(!extraction.vector.is_new_device());
    }

    #[test]
    fn test_missing_optional_fields_still_fifteen_features() {
        let store = InMemoryHistoryStore::new();
        let mut request = request_at(10, 12);
        request.device_id = None;
        request.merchant_category = None;
        request.payment_method = None;

        let extraction = FeatureExtractor::new().extract(&request, &store);
        assert_eq!(extraction.vector.values().len(), FEATURE_COUNT);
        assert!(extraction.vector.is_new_device());
        assert_eq!(extraction.vector.get("merchant_risk"), Some(0.0));
    }

    #[test]
    fn test_degraded_provider_falls_back_to_defaults() {
        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &FailingProvider);
        let vector = &extraction.vector;

        assert!(extraction.history_degraded);
        assert_eq!(vector.velocity_1h(), 0.0);
        assert!(vector.is_new_device());
        assert_eq!(vector.location_risk(), 0.0);
        // Time features come from the request, not the provider
        assert_eq!(vector.hour_of_day(), 10.0);
    }

    #[test]
    fn test_history_timeout_degrades_only_history_features() {
        let extraction = FeatureExtractor::new().extract(&request_at(10, 12), &TimingOutProvider);
        let vector = &extraction.vector;

        assert!(extraction.history_degraded);
        // Cold-start defaults stand in for the timed-out aggregation
        assert_eq!(vector.velocity_1h(), 0.0);
        assert_eq!(vector.get("avg_amount"), Some(0.0));
        // Lookups that answered are used as-is
        assert!(!vector.is_new_device());
        assert_eq!(vector.location_risk(), 0.4);
    }
}
