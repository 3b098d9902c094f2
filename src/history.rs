//! User behaviour history lookups backing feature extraction.
//!
//! The scoring engine never queries storage directly; it asks a
//! [`HistoryProvider`] a fixed set of questions about a user's recent
//! activity. Unknown users get well-defined cold-start answers instead of
//! errors, so a first-ever transaction is always scorable.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised by a history backend.
#[derive(Error, Debug, Clone)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("history lookup timed out after {0}ms")]
    Timeout(u64),
}

/// Aggregated behaviour for one user as of a given instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserHistory {
    /// Mean amount across the user's recorded transactions.
    pub average_amount: f64,
    /// Population standard deviation of those amounts.
    pub amount_std_dev: f64,
    /// Transactions in the trailing one-hour window.
    pub count_last_hour: u32,
    /// Transactions in the trailing 24-hour window.
    pub count_last_day: u32,
    /// Days since the user's first recorded transaction.
    pub account_age_days: f64,
    /// Average transactions per day over the account's lifetime.
    pub transaction_frequency: f64,
    /// Refunds divided by total transactions, in [0, 1].
    pub refund_ratio: f64,
    /// Failed authentication/payment attempts in the trailing 24 hours.
    pub recent_failed_attempts: u32,
}

impl UserHistory {
    /// Defaults for a user with no recorded history: zero velocity, zero
    /// refund ratio, zero account age. Also used when a backend is
    /// unreachable and the extractor degrades rather than fails.
    pub fn cold_start() -> Self {
        Self {
            average_amount: 0.0,
            amount_std_dev: 0.0,
            count_last_hour: 0,
            count_last_day: 0,
            account_age_days: 0.0,
            transaction_frequency: 0.0,
            refund_ratio: 0.0,
            recent_failed_attempts: 0,
        }
    }
}

/// The narrow contract the engine needs from surrounding storage.
///
/// Implementations must answer within request latency and return cold-start
/// values for users they have never seen.
pub trait HistoryProvider: Send + Sync {
    /// Aggregated history for a user, with windows anchored at `as_of`.
    fn user_history(&self, user_id: &str, as_of: DateTime<Utc>)
        -> Result<UserHistory, HistoryError>;

    /// Whether this device id has been seen for this user before.
    fn device_seen(&self, user_id: &str, device_id: &str) -> Result<bool, HistoryError>;

    /// Risk score in [0, 1] for a location; 0.0 for unknown locations.
    fn location_risk(&self, location: &str) -> Result<f64, HistoryError>;

    /// Risk score in [0, 1] for a merchant category; 0.0 for unknown ones.
    fn merchant_risk(&self, category: &str) -> Result<f64, HistoryError>;
}

#[derive(Debug, Clone)]
struct RecordedTransaction {
    amount: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserRecord {
    first_seen: Option<DateTime<Utc>>,
    transactions: Vec<RecordedTransaction>,
    devices: HashSet<String>,
    refunds: u32,
    failed_attempts: Vec<DateTime<Utc>>,
}

/// Time-indexed in-memory history store.
///
/// Suitable as the provider for a single process; a production deployment
/// backs the same trait with a shared store. Interior locking lets one
/// instance sit behind `Arc<dyn HistoryProvider>` across request handlers.
pub struct InMemoryHistoryStore {
    users: RwLock<HashMap<String, UserRecord>>,
    location_risk: RwLock<HashMap<String, f64>>,
    merchant_risk: RwLock<HashMap<String, f64>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            location_risk: RwLock::new(HashMap::new()),
            merchant_risk: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed transaction for a user.
    pub fn record_transaction(
        &self,
        user_id: &str,
        amount: f64,
        timestamp: DateTime<Utc>,
        device_id: Option<&str>,
    ) {
        let mut users = self.users.write();
        let record = users.entry(user_id.to_string()).or_default();

        match record.first_seen {
            Some(first) if first <= timestamp => {}
            _ => record.first_seen = Some(timestamp),
        }
        record
            .transactions
            .push(RecordedTransaction { amount, timestamp });
        if let Some(device) = device_id {
            record.devices.insert(device.to_string());
        }
    }

    /// Record a refund against a user's account.
    pub fn record_refund(&self, user_id: &str) {
        let mut users = self.users.write();
        users.entry(user_id.to_string()).or_default().refunds += 1;
    }

    /// Record a failed authentication or payment attempt.
    pub fn record_failed_attempt(&self, user_id: &str, timestamp: DateTime<Utc>) {
        let mut users = self.users.write();
        users
            .entry(user_id.to_string())
            .or_default()
            .failed_attempts
            .push(timestamp);
    }

    /// Set the risk score for a location, clamped into [0, 1].
    pub fn set_location_risk(&self, location: &str, risk: f64) {
        self.location_risk
            .write()
            .insert(location.to_string(), risk.clamp(0.0, 1.0));
    }

    /// Set the risk score for a merchant category, clamped into [0, 1].
    pub fn set_merchant_risk(&self, category: &str, risk: f64) {
        self.merchant_risk
            .write()
            .insert(category.to_string(), risk.clamp(0.0, 1.0));
    }

    /// Total recorded transactions for a user.
    pub fn transaction_count(&self, user_id: &str) -> usize {
        self.users
            .read()
            .get(user_id)
            .map_or(0, |r| r.transactions.len())
    }

    /// Drop transaction and failed-attempt entries older than `cutoff`.
    pub fn retain_since(&self, cutoff: DateTime<Utc>) {
        let mut users = self.users.write();
        for record in users.values_mut() {
            record.transactions.retain(|t| t.timestamp >= cutoff);
            record.failed_attempts.retain(|t| *t >= cutoff);
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryProvider for InMemoryHistoryStore {
    fn user_history(
        &self,
        user_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<UserHistory, HistoryError> {
        let users = self.users.read();
        let record = match users.get(user_id) {
            Some(record) => record,
            None => return Ok(UserHistory::cold_start()),
        };

        let count = record.transactions.len();
        if count == 0 {
            return Ok(UserHistory::cold_start());
        }

        let sum: f64 = record.transactions.iter().map(|t| t.amount).sum();
        let average_amount = sum / count as f64;
        let variance: f64 = record
            .transactions
            .iter()
            .map(|t| (t.amount - average_amount).powi(2))
            .sum::<f64>()
            / count as f64;
        let amount_std_dev = variance.sqrt();

        let hour_ago = as_of - Duration::hours(1);
        let day_ago = as_of - Duration::hours(24);
        let count_last_hour = record
            .transactions
            .iter()
            .filter(|t| t.timestamp > hour_ago && t.timestamp <= as_of)
            .count() as u32;
        let count_last_day = record
            .transactions
            .iter()
            .filter(|t| t.timestamp > day_ago && t.timestamp <= as_of)
            .count() as u32;

        let account_age_days = record
            .first_seen
            .map(|first| (as_of - first).num_seconds().max(0) as f64 / 86_400.0)
            .unwrap_or(0.0);
        let transaction_frequency = count as f64 / account_age_days.max(1.0);
        let refund_ratio = record.refunds as f64 / count as f64;

        let recent_failed_attempts = record
            .failed_attempts
            .iter()
            .filter(|t| **t > day_ago && **t <= as_of)
            .count() as u32;

        Ok(UserHistory {
            average_amount,
            amount_std_dev,
            count_last_hour,
            count_last_day,
            account_age_days,
            transaction_frequency,
            refund_ratio: refund_ratio.min(1.0),
            recent_failed_attempts,
        })
    }

    fn device_seen(&self, user_id: &str, device_id: &str) -> Result<bool, HistoryError> {
        Ok(self
            .users
            .read()
            .get(user_id)
            .map_or(false, |r| r.devices.contains(device_id)))
    }

    fn location_risk(&self, location: &str) -> Result<f64, HistoryError> {
        Ok(self
            .location_risk
            .read()
            .get(location)
            .copied()
            .unwrap_or(0.0))
    }

    fn merchant_risk(&self, category: &str) -> Result<f64, HistoryError> {
        Ok(self
            .merchant_risk
            .read()
            .get(category)
            .copied()
            .unwrap_or(0.0))
    }
}
