//! Append-only audit trail of scoring decisions.
//!
//! Each record carries a SHA-256 hash over its own fields plus the previous
//! record's hash, so any later edit breaks the chain. User ids are stored
//! only as hashes. The engine appends best-effort: audit problems are
//! logged, never allowed to fail a score.

use crate::RiskLevel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// SHA-256 hex digest of a user id. Audit records never hold the raw id.
pub fn hash_user_id(user_id: &str) -> String {
    format!("{:x}", Sha256::digest(user_id.as_bytes()))
}

/// One immutable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub transaction_id: String,
    pub user_id_hash: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub action: String,
    pub recorded_at: DateTime<Utc>,
    pub previous_hash: String,
    pub record_hash: String,
}

impl AuditRecord {
    fn compute_hash(&self) -> String {
        let payload = format!(
            "{}|{}|{}|{}|{:.12}|{}|{}|{}",
            self.previous_hash,
            self.id,
            self.transaction_id,
            self.user_id_hash,
            self.risk_score,
            self.risk_level,
            self.action,
            self.recorded_at.to_rfc3339(),
        );
        format!("{:x}", Sha256::digest(payload.as_bytes()))
    }
}

/// Verify a chain of records: every hash must match its fields and link to
/// the record before it.
pub fn verify_records(records: &[AuditRecord]) -> bool {
    let mut expected_previous = GENESIS_HASH.to_string();
    for record in records {
        if record.previous_hash != expected_previous {
            return false;
        }
        if record.record_hash != record.compute_hash() {
            return false;
        }
        expected_previous = record.record_hash.clone();
    }
    true
}

/// Append-only, hash-chained audit trail.
pub struct AuditTrail {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append a scoring decision, chaining it to the previous record.
    pub fn append(
        &self,
        transaction_id: &str,
        user_id: &str,
        risk_score: f64,
        risk_level: RiskLevel,
        action: &str,
    ) -> AuditRecord {
        let mut records = self.records.lock();
        let previous_hash = records
            .last()
            .map(|r| r.record_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut record = AuditRecord {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            user_id_hash: hash_user_id(user_id),
            risk_score,
            risk_level,
            action: action.to_string(),
            recorded_at: Utc::now(),
            previous_hash,
            record_hash: String::new(),
        };
        record.record_hash = record.compute_hash();

        records.push(record.clone());
        record
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of all records in append order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Walk the chain and check every hash and link.
    pub fn verify(&self) -> bool {
        verify_records(&self.records.lock())
    }

    /// Export the trail as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.records.lock())
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}
