//! # Fraud Risk Engine
//!
//! A fraud-risk scoring core for transaction processing backends.
//!
//! ## Features
//!
//! - **Feature Extraction**: Fixed-order 15-feature vectors from raw
//!   transactions plus user history, with defined cold-start defaults
//! - **Probabilistic Classification**: Fraud probability and confidence
//!   from a shared, atomically replaceable model
//! - **Risk Flags**: Deterministic rule engine with configurable policy
//!   thresholds
//! - **Explanations**: Per-feature contribution ranking for downstream
//!   natural-language generation
//! - **Audit Trail**: Append-only, hash-chained record of scoring decisions
//!
//! Persistence, report rendering, and ledger logging are external
//! collaborators; the engine returns a valid response without depending on
//! any of them.

pub mod audit;
pub mod classifier;
pub mod explain;
pub mod features;
pub mod flags;
pub mod history;

pub use audit::{AuditRecord, AuditTrail};
pub use classifier::{
    FraudClassifier, LabeledSample, ModelError, ModelInfo, Prediction, TrainConfig, TrainedModel,
};
pub use explain::{top_factors, ContributionMap, Direction, RankedFactor};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use flags::{FlagGenerator, FlagThresholds, FLAG_LOW_CONFIDENCE_CONTEXT};
pub use history::{HistoryError, HistoryProvider, InMemoryHistoryStore, UserHistory};

use chrono::{DateTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Scoring errors surfaced to callers.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    /// Malformed or missing request fields; rejected before the classifier
    /// runs. A client error.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No trained model is loaded. Fatal for the request and not retried:
    /// retrying without a model present cannot succeed.
    #[error("no trained model is loaded")]
    ModelUnavailable,

    /// Contribution computation failed. Scoring is unaffected; only the
    /// explanation path degrades.
    #[error("explanation failed: {0}")]
    ExplanationFailed(String),
}

/// Three-way risk classification derived from the fraud probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a fraud probability to a risk level using the configured
    /// thresholds. Pure and deterministic; applied by the caller of the
    /// classifier, never inside it.
    pub fn from_score(score: f64, thresholds: &RiskThresholds) -> Self {
        if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Risk-level cutoffs. Policy constants with documented defaults:
/// probability >= 0.8 is high, >= 0.5 is medium, below that low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

/// A transaction submitted for scoring. Transient: created per request,
/// never persisted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    pub location: String,
    pub device_id: Option<String>,
    /// Defaults to processing time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub merchant_category: Option<String>,
}

impl ScoreRequest {
    /// The timestamp used for time features and history windows.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// Scoring result for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub transaction_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub flags: Vec<String>,
    pub confidence: f64,
    pub model_version: String,
}

impl ScoreResponse {
    /// Export as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Ranked explanation for one scored transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub transaction_id: String,
    pub contributions: ContributionMap,
    pub top_factors: Vec<String>,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub risk: RiskThresholds,
    pub flags: FlagThresholds,
    /// Number of ranked factors returned by explanations.
    pub explanation_factors: usize,
    pub enable_audit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk: RiskThresholds::default(),
            flags: FlagThresholds::default(),
            explanation_factors: 3,
            enable_audit: true,
        }
    }
}

/// The scoring engine: request validation, feature extraction,
/// classification, risk-level derivation, flag generation, and best-effort
/// audit logging. Stateless per call; the one shared resource is the
/// classifier's model handle.
pub struct ScoringEngine {
    config: EngineConfig,
    extractor: FeatureExtractor,
    classifier: FraudClassifier,
    flag_generator: FlagGenerator,
    history: Arc<dyn HistoryProvider>,
    audit: AuditTrail,
}

impl ScoringEngine {
    /// Engine with default configuration and the shipped model.
    pub fn new(history: Arc<dyn HistoryProvider>) -> Self {
        Self::with_parts(EngineConfig::default(), FraudClassifier::new(), history)
    }

    /// Engine with custom configuration and the shipped model.
    pub fn with_config(config: EngineConfig, history: Arc<dyn HistoryProvider>) -> Self {
        Self::with_parts(config, FraudClassifier::new(), history)
    }

    /// Engine assembled from explicit parts.
    pub fn with_parts(
        config: EngineConfig,
        classifier: FraudClassifier,
        history: Arc<dyn HistoryProvider>,
    ) -> Self {
        let flag_generator = FlagGenerator::with_thresholds(config.flags.clone());
        Self {
            config,
            extractor: FeatureExtractor::new(),
            classifier,
            flag_generator,
            history,
            audit: AuditTrail::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared classifier handle, for model info and replacement.
    pub fn classifier(&self) -> &FraudClassifier {
        &self.classifier
    }

    /// The audit trail of decisions made by this engine instance.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Validate request fields before any scoring work.
    fn validate(&self, request: &ScoreRequest) -> Result<(), EngineError> {
        let id_format = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]*$").unwrap();

        if request.transaction_id.is_empty() {
            return Err(EngineError::InvalidInput(
                "transaction_id must not be empty".to_string(),
            ));
        }
        if !id_format.is_match(&request.transaction_id) {
            return Err(EngineError::InvalidInput(format!(
                "invalid transaction_id format: {}",
                request.transaction_id
            )));
        }
        if request.user_id.is_empty() {
            return Err(EngineError::InvalidInput(
                "user_id must not be empty".to_string(),
            ));
        }
        if !id_format.is_match(&request.user_id) {
            return Err(EngineError::InvalidInput(format!(
                "invalid user_id format: {}",
                request.user_id
            )));
        }
        if !request.amount.is_finite() {
            return Err(EngineError::InvalidInput(
                "amount must be a finite number".to_string(),
            ));
        }
        if request.amount < 0.0 {
            return Err(EngineError::InvalidInput(format!(
                "amount must be non-negative, got {}",
                request.amount
            )));
        }
        if request.location.is_empty() {
            return Err(EngineError::InvalidInput(
                "location must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Score one transaction.
    ///
    /// Pipeline: validate, extract features (degrading to cold-start
    /// defaults if history is unreachable), predict, derive risk level,
    /// generate flags, append to the audit trail. A degraded history
    /// lookup adds the "low_confidence_context" flag instead of failing
    /// the request.
    pub fn score(&self, request: &ScoreRequest) -> Result<ScoreResponse, EngineError> {
        self.validate(request)?;

        let extraction = self.extractor.extract(request, self.history.as_ref());

        // One model snapshot per request: the probability and the version
        // reported alongside it must come from the same model even when a
        // replacement lands mid-request.
        let model = self
            .classifier
            .snapshot()
            .map_err(|_| EngineError::ModelUnavailable)?;
        let prediction = model.predict(&extraction.vector);
        let model_version = model.version().to_string();

        let risk_level = RiskLevel::from_score(prediction.probability, &self.config.risk);

        let mut flags = self.flag_generator.flags(&extraction.vector);
        if extraction.history_degraded {
            flags.push(FLAG_LOW_CONFIDENCE_CONTEXT.to_string());
        }

        if self.config.enable_audit {
            self.audit.append(
                &request.transaction_id,
                &request.user_id,
                prediction.probability,
                risk_level,
                "scored",
            );
        }

        debug!(
            "scored transaction {}: score={:.4} level={} flags={}",
            request.transaction_id,
            prediction.probability,
            risk_level,
            flags.len()
        );

        Ok(ScoreResponse {
            transaction_id: request.transaction_id.clone(),
            risk_score: prediction.probability,
            risk_level,
            flags,
            confidence: prediction.confidence,
            model_version,
        })
    }

    /// Score a batch of transactions as independent invocations. One
    /// item's failure never aborts the others.
    pub fn score_batch(
        &self,
        requests: &[ScoreRequest],
    ) -> Vec<Result<ScoreResponse, EngineError>> {
        requests.iter().map(|r| self.score(r)).collect()
    }

    /// Rank the per-feature contributions for one transaction.
    ///
    /// Independent of scoring: a failure here never disturbs a score
    /// already produced, and concurrent calls never interfere.
    pub fn explain(&self, request: &ScoreRequest) -> Result<Explanation, EngineError> {
        self.validate(request)?;

        let extraction = self.extractor.extract(request, self.history.as_ref());
        let contributions = match self.classifier.explain(&extraction.vector) {
            Ok(map) => map,
            Err(ModelError::Unavailable) => return Err(EngineError::ModelUnavailable),
            Err(e) => return Err(EngineError::ExplanationFailed(e.to_string())),
        };

        let top = top_factors(&contributions, self.config.explanation_factors);

        Ok(Explanation {
            transaction_id: request.transaction_id.clone(),
            contributions,
            top_factors: top,
        })
    }
}
