//! Probabilistic fraud classifier and the shared model handle.
//!
//! The model is a standardized logistic regression: deterministic to train,
//! cheap to evaluate, and explainable additively (weight times standardized
//! value) without re-training. The algorithm is an implementation choice;
//! callers depend only on the predict/explain contract.
//!
//! One `FraudClassifier` handle is shared across request handlers. Readers
//! clone an `Arc` to the current model under a read lock and run inference
//! against that snapshot, so a concurrent `replace` publishes a new model
//! without disturbing in-flight predictions.

use crate::explain::ContributionMap;
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use chrono::{DateTime, TimeZone, Utc};
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Classifier errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no trained model is loaded")]
    Unavailable,

    #[error("model file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("training set is empty")]
    EmptyTrainingSet,
}

/// Output of one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Estimated probability the transaction is fraudulent, in [0, 1].
    pub probability: f64,
    /// Maximum class-membership probability, in [0.5, 1]. Measures how
    /// decisively the model committed to either class, not how likely
    /// fraud is.
    pub confidence: f64,
}

/// Metadata about the loaded model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub model_type: String,
    pub feature_count: usize,
    pub trained_at: DateTime<Utc>,
}

/// One labeled training example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub is_fraud: bool,
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub version: String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 500,
            learning_rate: 0.1,
            version: "custom".to_string(),
        }
    }
}

/// An immutable trained model. Never mutated after construction; model
/// updates build a new instance and publish it through the classifier
/// handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    version: String,
    trained_at: DateTime<Utc>,
    weights: [f64; FEATURE_COUNT],
    intercept: f64,
    feature_means: [f64; FEATURE_COUNT],
    feature_scales: [f64; FEATURE_COUNT],
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl TrainedModel {
    /// The model shipped with the engine, standing in for the original
    /// offline-trained classifier. Coefficients are on standardized
    /// features; signs follow domain direction (new device, velocity and
    /// location risk push toward fraud, account age pushes away).
    pub fn shipped() -> Self {
        Self {
            version: "v1.2.0".to_string(),
            trained_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            weights: [
                0.85,  // amount
                -0.15, // hour_of_day
                0.05,  // day_of_week
                0.20,  // is_weekend
                0.95,  // amount_zscore
                0.80,  // velocity_1h
                0.45,  // velocity_24h
                0.70,  // is_new_device
                0.90,  // location_risk
                0.50,  // merchant_risk
                -0.60, // account_age_days
                -0.10, // avg_amount
                -0.20, // transaction_frequency
                0.55,  // refund_ratio
                0.75,  // failed_attempts
            ],
            intercept: -2.0,
            feature_means: [
                120.0, 13.0, 3.0, 0.28, 0.0, 0.4, 2.0, 0.2, 0.15, 0.15, 400.0, 110.0, 1.2,
                0.05, 0.3,
            ],
            feature_scales: [
                250.0, 6.0, 2.0, 0.45, 1.0, 1.0, 3.0, 0.4, 0.2, 0.2, 350.0, 180.0, 1.5, 0.1,
                1.0,
            ],
        }
    }

    /// Train a model with deterministic full-batch gradient descent on
    /// standardized features.
    pub fn train(samples: &[LabeledSample], config: &TrainConfig) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let n = samples.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        let mut scales = [0.0; FEATURE_COUNT];

        for sample in samples {
            for (i, value) in sample.features.values().iter().enumerate() {
                means[i] += value / n;
            }
        }
        for sample in samples {
            for (i, value) in sample.features.values().iter().enumerate() {
                scales[i] += (value - means[i]).powi(2) / n;
            }
        }
        for scale in scales.iter_mut() {
            *scale = scale.sqrt();
            if *scale == 0.0 {
                // Constant feature: standardized value stays zero
                *scale = 1.0;
            }
        }

        let standardized: Vec<[f64; FEATURE_COUNT]> = samples
            .iter()
            .map(|s| {
                let mut row = [0.0; FEATURE_COUNT];
                for (i, value) in s.features.values().iter().enumerate() {
                    row[i] = (value - means[i]) / scales[i];
                }
                row
            })
            .collect();

        let mut weights = [0.0; FEATURE_COUNT];
        let mut intercept = 0.0;

        for _ in 0..config.epochs {
            let mut weight_grad = [0.0; FEATURE_COUNT];
            let mut intercept_grad = 0.0;

            for (row, sample) in standardized.iter().zip(samples) {
                let z = intercept
                    + row
                        .iter()
                        .zip(weights.iter())
                        .map(|(x, w)| x * w)
                        .sum::<f64>();
                let error = sigmoid(z) - if sample.is_fraud { 1.0 } else { 0.0 };
                for (grad, x) in weight_grad.iter_mut().zip(row.iter()) {
                    *grad += error * x / n;
                }
                intercept_grad += error / n;
            }

            for (weight, grad) in weights.iter_mut().zip(weight_grad.iter()) {
                *weight -= config.learning_rate * grad;
            }
            intercept -= config.learning_rate * intercept_grad;
        }

        Ok(Self {
            version: config.version.clone(),
            trained_at: Utc::now(),
            weights,
            intercept,
            feature_means: means,
            feature_scales: scales,
        })
    }

    fn standardized(&self, vector: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut row = [0.0; FEATURE_COUNT];
        for (i, value) in vector.values().iter().enumerate() {
            row[i] = (value - self.feature_means[i]) / self.feature_scales[i];
        }
        row
    }

    /// Fraud probability and confidence for one feature vector.
    pub fn predict(&self, vector: &FeatureVector) -> Prediction {
        let row = self.standardized(vector);
        let z = self.intercept
            + row
                .iter()
                .zip(self.weights.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>();
        let probability = sigmoid(z).clamp(0.0, 1.0);

        Prediction {
            probability,
            confidence: probability.max(1.0 - probability),
        }
    }

    /// Per-feature signed contributions toward the fraud class for one
    /// prediction: weight times standardized value. Reads only immutable
    /// state, so concurrent calls never interfere.
    pub fn contributions(&self, vector: &FeatureVector) -> ContributionMap {
        let row = self.standardized(vector);
        let mut map = ContributionMap::new();
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            map.insert(name.to_string(), self.weights[i] * row[i]);
        }
        map
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version.clone(),
            model_type: "logistic_regression".to_string(),
            feature_count: FEATURE_COUNT,
            trained_at: self.trained_at,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the model to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a model from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Shared, read-mostly classifier handle.
pub struct FraudClassifier {
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl FraudClassifier {
    /// Classifier with the shipped model loaded.
    pub fn new() -> Self {
        Self::with_model(TrainedModel::shipped())
    }

    /// Classifier with a specific model loaded.
    pub fn with_model(model: TrainedModel) -> Self {
        Self {
            model: RwLock::new(Some(Arc::new(model))),
        }
    }

    /// Classifier with no model; every prediction fails until one is
    /// published via [`FraudClassifier::replace`].
    pub fn unloaded() -> Self {
        Self {
            model: RwLock::new(None),
        }
    }

    /// Load a model from a file, falling back to the shipped model when the
    /// file is missing or unreadable.
    pub fn load_or_shipped<P: AsRef<Path>>(path: P) -> Self {
        match TrainedModel::load(&path) {
            Ok(model) => {
                info!("loaded model {} from file", model.version());
                Self::with_model(model)
            }
            Err(e) => {
                info!("model file not usable ({}), using shipped model", e);
                Self::new()
            }
        }
    }

    /// Snapshot of the currently loaded model. Callers that need more than
    /// one read from the same model (a prediction plus the version it came
    /// from, say) take the snapshot once and read everything from it, so a
    /// concurrent [`FraudClassifier::replace`] cannot split a request
    /// across two models.
    pub fn snapshot(&self) -> Result<Arc<TrainedModel>, ModelError> {
        self.model.read().clone().ok_or(ModelError::Unavailable)
    }

    /// Fraud probability and confidence for one vector.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction, ModelError> {
        Ok(self.snapshot()?.predict(vector))
    }

    /// Signed per-feature contributions for one vector.
    pub fn explain(&self, vector: &FeatureVector) -> Result<ContributionMap, ModelError> {
        Ok(self.snapshot()?.contributions(vector))
    }

    /// Version of the loaded model.
    pub fn version(&self) -> Result<String, ModelError> {
        Ok(self.snapshot()?.version().to_string())
    }

    /// Metadata about the loaded model.
    pub fn info(&self) -> Result<ModelInfo, ModelError> {
        Ok(self.snapshot()?.info())
    }

    /// Atomically publish a new model. In-flight predictions finish against
    /// the snapshot they already hold.
    pub fn replace(&self, model: TrainedModel) {
        let version = model.version().to_string();
        *self.model.write() = Some(Arc::new(model));
        info!("published model {}", version);
    }
}

impl Default for FraudClassifier {
    fn default() -> Self {
        Self::new()
    }
}
