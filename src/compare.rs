//! Contract comparator
//!
//! Decides whether two contracts belong to the same project. Two calibrations
//! share the same metric set:
//!
//! - `threshold`: weighted metric scores are summed and compared against a
//!   cutoff (0.85 by default).
//! - `linear`: unit-weight metric scores form a feature vector fed to a
//!   trained linear decision function.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::analyze::ContractMeta;
use crate::metrics::{Metric, MetricKind, MetricTable};

/// Slack allowed when checking that weights do not exceed 1.0
const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("metric weights sum to {0}, above 1.0")]
    InvalidMetricWeights(f64),

    #[error("malformed fingerprint on contract {0}")]
    MalformedFingerprint(String),

    #[error("failed to read comparator config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid comparator config: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    #[default]
    Threshold,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    pub calibration: Calibration,
    /// Minimum weighted sum for the threshold calibration
    pub threshold: f64,
    /// Bound of the fingerprint edit distance
    pub edit_distance_threshold: usize,
    pub weights: MetricTable,
    pub coefficients: MetricTable,
    pub intercept: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::Threshold,
            threshold: 0.85,
            edit_distance_threshold: 5,
            weights: MetricTable::WEIGHTS,
            coefficients: MetricTable::COEFFICIENTS,
            intercept: -10.4,
        }
    }
}

impl ComparatorConfig {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompareError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Outcome of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub same: bool,
    /// Weighted sum, or decision value for the linear calibration
    pub score: f64,
    pub calibration: Calibration,
}

#[derive(Debug, Clone)]
pub struct Comparator {
    config: ComparatorConfig,
    metrics: Vec<Metric>,
}

impl Comparator {
    pub fn new(config: ComparatorConfig) -> Result<Self, CompareError> {
        let total = config.weights.sum();
        if total > 1.0 + WEIGHT_TOLERANCE {
            return Err(CompareError::InvalidMetricWeights(total));
        }

        let weights = match config.calibration {
            Calibration::Threshold => config.weights,
            Calibration::Linear => MetricTable::UNIT,
        };
        let metrics = MetricKind::ALL
            .iter()
            .map(|&kind| Metric::new(kind, weights.get(kind)))
            .collect();

        Ok(Self { config, metrics })
    }

    pub fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    /// Score `a` against `b` under the configured calibration.
    pub fn score(&self, a: &ContractMeta, b: &ContractMeta) -> Result<Score, CompareError> {
        for contract in [a, b] {
            if contract.fingerprint.as_ref().is_some_and(|fp| !fp.is_well_formed()) {
                return Err(CompareError::MalformedFingerprint(contract.address.clone()));
            }
        }

        let edit_threshold = self.config.edit_distance_threshold;
        let (score, same) = match self.config.calibration {
            Calibration::Threshold => {
                let mut total = 0.0;
                for metric in &self.metrics {
                    total += metric.compute(a, b, edit_threshold);
                    if total > 1.0 + WEIGHT_TOLERANCE {
                        return Err(CompareError::InvalidMetricWeights(total));
                    }
                }
                (total, total >= self.config.threshold)
            }
            Calibration::Linear => {
                let coefficients = self.config.coefficients;
                let decision = self
                    .metrics
                    .iter()
                    .map(|m| coefficients.get(m.kind) * m.compute(a, b, edit_threshold))
                    .sum::<f64>()
                    + self.config.intercept;
                (decision, decision > 0.0)
            }
        };

        trace!(a = %a.address, b = %b.address, score, same, "contracts_compared");
        Ok(Score {
            same,
            score,
            calibration: self.config.calibration,
        })
    }

    pub fn compare(&self, a: &ContractMeta, b: &ContractMeta) -> Result<bool, CompareError> {
        Ok(self.score(a, b)?.same)
    }

    /// Per-metric scores in metric order, for inspection.
    pub fn breakdown(&self, a: &ContractMeta, b: &ContractMeta) -> Vec<(&'static str, f64)> {
        let edit_threshold = self.config.edit_distance_threshold;
        self.metrics
            .iter()
            .map(|m| (m.kind.name(), m.compute(a, b, edit_threshold)))
            .collect()
    }
}
