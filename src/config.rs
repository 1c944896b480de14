// ⚙️ Configuration - Duplicate detection and parallel execution settings
// Partial JSON documents merge over the documented defaults; validation never
// silently corrects a bad value.

use crate::error::{AnalysisError, Result};
use crate::similarity::{CompositeWeights, TextAlgorithm, WEIGHT_EPSILON};
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// FIELD WEIGHTS
// ============================================================================

/// Contribution of each field to the overall duplicate score; must sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub text: f64,
    pub amount: f64,
    pub date: f64,
    pub category: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        FieldWeights {
            text: 0.4,
            amount: 0.3,
            date: 0.2,
            category: 0.1,
        }
    }
}

impl FieldWeights {
    pub fn sum(&self) -> f64 {
        self.text + self.amount + self.date + self.category
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.text, self.amount, self.date, self.category];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "field weights must be finite and non-negative".to_string(),
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(AnalysisError::InvalidWeights { sum });
        }
        Ok(())
    }
}

// ============================================================================
// DETECTION CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum overall score for a pair to count as a duplicate (default: 0.85)
    pub threshold: f64,

    /// Per-field weights (default: 0.4 / 0.3 / 0.2 / 0.1)
    pub weights: FieldWeights,

    /// Relative amount tolerance (default: 0.02 = 2%)
    pub amount_tolerance: f64,

    /// Date tolerance in days (default: 3)
    pub date_tolerance_days: f64,

    /// Algorithm used for the text field (default: composite)
    pub text_algorithm: TextAlgorithm,

    /// Blend used when `text_algorithm` is composite
    pub composite_weights: CompositeWeights,

    /// Never pair an income with an expense (default: true)
    pub require_same_type: bool,

    /// Only pair records with equal categories (default: false)
    pub require_same_category: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            threshold: 0.85,
            weights: FieldWeights::default(),
            amount_tolerance: 0.02,
            date_tolerance_days: 3.0,
            text_algorithm: TextAlgorithm::Composite,
            composite_weights: CompositeWeights::default(),
            require_same_type: true,
            require_same_category: false,
        }
    }
}

impl DetectionConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep defaults
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: DetectionConfig =
            serde_json::from_str(json).context("Failed to parse detection config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_json(&content)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_weights(mut self, weights: FieldWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_amount_tolerance(mut self, tolerance: f64) -> Self {
        self.amount_tolerance = tolerance;
        self
    }

    pub fn with_date_tolerance_days(mut self, days: f64) -> Self {
        self.date_tolerance_days = days;
        self
    }

    pub fn with_text_algorithm(mut self, algorithm: TextAlgorithm) -> Self {
        self.text_algorithm = algorithm;
        self
    }

    pub fn with_require_same_type(mut self, required: bool) -> Self {
        self.require_same_type = required;
        self
    }

    pub fn with_require_same_category(mut self, required: bool) -> Self {
        self.require_same_category = required;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AnalysisError::InvalidConfig(format!(
                "threshold must be within [0, 1] (got {})",
                self.threshold
            )));
        }
        if !(self.amount_tolerance.is_finite() && self.amount_tolerance > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "amount_tolerance must be positive (got {})",
                self.amount_tolerance
            )));
        }
        if !(self.date_tolerance_days.is_finite() && self.date_tolerance_days > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "date_tolerance_days must be positive (got {})",
                self.date_tolerance_days
            )));
        }
        self.weights.validate()?;
        if self.text_algorithm == TextAlgorithm::Composite {
            self.composite_weights.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// PARALLEL OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    /// Records per chunk (default: 100)
    pub chunk_size: usize,

    /// Maximum chunks processed at the same time (default: 4)
    pub max_concurrency: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        ParallelOptions {
            chunk_size: 100,
            max_concurrency: 4,
        }
    }
}

impl ParallelOptions {
    pub fn new(chunk_size: usize, max_concurrency: usize) -> Self {
        ParallelOptions {
            chunk_size,
            max_concurrency,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AnalysisError::InvalidConfig("chunk_size must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
