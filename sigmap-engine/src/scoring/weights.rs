//! Factor weights and correlation-based adaptation
//!
//! `adapt_weights` is a pure function over an immutable sample slice; the
//! scorer keeps the result as a new `WeightState` version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::factors::{Factor, FACTOR_COUNT};
use super::learning::LearningSample;

/// name, count, type, vendor, equipment type, history, semantic, structural
pub const INITIAL_WEIGHTS: [f64; FACTOR_COUNT] = [0.25, 0.15, 0.20, 0.10, 0.10, 0.08, 0.07, 0.05];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights([f64; FACTOR_COUNT]);

impl Default for FactorWeights {
    fn default() -> Self {
        Self(INITIAL_WEIGHTS)
    }
}

impl FactorWeights {
    pub fn new(weights: [f64; FACTOR_COUNT]) -> Self {
        Self(weights)
    }

    pub fn as_array(&self) -> [f64; FACTOR_COUNT] {
        self.0
    }

    pub fn get(&self, factor: Factor) -> f64 {
        self.0[factor.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Rescaled to sum to 1; an all-zero vector stays unchanged
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum <= 0.0 {
            return *self;
        }
        Self(self.0.map(|w| w / sum))
    }
}

/// Versioned weight vector held by the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightState {
    pub version: u64,
    pub weights: FactorWeights,
    pub updated_at: DateTime<Utc>,
}

impl WeightState {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            version: 0,
            weights: FactorWeights::default(),
            updated_at: now,
        }
    }

    pub fn next(&self, weights: FactorWeights, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version + 1,
            weights,
            updated_at: now,
        }
    }
}

/// Pearson correlation; None when undefined (fewer than 2 values or zero variance)
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let sd_x = xs.iter().std_dev();
    let sd_y = ys.iter().std_dev();
    if !(sd_x > 0.0 && sd_y > 0.0) {
        return None;
    }
    let r = xs.iter().covariance(ys.iter()) / (sd_x * sd_y);
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Blend correlation-derived target weights into the current vector
///
/// For each factor the target weight is its |Pearson r| against the binary
/// outcome, normalized across factors. The result is
/// `rate * target + (1 - rate) * current`, renormalized to sum to 1.
///
/// Returns None with fewer than `min_samples` samples or when no factor
/// correlates with the outcome.
pub fn adapt_weights(
    samples: &[LearningSample],
    current: &FactorWeights,
    learning_rate: f64,
    min_samples: usize,
) -> Option<FactorWeights> {
    if samples.len() < min_samples || samples.is_empty() {
        return None;
    }

    let outcomes: Vec<f64> = samples
        .iter()
        .map(|s| if s.confirmed { 1.0 } else { 0.0 })
        .collect();

    let mut correlations = [0.0; FACTOR_COUNT];
    for factor in Factor::ALL {
        let values: Vec<f64> = samples.iter().map(|s| s.factors.get(factor)).collect();
        correlations[factor.index()] = pearson(&values, &outcomes).map_or(0.0, f64::abs);
    }

    let total: f64 = correlations.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let rate = learning_rate.clamp(0.0, 1.0);
    let current = current.as_array();
    let mut blended = [0.0; FACTOR_COUNT];
    for i in 0..FACTOR_COUNT {
        blended[i] = rate * (correlations[i] / total) + (1.0 - rate) * current[i];
    }
    Some(FactorWeights(blended).normalized())
}
