//! Per-signature error-rate tracking

use std::collections::BTreeMap;

use super::types::ErrorRateAlert;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    pub attempts: u64,
    pub errors: u64,
}

impl ErrorCounts {
    pub fn error_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.errors as f64 / self.attempts as f64
        }
    }
}

/// Attempts and errors per signature
///
/// An attempt is any outcome-bearing event (feedback, rollback); an error
/// is a rollback or a rejection.
#[derive(Debug, Default)]
pub struct ErrorRateTracker {
    counts: BTreeMap<String, ErrorCounts>,
}

impl ErrorRateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt, returning the updated counts
    pub fn record(&mut self, signature_id: &str, is_error: bool) -> ErrorCounts {
        let counts = self.counts.entry(signature_id.to_string()).or_default();
        counts.attempts += 1;
        if is_error {
            counts.errors += 1;
        }
        *counts
    }

    pub fn counts(&self, signature_id: &str) -> ErrorCounts {
        self.counts.get(signature_id).copied().unwrap_or_default()
    }

    pub fn error_rate(&self, signature_id: &str) -> f64 {
        self.counts(signature_id).error_rate()
    }

    /// Signatures over `threshold` with at least `min_attempts` attempts
    pub fn alerts(&self, threshold: f64, min_attempts: u64) -> Vec<ErrorRateAlert> {
        self.counts
            .iter()
            .filter(|(_, c)| c.attempts >= min_attempts && c.error_rate() > threshold)
            .map(|(id, c)| ErrorRateAlert {
                signature_id: id.clone(),
                error_rate: c.error_rate(),
                attempts: c.attempts,
                errors: c.errors,
            })
            .collect()
    }

    pub fn remove(&mut self, signature_id: &str) {
        self.counts.remove(signature_id);
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
