//! Feedback samples for weight adaptation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::factors::ConfidenceFactors;

/// One confirmed/rejected outcome with the factors that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSample {
    pub equipment_id: String,
    pub signature_id: String,
    pub confirmed: bool,
    /// Confidence at the time of the assignment
    pub confidence: f64,
    pub factors: ConfidenceFactors,
    pub recorded_at: DateTime<Utc>,
}

impl LearningSample {
    pub fn new(
        equipment_id: impl Into<String>,
        signature_id: impl Into<String>,
        confirmed: bool,
        confidence: f64,
        factors: ConfidenceFactors,
    ) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            signature_id: signature_id.into(),
            confirmed,
            confidence,
            factors,
            recorded_at: Utc::now(),
        }
    }
}

/// Most-recent-N sample buffer
#[derive(Debug, Clone)]
pub struct LearningBuffer {
    samples: VecDeque<LearningSample>,
    capacity: usize,
}

impl LearningBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append, dropping the oldest sample when full
    pub fn push(&mut self, sample: LearningSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<LearningSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_most_recent() {
        let mut buffer = LearningBuffer::new(3);
        for i in 0..5 {
            buffer.push(LearningSample::new(
                format!("eq-{}", i),
                "sig",
                true,
                90.0,
                ConfidenceFactors::default(),
            ));
        }
        let ids: Vec<_> = buffer.snapshot().into_iter().map(|s| s.equipment_id).collect();
        assert_eq!(ids, vec!["eq-2", "eq-3", "eq-4"]);

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
