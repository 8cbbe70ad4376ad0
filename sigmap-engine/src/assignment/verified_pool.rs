//! Verified-signature pool
//!
//! Signatures whose history qualifies them for unattended assignment.
//! Rebuilt from persisted analytics; entries leave the pool when their
//! success rate falls or the error tracker evicts them.

use chrono::{DateTime, Utc};
use sigmap_common::models::{Signature, SignatureAnalytics};
use std::collections::BTreeMap;

use super::types::VerifiedSignature;

const ACCURACY_SHARE: f64 = 0.4;
const USAGE_SHARE: f64 = 0.3;
const FEEDBACK_SHARE: f64 = 0.3;
const USAGE_CAP: u64 = 100;
const NEUTRAL_FEEDBACK: f64 = 50.0;

/// accuracy×40% + usage (capped at 100)×30% + positive feedback ratio×30%
///
/// Every term is on a 0-100 scale; a signature without feedback gets the
/// neutral 50 for the last term.
pub fn verification_score(analytics: &SignatureAnalytics) -> f64 {
    let accuracy = analytics.accuracy * 100.0;
    let usage = analytics.usage_frequency.min(USAGE_CAP) as f64;
    let feedback = analytics
        .positive_feedback_ratio()
        .map_or(NEUTRAL_FEEDBACK, |ratio| ratio * 100.0);

    accuracy * ACCURACY_SHARE + usage * USAGE_SHARE + feedback * FEEDBACK_SHARE
}

/// Pool entry rule
pub fn qualifies(analytics: &SignatureAnalytics, min_success_rate: f64, min_confirmations: u64) -> bool {
    analytics.has_history()
        && analytics.accuracy >= min_success_rate
        && analytics.positive_feedback >= min_confirmations
}

#[derive(Debug, Default)]
pub struct VerifiedPool {
    entries: BTreeMap<String, VerifiedSignature>,
}

impl VerifiedPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute one signature's entry; returns whether it is in the pool
    pub fn refresh(
        &mut self,
        signature: &Signature,
        analytics: &SignatureAnalytics,
        min_success_rate: f64,
        min_confirmations: u64,
        now: DateTime<Utc>,
    ) -> bool {
        if !qualifies(analytics, min_success_rate, min_confirmations) {
            self.entries.remove(&signature.id);
            return false;
        }
        self.entries.insert(
            signature.id.clone(),
            VerifiedSignature {
                signature: signature.clone(),
                verification_score: verification_score(analytics),
                success_rate: analytics.accuracy,
                last_verified: now,
                confirmation_count: analytics.positive_feedback,
            },
        );
        true
    }

    pub fn get(&self, signature_id: &str) -> Option<&VerifiedSignature> {
        self.entries.get(signature_id)
    }

    pub fn contains(&self, signature_id: &str) -> bool {
        self.entries.contains_key(signature_id)
    }

    /// Returns the evicted entry, if there was one
    pub fn evict(&mut self, signature_id: &str) -> Option<VerifiedSignature> {
        self.entries.remove(signature_id)
    }

    /// Entries sorted by verification score, highest first
    pub fn sorted(&self) -> Vec<VerifiedSignature> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.verification_score
                .total_cmp(&a.verification_score)
                .then_with(|| a.signature.id.cmp(&b.signature.id))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigmap_common::models::SignatureSource;

    fn analytics(confirmed: u64, rejected: u64, usage: u64) -> SignatureAnalytics {
        let now = Utc::now();
        let mut a = SignatureAnalytics::new("sig-1");
        for _ in 0..confirmed {
            a.record_outcome(true, 96.0, now);
        }
        for _ in 0..rejected {
            a.record_outcome(false, 96.0, now);
        }
        for _ in 0..usage {
            a.record_usage(now);
        }
        a
    }

    #[test]
    fn score_uses_neutral_feedback_without_history() {
        let a = SignatureAnalytics::new("sig-1");
        assert!((verification_score(&a) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn score_combines_accuracy_usage_and_feedback() {
        // accuracy 0.75, usage 200 capped at 100, feedback ratio 0.75
        let a = analytics(3, 1, 200);
        let expected = 75.0 * 0.4 + 100.0 * 0.3 + 75.0 * 0.3;
        assert!((verification_score(&a) - expected).abs() < 1e-9);
    }

    #[test]
    fn entry_needs_rate_and_confirmations() {
        let sig = Signature::new("sig-1", "VAV", "VAV", vec![], SignatureSource::UserCreated);
        let mut pool = VerifiedPool::new();
        let now = Utc::now();

        assert!(!pool.refresh(&sig, &analytics(2, 0, 2), 0.85, 3, now));
        assert!(pool.refresh(&sig, &analytics(3, 0, 3), 0.85, 3, now));
        assert_eq!(pool.get("sig-1").map(|v| v.confirmation_count), Some(3));

        // 3 of 4 = 0.75 drops below the success rate
        assert!(!pool.refresh(&sig, &analytics(3, 1, 4), 0.85, 3, now));
        assert!(pool.is_empty());
    }

    #[test]
    fn sorted_by_score_descending() {
        let now = Utc::now();
        let mut pool = VerifiedPool::new();
        let low = Signature::new("a", "A", "VAV", vec![], SignatureSource::UserCreated);
        let high = Signature::new("b", "B", "VAV", vec![], SignatureSource::UserCreated);
        pool.refresh(&low, &analytics(3, 0, 1), 0.85, 3, now);
        pool.refresh(&high, &analytics(3, 0, 50), 0.85, 3, now);

        let ids: Vec<_> = pool.sorted().into_iter().map(|v| v.signature.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
