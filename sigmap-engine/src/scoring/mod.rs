//! Confidence scoring engine
//!
//! Compares one equipment's point set with one signature through eight
//! factors, aggregates them with an adaptive weight vector and decides
//! auto-assignment eligibility.
//!
//! **Aggregation:** weighted average over the factors that are > 0, with the
//! weights renormalized over those factors only.
//!
//! **Learning:** every feedback outcome becomes a `LearningSample`; once
//! enough samples exist each new sample re-derives the weights from the
//! factor/outcome correlations (see `weights::adapt_weights`).

pub mod factors;
pub mod learning;
pub mod reasoning;
pub mod similarity;
pub mod weights;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sigmap_common::config::ScoringConfig;
use sigmap_common::events::{EngineEvent, EventBus};
use sigmap_common::models::{Equipment, LearningData, Signature, SignatureAnalytics};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info};

use crate::db::SignatureRepository;
use crate::units::units_match;
use factors::ConfidenceFactors;
use learning::{LearningBuffer, LearningSample};
use similarity::{
    best_match, bucket_counts, count_ratio, equipment_type_score, jaccard, keyword_set, Bucket,
};
use weights::{adapt_weights, WeightState};

const KIND_SHARE: f64 = 0.6;
const UNIT_SHARE: f64 = 0.4;
const EQUAL_COUNT_BONUS: f64 = 10.0;
const VENDOR_BONUS: f64 = 30.0;
const MODEL_BONUS: f64 = 20.0;
const NEUTRAL_HISTORY: f64 = 50.0;
const SEMANTIC_MATCH_THRESHOLD: f64 = 0.5;
const BUCKET_SHARE: f64 = 25.0;

/// Score of one (equipment, signature) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMatchResult {
    pub signature_id: String,
    pub signature_name: String,
    /// 0-100
    pub confidence: f64,
    pub factors: ConfidenceFactors,
    pub reasoning: Vec<String>,
    pub auto_assignment_eligible: bool,
}

/// Confidence scorer with versioned adaptive weights
#[derive(Debug)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
    weights: RwLock<WeightState>,
    samples: Mutex<LearningBuffer>,
    events: EventBus,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig, events: EventBus) -> Self {
        let samples = LearningBuffer::new(config.max_learning_samples);
        Self {
            config,
            weights: RwLock::new(WeightState::initial(Utc::now())),
            samples: Mutex::new(samples),
            events,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score an equipment against a signature
    ///
    /// Pure given its arguments and the current weights; `analytics` is the
    /// signature's persisted history, if any.
    pub fn score(
        &self,
        equipment: &Equipment,
        signature: &Signature,
        analytics: Option<&SignatureAnalytics>,
    ) -> SignatureMatchResult {
        let factors = self.compute_factors(equipment, signature, analytics);
        let confidence = self.aggregate(&factors);
        let eligible = self.is_auto_assignment_eligible(confidence);
        let has_history = analytics.map_or(false, SignatureAnalytics::has_history);
        let reasoning = reasoning::explain(
            &factors,
            has_history,
            confidence,
            self.config.auto_assignment_threshold,
        );

        debug!(
            equipment_id = %equipment.id,
            signature_id = %signature.id,
            confidence,
            eligible,
            "Scored signature"
        );

        SignatureMatchResult {
            signature_id: signature.id.clone(),
            signature_name: signature.name.clone(),
            confidence,
            factors,
            reasoning,
            auto_assignment_eligible: eligible,
        }
    }

    pub fn compute_factors(
        &self,
        equipment: &Equipment,
        signature: &Signature,
        analytics: Option<&SignatureAnalytics>,
    ) -> ConfidenceFactors {
        ConfidenceFactors {
            point_name_similarity: self.point_name_similarity(equipment, signature),
            point_count_match: point_count_match(equipment, signature),
            point_type_match: self.point_type_match(equipment, signature),
            vendor_model_match: vendor_model_match(equipment, analytics),
            equipment_type_match: equipment_type_score(
                &equipment.equipment_type,
                &signature.equipment_type,
            ),
            historical_accuracy: historical_accuracy(analytics),
            semantic_similarity: semantic_similarity(equipment, signature),
            structural_consistency: structural_consistency(equipment, signature),
        }
        .clamped()
    }

    /// Weighted average of the non-zero factors under the current weights
    pub fn aggregate(&self, factors: &ConfidenceFactors) -> f64 {
        let weights = self.current_weights().weights.as_array();
        let values = factors.to_array();

        let (weighted, weight_sum) = values
            .iter()
            .zip(weights.iter())
            .filter(|(value, _)| **value > 0.0)
            .fold((0.0, 0.0), |(acc, sum), (value, weight)| {
                (acc + value * weight, sum + weight)
            });

        if weight_sum <= 0.0 {
            return 0.0;
        }
        (weighted / weight_sum).clamp(0.0, 100.0)
    }

    pub fn is_auto_assignment_eligible(&self, confidence: f64) -> bool {
        confidence >= self.config.auto_assignment_threshold
    }

    pub fn current_weights(&self) -> WeightState {
        self.weights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sample_count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Record a feedback outcome
    ///
    /// Appends a learning sample, updates the signature's persisted analytics
    /// and learning data, and adapts the weights once enough samples exist.
    /// Returns the new weight state when the weights changed.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn record_feedback(
        &self,
        repo: &dyn SignatureRepository,
        sample: LearningSample,
    ) -> sigmap_common::Result<Option<WeightState>> {
        let now = Utc::now();
        self.record_outcome(repo, &sample.signature_id, sample.confirmed, sample.confidence)
            .await?;

        let snapshot = {
            let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
            samples.push(sample);
            samples.snapshot()
        };

        let current = self.current_weights();
        let adapted = adapt_weights(
            &snapshot,
            &current.weights,
            self.config.learning_rate,
            self.config.min_learning_samples,
        );

        let Some(new_weights) = adapted else {
            return Ok(None);
        };
        if new_weights == current.weights {
            return Ok(None);
        }

        let state = {
            let mut guard = self.weights.write().unwrap_or_else(PoisonError::into_inner);
            *guard = guard.next(new_weights, now);
            guard.clone()
        };

        info!(
            version = state.version,
            samples = snapshot.len(),
            "Adapted factor weights"
        );
        self.events.emit_lossy(EngineEvent::WeightsAdapted {
            version: state.version,
            weights: state.weights.as_array(),
            sample_count: snapshot.len(),
            timestamp: now,
        });
        Ok(Some(state))
    }

    /// Persist an outcome on the signature's analytics and learning data
    ///
    /// Does not touch the weight model; `record_feedback` calls this first.
    pub async fn record_outcome(
        &self,
        repo: &dyn SignatureRepository,
        signature_id: &str,
        confirmed: bool,
        confidence: f64,
    ) -> sigmap_common::Result<SignatureAnalytics> {
        let now = Utc::now();

        let mut analytics = repo
            .get_analytics(signature_id)
            .await?
            .unwrap_or_else(|| SignatureAnalytics::new(signature_id));
        analytics.record_outcome(confirmed, confidence, now);
        repo.save_analytics(&analytics).await?;

        if let Some(mut signature) = repo.get_signature(signature_id).await? {
            signature
                .learning
                .get_or_insert_with(|| LearningData::new(now))
                .record(confirmed, now);
            repo.update_signature(&signature).await?;
        }
        Ok(analytics)
    }

    /// Count a signature use (assignment made)
    pub async fn record_usage(
        &self,
        repo: &dyn SignatureRepository,
        signature_id: &str,
    ) -> sigmap_common::Result<SignatureAnalytics> {
        let mut analytics = repo
            .get_analytics(signature_id)
            .await?
            .unwrap_or_else(|| SignatureAnalytics::new(signature_id));
        analytics.record_usage(Utc::now());
        repo.save_analytics(&analytics).await?;
        Ok(analytics)
    }

    /// Drop samples and restore the initial weights
    pub fn reset_learning(&self) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.weights.write().unwrap_or_else(PoisonError::into_inner) =
            WeightState::initial(Utc::now());
        info!("Learning state reset");
    }

    /// Mean best-match similarity over templates whose best match clears the threshold
    fn point_name_similarity(&self, equipment: &Equipment, signature: &Signature) -> f64 {
        let matched: Vec<f64> = signature
            .points
            .iter()
            .filter_map(|template| best_match(template, &equipment.points))
            .map(|(_, similarity)| similarity)
            .filter(|similarity| *similarity > self.config.name_match_threshold)
            .collect();

        if matched.is_empty() {
            return 0.0;
        }
        matched.iter().sum::<f64>() / matched.len() as f64 * 100.0
    }

    /// Kind (60%) and unit (40%) agreement over confidently paired points
    fn point_type_match(&self, equipment: &Equipment, signature: &Signature) -> f64 {
        let pairs: Vec<_> = signature
            .points
            .iter()
            .filter_map(|template| {
                best_match(template, &equipment.points)
                    .filter(|(_, similarity)| *similarity > self.config.type_match_threshold)
                    .map(|(point, _)| (template, point))
            })
            .collect();

        if pairs.is_empty() {
            return 0.0;
        }
        let total = pairs.len() as f64;
        let kinds = pairs.iter().filter(|(t, p)| t.kind == p.kind).count() as f64;
        let units = pairs
            .iter()
            .filter(|(t, p)| units_match(t.unit.as_deref(), p.unit.as_deref()))
            .count() as f64;

        (kinds / total * KIND_SHARE + units / total * UNIT_SHARE) * 100.0
    }
}

fn point_count_match(equipment: &Equipment, signature: &Signature) -> f64 {
    let (a, b) = (equipment.points.len(), signature.points.len());
    let ratio = count_ratio(a, b) * 100.0;
    if a == b && a > 0 {
        (ratio + EQUAL_COUNT_BONUS).min(100.0)
    } else {
        ratio
    }
}

/// Presence bonus, only once the signature has analytics
fn vendor_model_match(equipment: &Equipment, analytics: Option<&SignatureAnalytics>) -> f64 {
    if analytics.is_none() {
        return 0.0;
    }
    let mut score = 0.0;
    if equipment.vendor.as_deref().map_or(false, |v| !v.is_empty()) {
        score += VENDOR_BONUS;
    }
    if equipment.model.as_deref().map_or(false, |m| !m.is_empty()) {
        score += MODEL_BONUS;
    }
    score
}

fn historical_accuracy(analytics: Option<&SignatureAnalytics>) -> f64 {
    match analytics {
        Some(a) if a.has_history() => a.accuracy * 100.0,
        _ => NEUTRAL_HISTORY,
    }
}

/// Share of templates whose keyword set overlaps some point's by more than half
fn semantic_similarity(equipment: &Equipment, signature: &Signature) -> f64 {
    if signature.points.is_empty() || equipment.points.is_empty() {
        return 0.0;
    }
    let point_keywords: Vec<_> = equipment
        .points
        .iter()
        .map(|p| keyword_set(p.display_name()))
        .collect();

    let matched = signature
        .points
        .iter()
        .filter(|template| {
            let template_keywords = keyword_set(&template.label);
            point_keywords
                .iter()
                .any(|k| jaccard(&template_keywords, k) > SEMANTIC_MATCH_THRESHOLD)
        })
        .count();

    matched as f64 / signature.points.len() as f64 * 100.0
}

/// Per-bucket count agreement, 25 points per bucket
fn structural_consistency(equipment: &Equipment, signature: &Signature) -> f64 {
    if signature.points.is_empty() || equipment.points.is_empty() {
        return 0.0;
    }
    let ours = bucket_counts(
        equipment
            .points
            .iter()
            .map(|p| Bucket::classify(p.display_name(), p.writable)),
    );
    let theirs = bucket_counts(
        signature
            .points
            .iter()
            .map(|t| Bucket::classify(&t.label, false)),
    );

    ours.iter()
        .zip(theirs.iter())
        .map(|(&a, &b)| {
            if a == 0 && b == 0 {
                BUCKET_SHARE
            } else {
                count_ratio(a, b) * BUCKET_SHARE
            }
        })
        .sum()
}
