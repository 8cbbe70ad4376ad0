//! Auto-assignment orchestrator
//!
//! Turns confidence scores into assign / skip / rollback decisions.
//!
//! Pair lifecycle: `pending → assigned → rolled_back`. An assigned pair may
//! carry one feedback verdict without changing status; it only reaches
//! `rolled_back` through an explicit rollback.
//!
//! Unattended assignment needs all of:
//! - the best candidate is eligible (confidence >= auto-assignment threshold)
//! - the candidate is in the verified pool
//! - its success rate is still >= the configured minimum
//!
//! Owned state (verified pool, error tracker, audit log) lives on the
//! orchestrator instance; persistence goes through `SignatureRepository`.
//! Every pair-state transition (assign, rollback, feedback) reads and writes
//! under one orchestrator-wide lock, so concurrent callers see each other's
//! writes.

pub mod audit;
pub mod error_tracker;
pub mod types;
pub mod verified_pool;

use chrono::Utc;
use sigmap_common::config::{AssignmentConfig, EngineConfig};
use sigmap_common::events::{EngineEvent, EventBus};
use sigmap_common::models::{Equipment, Signature, SignatureAnalytics};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{AssignmentFilter, SignatureRepository};
use crate::error::{AssignmentError, Result};
use crate::scoring::factors::ConfidenceFactors;
use crate::scoring::learning::LearningSample;
use crate::scoring::{ConfidenceScorer, SignatureMatchResult};
use audit::{AuditAction, AuditEntry, AuditLog, AuditQuery};
use error_tracker::ErrorRateTracker;
use types::{
    AssignmentMetadata, AssignmentStatus, AutoAssignmentResult, BatchOptions, BatchResult,
    BatchSummary, PerformanceMetrics, ProcessOptions, Recommendation, SkippedEquipment,
    UserFeedback, VerifiedSignature, SKIP_ALREADY_ASSIGNED, SKIP_BATCH_LIMIT, SKIP_NO_MATCH,
};
use verified_pool::VerifiedPool;

/// Outcome of evaluating one equipment item
#[derive(Debug)]
enum Decision {
    Assigned(AutoAssignmentResult),
    AlreadyAssigned,
    NoMatch,
}

/// Auto-assignment orchestrator service
pub struct AutoAssignmentOrchestrator {
    repo: Arc<dyn SignatureRepository>,
    scorer: ConfidenceScorer,
    config: AssignmentConfig,
    event_bus: EventBus,
    pool: RwLock<VerifiedPool>,
    tracker: Mutex<ErrorRateTracker>,
    audit: Mutex<AuditLog>,
    /// Held across each check-then-write of assignment state
    transitions: Mutex<()>,
}

impl AutoAssignmentOrchestrator {
    pub fn new(
        repo: Arc<dyn SignatureRepository>,
        scorer: ConfidenceScorer,
        config: AssignmentConfig,
        event_bus: EventBus,
    ) -> Self {
        let audit = AuditLog::new(config.audit_log_capacity);
        Self {
            repo,
            scorer,
            config,
            event_bus,
            pool: RwLock::new(VerifiedPool::new()),
            tracker: Mutex::new(ErrorRateTracker::new()),
            audit: Mutex::new(audit),
            transitions: Mutex::new(()),
        }
    }

    /// Build the scorer and orchestrator from one engine configuration
    pub fn from_config(
        repo: Arc<dyn SignatureRepository>,
        config: &EngineConfig,
        event_bus: EventBus,
    ) -> Self {
        let scorer = ConfidenceScorer::new(config.scoring.clone(), event_bus.clone());
        Self::new(repo, scorer, config.assignment.clone(), event_bus)
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn SignatureRepository> {
        &self.repo
    }

    /// Rebuild the verified pool from persisted analytics
    ///
    /// # Errors
    /// Store failures.
    pub async fn initialize(&self) -> Result<()> {
        let size = self.update_signature_learning().await?;
        info!(verified_pool_size = size, "Auto-assignment orchestrator initialized");
        Ok(())
    }

    /// Decide and (unless dry-run) persist an assignment for one equipment
    ///
    /// Returns `Ok(None)` when the equipment already has an active
    /// assignment, no candidate qualifies, or scoring failed internally.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn process_equipment(
        &self,
        equipment: &Equipment,
        options: &ProcessOptions,
    ) -> Result<Option<AutoAssignmentResult>> {
        match self.evaluate(equipment, options.dry_run, options.user_id.as_deref()).await? {
            Decision::Assigned(result) => Ok(Some(result)),
            Decision::AlreadyAssigned | Decision::NoMatch => Ok(None),
        }
    }

    /// Process a list in order, honoring `max_assignments`
    ///
    /// # Errors
    /// Store failures abort the batch; everything else becomes a skip.
    pub async fn batch_process_equipment(
        &self,
        equipment: &[Equipment],
        options: &BatchOptions,
    ) -> Result<BatchResult> {
        let mut assigned = Vec::new();
        let mut skipped = Vec::new();

        for item in equipment {
            let limit_reached = options
                .max_assignments
                .map_or(false, |max| assigned.len() >= max);
            if limit_reached {
                skipped.push(SkippedEquipment {
                    equipment_id: item.id.clone(),
                    reason: SKIP_BATCH_LIMIT.to_string(),
                });
                continue;
            }

            match self.evaluate(item, options.dry_run, options.user_id.as_deref()).await? {
                Decision::Assigned(result) => assigned.push(result),
                Decision::AlreadyAssigned => skipped.push(SkippedEquipment {
                    equipment_id: item.id.clone(),
                    reason: SKIP_ALREADY_ASSIGNED.to_string(),
                }),
                Decision::NoMatch => skipped.push(SkippedEquipment {
                    equipment_id: item.id.clone(),
                    reason: SKIP_NO_MATCH.to_string(),
                }),
            }

            tokio::task::yield_now().await;
        }

        let average_confidence = if assigned.is_empty() {
            0.0
        } else {
            assigned.iter().map(|a| a.confidence).sum::<f64>() / assigned.len() as f64
        };
        let summary = BatchSummary {
            total: equipment.len(),
            assigned: assigned.len(),
            skipped: skipped.len(),
            average_confidence,
        };

        info!(
            total = summary.total,
            assigned = summary.assigned,
            skipped = summary.skipped,
            dry_run = options.dry_run,
            "Batch auto-assignment complete"
        );

        Ok(BatchResult {
            assigned,
            skipped,
            summary,
        })
    }

    /// Record a user-made assignment
    ///
    /// The factor snapshot is stored so later feedback can train the weights
    /// and bootstrap the verified pool.
    ///
    /// # Errors
    /// `NotFound` for unknown equipment or signature, `Conflict` when the
    /// equipment already has an active assignment.
    pub async fn assign_manually(
        &self,
        equipment_id: &str,
        signature_id: &str,
        user_id: &str,
    ) -> Result<AutoAssignmentResult> {
        let _transition = self.transitions.lock().await;
        let equipment = self
            .repo
            .get_equipment(equipment_id)
            .await?
            .ok_or_else(|| AssignmentError::NotFound(format!("equipment {equipment_id}")))?;
        let signature = self
            .repo
            .get_signature(signature_id)
            .await?
            .ok_or_else(|| AssignmentError::NotFound(format!("signature {signature_id}")))?;

        if self.has_active_assignment(equipment_id).await? {
            return Err(AssignmentError::Conflict(format!(
                "equipment {equipment_id} already has an active assignment"
            )));
        }

        let analytics = self.repo.get_analytics(signature_id).await?;
        let scored = self.scorer.score(&equipment, &signature, analytics.as_ref());

        let result = AutoAssignmentResult {
            id: Uuid::new_v4(),
            equipment_id: equipment_id.to_string(),
            signature_id: signature_id.to_string(),
            confidence: scored.confidence,
            reasoning: scored.reasoning,
            status: AssignmentStatus::Assigned,
            timestamp: Utc::now(),
            auto_assigned: false,
            requires_review: false,
            feedback: None,
            metadata: Some(AssignmentMetadata {
                factors: Some(scored.factors),
                assigned_by: Some(user_id.to_string()),
                ..Default::default()
            }),
        };

        self.commit_assignment(&result, Some("manual assignment")).await?;
        Ok(result)
    }

    /// Reverse the active assignment of a pair
    ///
    /// # Errors
    /// `Conflict` when rollback is disabled or the pair has no active
    /// assignment, `NotFound` when the pair was never assigned. Nothing is
    /// mutated on error.
    pub async fn rollback_assignment(
        &self,
        equipment_id: &str,
        signature_id: &str,
        reason: &str,
        user_id: &str,
    ) -> Result<AutoAssignmentResult> {
        if !self.config.rollback_enabled {
            return Err(AssignmentError::Conflict("rollback is disabled".to_string()));
        }
        let _transition = self.transitions.lock().await;

        let history = self
            .repo
            .list_assignments(&AssignmentFilter::for_pair(equipment_id, signature_id))
            .await?;
        if history.is_empty() {
            return Err(AssignmentError::NotFound(format!(
                "assignment {equipment_id} -> {signature_id}"
            )));
        }
        let mut assignment = history
            .into_iter()
            .rev()
            .find(AutoAssignmentResult::is_active)
            .ok_or_else(|| {
                AssignmentError::Conflict(format!(
                    "no active assignment {equipment_id} -> {signature_id}"
                ))
            })?;

        let now = Utc::now();
        assignment.status = AssignmentStatus::RolledBack;
        let metadata = assignment.metadata.get_or_insert_with(Default::default);
        metadata.rollback_reason = Some(reason.to_string());
        metadata.rolled_back_at = Some(now);
        metadata.rolled_back_by = Some(user_id.to_string());
        self.repo.save_assignment(&assignment).await?;

        self.learn_from_outcome(&assignment, false).await?;
        self.track_outcome(signature_id, true).await;
        self.refresh_pool_entry(signature_id).await?;

        self.audit
            .lock()
            .await
            .append(
                AuditEntry::new(AuditAction::Rollback, equipment_id, signature_id)
                    .by(Some(user_id))
                    .with_confidence(assignment.confidence)
                    .with_details(reason),
            );
        self.event_bus.emit_lossy(EngineEvent::AssignmentRolledBack {
            assignment_id: assignment.id,
            equipment_id: equipment_id.to_string(),
            signature_id: signature_id.to_string(),
            reason: reason.to_string(),
            user_id: user_id.to_string(),
            timestamp: now,
        });
        info!(
            equipment_id,
            signature_id,
            user_id,
            reason,
            "Assignment rolled back"
        );

        Ok(assignment)
    }

    /// Attach a confirm/reject verdict to the pair's active assignment
    ///
    /// # Errors
    /// `NotFound` when the pair was never assigned, `Conflict` when it has no
    /// active assignment or feedback was already recorded. Nothing is
    /// mutated on error.
    pub async fn record_user_feedback(
        &self,
        equipment_id: &str,
        signature_id: &str,
        confirmed: bool,
        user_id: &str,
        notes: Option<&str>,
    ) -> Result<AutoAssignmentResult> {
        let _transition = self.transitions.lock().await;
        let history = self
            .repo
            .list_assignments(&AssignmentFilter::for_pair(equipment_id, signature_id))
            .await?;
        if history.is_empty() {
            return Err(AssignmentError::NotFound(format!(
                "assignment {equipment_id} -> {signature_id}"
            )));
        }
        let mut assignment = history
            .into_iter()
            .rev()
            .find(AutoAssignmentResult::is_active)
            .ok_or_else(|| {
                AssignmentError::Conflict(format!(
                    "no active assignment {equipment_id} -> {signature_id}"
                ))
            })?;

        if assignment.feedback.is_some() {
            return Err(AssignmentError::Conflict(format!(
                "feedback already recorded for assignment {}",
                assignment.id
            )));
        }

        let now = Utc::now();
        assignment.feedback = Some(UserFeedback {
            confirmed,
            user_id: user_id.to_string(),
            timestamp: now,
            notes: notes.map(str::to_string),
        });
        self.repo.save_assignment(&assignment).await?;

        self.learn_from_outcome(&assignment, confirmed).await?;
        self.track_outcome(signature_id, !confirmed).await;
        self.refresh_pool_entry(signature_id).await?;

        let verdict = if confirmed { "confirmed" } else { "rejected" };
        let details = match notes {
            Some(notes) => format!("{verdict}: {notes}"),
            None => verdict.to_string(),
        };
        self.audit.lock().await.append(
            AuditEntry::new(AuditAction::Feedback, equipment_id, signature_id)
                .by(Some(user_id))
                .with_confidence(assignment.confidence)
                .with_details(details),
        );
        self.event_bus.emit_lossy(EngineEvent::FeedbackRecorded {
            assignment_id: assignment.id,
            equipment_id: equipment_id.to_string(),
            signature_id: signature_id.to_string(),
            confirmed,
            user_id: user_id.to_string(),
            timestamp: now,
        });
        info!(equipment_id, signature_id, confirmed, user_id, "Feedback recorded");

        Ok(assignment)
    }

    /// Learning cycle: rebuild the verified pool and apply error-rate evictions
    ///
    /// Returns the pool size afterwards.
    pub async fn update_signature_learning(&self) -> Result<usize> {
        let signatures = self.repo.list_signatures().await?;
        let analytics = self.analytics_by_signature().await?;
        let now = Utc::now();

        {
            let mut pool = self.pool.write().await;
            pool.clear();
            for signature in &signatures {
                if let Some(a) = analytics.get(&signature.id) {
                    pool.refresh(
                        signature,
                        a,
                        self.config.min_success_rate,
                        self.config.min_confirmations,
                        now,
                    );
                }
            }
        }

        let alerts = self.tracker.lock().await.alerts(
            self.config.error_rate_alert_threshold,
            self.config.error_rate_min_attempts,
        );
        for alert in alerts {
            self.raise_alert(&alert.signature_id, alert.error_rate, alert.attempts);
            if alert.error_rate > self.config.eviction_error_rate {
                self.evict(&alert.signature_id, alert.error_rate).await;
            }
        }

        let size = self.pool.read().await.len();
        info!(
            signatures = signatures.len(),
            verified_pool_size = size,
            "Signature learning cycle complete"
        );
        Ok(size)
    }

    /// Best candidate per unassigned equipment at or above the high-confidence bar
    pub async fn get_auto_assignment_recommendations(
        &self,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let equipment = self.repo.list_equipment().await?;
        let active: HashSet<String> = self
            .repo
            .list_assignments(&AssignmentFilter::all().with_status(AssignmentStatus::Assigned))
            .await?
            .into_iter()
            .map(|a| a.equipment_id)
            .collect();
        let signatures = self.repo.list_signatures().await?;
        let analytics = self.analytics_by_signature().await?;

        let mut recommendations: Vec<Recommendation> = equipment
            .iter()
            .filter(|e| !active.contains(&e.id))
            .filter_map(|e| {
                let best = self.best_scored(e, &signatures, &analytics, |_| true)?;
                (best.confidence >= self.config.high_confidence_threshold).then(|| Recommendation {
                    equipment_id: e.id.clone(),
                    signature_id: best.signature_id,
                    signature_name: best.signature_name,
                    confidence: best.confidence,
                    auto_assignable: best.auto_assignment_eligible,
                    reasoning: best.reasoning,
                    factors: best.factors,
                })
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.equipment_id.cmp(&b.equipment_id))
        });
        recommendations.truncate(limit);
        Ok(recommendations)
    }

    pub async fn get_verified_signature_pool(&self) -> Vec<VerifiedSignature> {
        self.pool.read().await.sorted()
    }

    pub async fn get_performance_metrics(&self) -> Result<PerformanceMetrics> {
        let assignments = self.repo.list_assignments(&AssignmentFilter::all()).await?;

        let count = |status| assignments.iter().filter(|a| a.status == status).count();
        let active_assignments = count(AssignmentStatus::Assigned);
        let rolled_back_assignments = count(AssignmentStatus::RolledBack);
        let pending_assignments = count(AssignmentStatus::Pending);

        let verdicts: Vec<bool> = assignments
            .iter()
            .filter_map(|a| a.feedback.as_ref().map(|f| f.confirmed))
            .collect();
        let confirmed_feedback = verdicts.iter().filter(|c| **c).count();
        let rejected_feedback = verdicts.len() - confirmed_feedback;
        let feedback_accuracy =
            (!verdicts.is_empty()).then(|| confirmed_feedback as f64 / verdicts.len() as f64);

        let average_confidence = if active_assignments == 0 {
            0.0
        } else {
            assignments
                .iter()
                .filter(|a| a.is_active())
                .map(|a| a.confidence)
                .sum::<f64>()
                / active_assignments as f64
        };
        let rollback_rate = if assignments.is_empty() {
            0.0
        } else {
            rolled_back_assignments as f64 / assignments.len() as f64
        };

        let active_alerts = self.tracker.lock().await.alerts(
            self.config.error_rate_alert_threshold,
            self.config.error_rate_min_attempts,
        );

        Ok(PerformanceMetrics {
            total_assignments: assignments.len(),
            active_assignments,
            rolled_back_assignments,
            pending_assignments,
            auto_assigned: assignments.iter().filter(|a| a.auto_assigned).count(),
            requiring_review: assignments
                .iter()
                .filter(|a| a.is_active() && a.requires_review)
                .count(),
            confirmed_feedback,
            rejected_feedback,
            feedback_accuracy,
            average_confidence,
            rollback_rate,
            verified_pool_size: self.pool.read().await.len(),
            weights: self.scorer.current_weights(),
            learning_samples: self.scorer.sample_count(),
            active_alerts,
        })
    }

    pub async fn get_audit_log(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.audit.lock().await.query(query)
    }

    /// Cascade-delete a signature and forget its pool and tracker state
    pub async fn delete_signature(&self, signature_id: &str) -> Result<bool> {
        let deleted = self.repo.delete_signature(signature_id).await?;
        self.pool.write().await.evict(signature_id);
        self.tracker.lock().await.remove(signature_id);
        if deleted {
            info!(signature_id, "Signature deleted");
        }
        Ok(deleted)
    }

    /// Clear pool, tracker, audit log and learning state
    ///
    /// Persisted data is left alone; use the repository's `reset` for that.
    pub async fn reset(&self) {
        self.pool.write().await.clear();
        self.tracker.lock().await.clear();
        self.audit.lock().await.clear();
        self.scorer.reset_learning();
        info!("Auto-assignment state reset");
    }

    async fn evaluate(
        &self,
        equipment: &Equipment,
        dry_run: bool,
        user_id: Option<&str>,
    ) -> Result<Decision> {
        let _transition = self.transitions.lock().await;
        let history = self
            .repo
            .list_assignments(&AssignmentFilter::for_equipment(&equipment.id))
            .await?;
        if history.iter().any(AutoAssignmentResult::is_active) {
            debug!(equipment_id = %equipment.id, "Equipment already assigned");
            return Ok(Decision::AlreadyAssigned);
        }

        let excluded: HashSet<&str> = if self.config.allow_reassignment_after_rollback {
            HashSet::new()
        } else {
            history
                .iter()
                .filter(|a| a.status == AssignmentStatus::RolledBack)
                .map(|a| a.signature_id.as_str())
                .collect()
        };

        let signatures = self.repo.list_signatures().await?;
        let analytics = self.analytics_by_signature().await?;

        let best = self.best_scored(equipment, &signatures, &analytics, |s| {
            !excluded.contains(s.id.as_str())
        });
        let candidate = match best.map(check_finite).transpose() {
            Ok(Some(c)) if c.auto_assignment_eligible => c,
            Ok(_) => {
                debug!(equipment_id = %equipment.id, "No eligible signature");
                return Ok(Decision::NoMatch);
            }
            Err(AssignmentError::Internal(msg)) => {
                error!(equipment_id = %equipment.id, error = %msg, "Scoring failed");
                return Ok(Decision::NoMatch);
            }
            Err(other) => return Err(other),
        };

        let verification_score = {
            let pool = self.pool.read().await;
            match pool.get(&candidate.signature_id) {
                Some(v) if v.success_rate >= self.config.min_success_rate => v.verification_score,
                _ => {
                    debug!(
                        equipment_id = %equipment.id,
                        signature_id = %candidate.signature_id,
                        confidence = candidate.confidence,
                        "Candidate is not a verified signature"
                    );
                    return Ok(Decision::NoMatch);
                }
            }
        };

        let result = AutoAssignmentResult {
            id: Uuid::new_v4(),
            equipment_id: equipment.id.clone(),
            signature_id: candidate.signature_id,
            confidence: candidate.confidence,
            reasoning: candidate.reasoning,
            status: AssignmentStatus::Assigned,
            timestamp: Utc::now(),
            auto_assigned: true,
            requires_review: candidate.confidence < self.config.review_threshold,
            feedback: None,
            metadata: Some(AssignmentMetadata {
                factors: Some(candidate.factors),
                verification_score: Some(verification_score),
                assigned_by: user_id.map(str::to_string),
                ..Default::default()
            }),
        };

        if !dry_run {
            self.commit_assignment(&result, None).await?;
        }
        Ok(Decision::Assigned(result))
    }

    /// Highest-confidence score among the signatures passing `keep`
    fn best_scored(
        &self,
        equipment: &Equipment,
        signatures: &[Signature],
        analytics: &HashMap<String, SignatureAnalytics>,
        keep: impl Fn(&Signature) -> bool,
    ) -> Option<SignatureMatchResult> {
        signatures
            .iter()
            .filter(|s| keep(s))
            .map(|s| self.scorer.score(equipment, s, analytics.get(&s.id)))
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| b.signature_id.cmp(&a.signature_id))
            })
    }

    /// Persist, count usage, audit and announce a new assignment
    async fn commit_assignment(
        &self,
        result: &AutoAssignmentResult,
        details: Option<&str>,
    ) -> Result<()> {
        self.repo.save_assignment(result).await?;
        self.scorer
            .record_usage(self.repo.as_ref(), &result.signature_id)
            .await?;

        let assigned_by = result.metadata.as_ref().and_then(|m| m.assigned_by.as_deref());
        let mut entry = AuditEntry::new(AuditAction::Assign, &result.equipment_id, &result.signature_id)
            .by(assigned_by)
            .with_confidence(result.confidence);
        if let Some(details) = details {
            entry = entry.with_details(details);
        }
        self.audit.lock().await.append(entry);

        self.event_bus.emit_lossy(EngineEvent::AssignmentCreated {
            assignment_id: result.id,
            equipment_id: result.equipment_id.clone(),
            signature_id: result.signature_id.clone(),
            confidence: result.confidence,
            auto_assigned: result.auto_assigned,
            requires_review: result.requires_review,
            timestamp: result.timestamp,
        });
        info!(
            equipment_id = %result.equipment_id,
            signature_id = %result.signature_id,
            confidence = result.confidence,
            auto_assigned = result.auto_assigned,
            requires_review = result.requires_review,
            "Signature assigned"
        );
        Ok(())
    }

    /// Feed an outcome into analytics and, with a factor snapshot, the weight model
    async fn learn_from_outcome(
        &self,
        assignment: &AutoAssignmentResult,
        confirmed: bool,
    ) -> Result<()> {
        match self.snapshot_factors(assignment).await? {
            Some(factors) => {
                let sample = LearningSample::new(
                    assignment.equipment_id.clone(),
                    assignment.signature_id.clone(),
                    confirmed,
                    assignment.confidence,
                    factors,
                );
                self.scorer.record_feedback(self.repo.as_ref(), sample).await?;
            }
            None => {
                warn!(
                    assignment_id = %assignment.id,
                    "No factor snapshot; outcome recorded without a learning sample"
                );
                self.scorer
                    .record_outcome(
                        self.repo.as_ref(),
                        &assignment.signature_id,
                        confirmed,
                        assignment.confidence,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Stored factor snapshot, else a re-score from the stored records
    async fn snapshot_factors(
        &self,
        assignment: &AutoAssignmentResult,
    ) -> Result<Option<ConfidenceFactors>> {
        if let Some(factors) = assignment.factors() {
            return Ok(Some(factors));
        }
        let equipment = self.repo.get_equipment(&assignment.equipment_id).await?;
        let signature = self.repo.get_signature(&assignment.signature_id).await?;
        let (Some(equipment), Some(signature)) = (equipment, signature) else {
            return Ok(None);
        };
        let analytics = self.repo.get_analytics(&assignment.signature_id).await?;
        Ok(Some(
            self.scorer
                .compute_factors(&equipment, &signature, analytics.as_ref()),
        ))
    }

    /// Count an outcome and raise an alert when the signature crosses the threshold
    async fn track_outcome(&self, signature_id: &str, is_error: bool) {
        let counts = self.tracker.lock().await.record(signature_id, is_error);
        let rate = counts.error_rate();
        if counts.attempts >= self.config.error_rate_min_attempts
            && rate > self.config.error_rate_alert_threshold
        {
            self.raise_alert(signature_id, rate, counts.attempts);
        }
    }

    fn raise_alert(&self, signature_id: &str, error_rate: f64, attempts: u64) {
        warn!(
            signature_id,
            error_rate,
            attempts,
            threshold = self.config.error_rate_alert_threshold,
            "Signature error rate above alert threshold"
        );
        self.event_bus.emit_lossy(EngineEvent::ErrorRateAlert {
            signature_id: signature_id.to_string(),
            error_rate,
            attempts,
            threshold: self.config.error_rate_alert_threshold,
            timestamp: Utc::now(),
        });
    }

    /// Recompute one pool entry, then apply the eviction rule to it
    async fn refresh_pool_entry(&self, signature_id: &str) -> Result<()> {
        let signature = self.repo.get_signature(signature_id).await?;
        let analytics = self.repo.get_analytics(signature_id).await?;

        match (signature, analytics) {
            (Some(signature), Some(analytics)) => {
                self.pool.write().await.refresh(
                    &signature,
                    &analytics,
                    self.config.min_success_rate,
                    self.config.min_confirmations,
                    Utc::now(),
                );
            }
            _ => {
                self.pool.write().await.evict(signature_id);
            }
        }

        let counts = self.tracker.lock().await.counts(signature_id);
        let rate = counts.error_rate();
        if counts.attempts >= self.config.error_rate_min_attempts
            && rate > self.config.error_rate_alert_threshold
            && rate > self.config.eviction_error_rate
        {
            self.evict(signature_id, rate).await;
        }
        Ok(())
    }

    async fn evict(&self, signature_id: &str, error_rate: f64) {
        if self.pool.write().await.evict(signature_id).is_none() {
            return;
        }
        warn!(signature_id, error_rate, "Signature evicted from verified pool");
        self.event_bus.emit_lossy(EngineEvent::SignatureEvicted {
            signature_id: signature_id.to_string(),
            error_rate,
            timestamp: Utc::now(),
        });
    }

    async fn has_active_assignment(&self, equipment_id: &str) -> Result<bool> {
        let active = self
            .repo
            .list_assignments(
                &AssignmentFilter::for_equipment(equipment_id).with_status(AssignmentStatus::Assigned),
            )
            .await?;
        Ok(!active.is_empty())
    }

    async fn analytics_by_signature(&self) -> Result<HashMap<String, SignatureAnalytics>> {
        Ok(self
            .repo
            .list_analytics()
            .await?
            .into_iter()
            .map(|a| (a.signature_id.clone(), a))
            .collect())
    }
}

/// Scores feed arithmetic and thresholds; a non-finite one is an internal fault
fn check_finite(result: SignatureMatchResult) -> Result<SignatureMatchResult> {
    if result.confidence.is_finite() {
        Ok(result)
    } else {
        Err(AssignmentError::Internal(format!(
            "non-finite confidence for signature {}",
            result.signature_id
        )))
    }
}
