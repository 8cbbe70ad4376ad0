//! Auto-assignment data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigmap_common::models::Signature;
use uuid::Uuid;

use crate::error::{AssignmentError, Result};
use crate::scoring::factors::ConfidenceFactors;
use crate::scoring::weights::WeightState;

pub const SKIP_BATCH_LIMIT: &str = "Batch size limit reached";
pub const SKIP_NO_MATCH: &str = "No suitable signature match found";
pub const SKIP_ALREADY_ASSIGNED: &str = "Equipment already has an active assignment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Assigned,
    RolledBack,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::RolledBack => "rolled_back",
        }
    }
}

/// Feedback attached to an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub confirmed: bool,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMetadata {
    /// Factors computed when the assignment was made
    #[serde(default)]
    pub factors: Option<ConfidenceFactors>,
    #[serde(default)]
    pub verification_score: Option<f64>,
    #[serde(default)]
    pub assigned_by: Option<String>,
    #[serde(default)]
    pub rollback_reason: Option<String>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rolled_back_by: Option<String>,
}

/// Outcome of matching one equipment to one signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAssignmentResult {
    pub id: Uuid,
    pub equipment_id: String,
    pub signature_id: String,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub status: AssignmentStatus,
    pub timestamp: DateTime<Utc>,
    pub auto_assigned: bool,
    pub requires_review: bool,
    #[serde(default)]
    pub feedback: Option<UserFeedback>,
    #[serde(default)]
    pub metadata: Option<AssignmentMetadata>,
}

impl AutoAssignmentResult {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Assigned
    }

    /// Factor snapshot, if one was recorded
    pub fn factors(&self) -> Option<ConfidenceFactors> {
        self.metadata.as_ref().and_then(|m| m.factors)
    }
}

/// Options for a single `process_equipment` call
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Decide without persisting or logging
    pub dry_run: bool,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    /// Stop accepting after this many assignments
    pub max_assignments: Option<usize>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEquipment {
    pub equipment_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub assigned: usize,
    pub skipped: usize,
    /// Mean confidence of accepted assignments (0 when none)
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub assigned: Vec<AutoAssignmentResult>,
    pub skipped: Vec<SkippedEquipment>,
    pub summary: BatchSummary,
}

/// Signature qualified for unattended auto-assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedSignature {
    pub signature: Signature,
    pub verification_score: f64,
    /// Accuracy ratio (0-1)
    pub success_rate: f64,
    pub last_verified: DateTime<Utc>,
    pub confirmation_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub equipment_id: String,
    pub signature_id: String,
    pub signature_name: String,
    pub confidence: f64,
    /// Would pass the auto-assignment threshold
    pub auto_assignable: bool,
    pub reasoning: Vec<String>,
    pub factors: ConfidenceFactors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRateAlert {
    pub signature_id: String,
    pub error_rate: f64,
    pub attempts: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_assignments: usize,
    pub active_assignments: usize,
    pub rolled_back_assignments: usize,
    pub pending_assignments: usize,
    pub auto_assigned: usize,
    pub requiring_review: usize,
    pub confirmed_feedback: usize,
    pub rejected_feedback: usize,
    /// confirmed / (confirmed + rejected), None before any feedback
    pub feedback_accuracy: Option<f64>,
    pub average_confidence: f64,
    /// rolled back / total, 0 with no assignments
    pub rollback_rate: f64,
    pub verified_pool_size: usize,
    pub weights: WeightState,
    pub learning_samples: usize,
    pub active_alerts: Vec<ErrorRateAlert>,
}

/// Look up the first present key among snake_case / camelCase spellings
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| value.get(*k)).filter(|v| !v.is_null())
}

fn required_id(value: &Value, keys: &[&str]) -> Result<String> {
    match field(value, keys) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) | None => Err(AssignmentError::InvalidInput(format!(
            "{} is required",
            keys[0]
        ))),
        Some(other) => Err(AssignmentError::InvalidInput(format!(
            "{} must be a string, got {}",
            keys[0], other
        ))),
    }
}

fn optional_string(value: &Value, keys: &[&str]) -> Result<Option<String>> {
    match field(value, keys) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(AssignmentError::InvalidInput(format!(
            "{} must be a string, got {}",
            keys[0], other
        ))),
    }
}

fn require_object(value: &Value) -> Result<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(AssignmentError::InvalidInput(
            "request body must be a JSON object".to_string(),
        ))
    }
}

/// Validated feedback request
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRequest {
    pub equipment_id: String,
    pub signature_id: String,
    pub confirmed: bool,
    pub user_id: String,
    pub notes: Option<String>,
}

impl FeedbackRequest {
    /// Parse an untyped request body
    ///
    /// # Errors
    /// `InvalidInput` for missing ids or a `confirmed` flag that is not a boolean
    pub fn from_json(value: &Value) -> Result<Self> {
        require_object(value)?;
        let equipment_id = required_id(value, &["equipment_id", "equipmentId"])?;
        let signature_id = required_id(value, &["signature_id", "signatureId"])?;
        let confirmed = match field(value, &["confirmed"]) {
            Some(Value::Bool(b)) => *b,
            _ => {
                return Err(AssignmentError::InvalidInput(
                    "confirmed must be a boolean".to_string(),
                ))
            }
        };
        let user_id = optional_string(value, &["user_id", "userId"])?
            .unwrap_or_else(|| "anonymous".to_string());
        let notes = optional_string(value, &["notes"])?;

        Ok(Self {
            equipment_id,
            signature_id,
            confirmed,
            user_id,
            notes,
        })
    }
}

/// Validated rollback request
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackRequest {
    pub equipment_id: String,
    pub signature_id: String,
    pub reason: String,
    pub user_id: String,
}

impl RollbackRequest {
    pub fn from_json(value: &Value) -> Result<Self> {
        require_object(value)?;
        let equipment_id = required_id(value, &["equipment_id", "equipmentId"])?;
        let signature_id = required_id(value, &["signature_id", "signatureId"])?;
        let reason = optional_string(value, &["reason"])?
            .unwrap_or_else(|| "No reason given".to_string());
        let user_id = optional_string(value, &["user_id", "userId"])?
            .unwrap_or_else(|| "anonymous".to_string());

        Ok(Self {
            equipment_id,
            signature_id,
            reason,
            user_id,
        })
    }
}
