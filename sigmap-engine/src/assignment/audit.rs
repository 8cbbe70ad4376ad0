//! Bounded audit trail of assignment actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Assign,
    Rollback,
    Feedback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Assign => "assign",
            AuditAction::Rollback => "rollback",
            AuditAction::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub equipment_id: String,
    pub signature_id: String,
    pub user_id: Option<String>,
    pub confidence: Option<f64>,
    /// Free-form detail (rollback reason, feedback verdict, ...)
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, equipment_id: &str, signature_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            equipment_id: equipment_id.to_string(),
            signature_id: signature_id.to_string(),
            user_id: None,
            confidence: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn by(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Audit log query; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub action: Option<AuditAction>,
}

/// Append-only log keeping the most recent `capacity` entries
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&mut self, entry: AuditEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Matching entries, most recent first
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| query.action.map_or(true, |a| a == e.action))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
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
