//! Equipment / signature store
//!
//! The engine talks to storage only through `SignatureRepository`. Two
//! implementations ship with the crate: `InMemoryRepository` for tests and
//! embedding, `SqliteRepository` for the command-line tool.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use sigmap_common::models::{Equipment, Signature, SignatureAnalytics};
use sigmap_common::Result;
use uuid::Uuid;

use crate::assignment::types::{AssignmentStatus, AutoAssignmentResult};

pub use memory::InMemoryRepository;
pub use sqlite::{init_database_pool, SqliteRepository};

/// Assignment query; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentFilter {
    pub equipment_id: Option<String>,
    pub signature_id: Option<String>,
    pub status: Option<AssignmentStatus>,
}

impl AssignmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_equipment(equipment_id: &str) -> Self {
        Self {
            equipment_id: Some(equipment_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_signature(signature_id: &str) -> Self {
        Self {
            signature_id: Some(signature_id.to_string()),
            ..Self::default()
        }
    }

    pub fn for_pair(equipment_id: &str, signature_id: &str) -> Self {
        Self {
            equipment_id: Some(equipment_id.to_string()),
            signature_id: Some(signature_id.to_string()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: AssignmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, assignment: &AutoAssignmentResult) -> bool {
        self.equipment_id
            .as_deref()
            .map_or(true, |id| id == assignment.equipment_id)
            && self
                .signature_id
                .as_deref()
                .map_or(true, |id| id == assignment.signature_id)
            && self.status.map_or(true, |s| s == assignment.status)
    }
}

/// CRUD over equipment, signatures, analytics and assignments
///
/// Contract shared by every implementation:
/// - `create_signature` fails with `Conflict` on a duplicate id,
///   `update_signature` with `NotFound` on an unknown one
/// - `save_assignment` upserts by assignment id, requires the signature to
///   exist, and keeps the signature's `matching_equipment_ids` in step with
///   the assignment's status in the same unit of work. It is the only writer
///   of that set: `create_signature` stores it empty and `update_signature`
///   keeps the stored one
/// - `delete_signature` cascades to analytics and assignments;
///   `delete_equipment` cascades to assignments and match sets
/// - lists are ordered (ids ascending, assignments by timestamp)
#[async_trait]
pub trait SignatureRepository: Send + Sync {
    async fn save_equipment(&self, equipment: &Equipment) -> Result<()>;
    async fn get_equipment(&self, id: &str) -> Result<Option<Equipment>>;
    async fn list_equipment(&self) -> Result<Vec<Equipment>>;
    async fn delete_equipment(&self, id: &str) -> Result<bool>;

    async fn create_signature(&self, signature: &Signature) -> Result<()>;
    async fn update_signature(&self, signature: &Signature) -> Result<()>;
    async fn get_signature(&self, id: &str) -> Result<Option<Signature>>;
    async fn list_signatures(&self) -> Result<Vec<Signature>>;
    async fn delete_signature(&self, id: &str) -> Result<bool>;

    async fn get_analytics(&self, signature_id: &str) -> Result<Option<SignatureAnalytics>>;
    async fn list_analytics(&self) -> Result<Vec<SignatureAnalytics>>;
    async fn save_analytics(&self, analytics: &SignatureAnalytics) -> Result<()>;

    async fn save_assignment(&self, assignment: &AutoAssignmentResult) -> Result<()>;
    async fn get_assignment(&self, id: Uuid) -> Result<Option<AutoAssignmentResult>>;
    async fn list_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<AutoAssignmentResult>>;

    /// Drop everything
    async fn reset(&self) -> Result<()>;
}

/// Apply an assignment's status to its signature's match set
///
/// `other_active` tells whether another active assignment still links the
/// same pair.
pub(crate) fn sync_match(signature: &mut Signature, assignment: &AutoAssignmentResult, other_active: bool) {
    if assignment.is_active() {
        signature.add_match(&assignment.equipment_id);
    } else if !other_active {
        signature.remove_match(&assignment.equipment_id);
    }
}
