//! In-process repository

use async_trait::async_trait;
use sigmap_common::models::{Equipment, Signature, SignatureAnalytics};
use sigmap_common::{Error, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{sync_match, AssignmentFilter, SignatureRepository};
use crate::assignment::types::AutoAssignmentResult;

#[derive(Debug, Default)]
struct Store {
    equipment: BTreeMap<String, Equipment>,
    signatures: BTreeMap<String, Signature>,
    analytics: BTreeMap<String, SignatureAnalytics>,
    assignments: BTreeMap<Uuid, AutoAssignmentResult>,
}

/// Repository backed by tokio `RwLock`ed maps
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignatureRepository for InMemoryRepository {
    async fn save_equipment(&self, equipment: &Equipment) -> Result<()> {
        let mut store = self.store.write().await;
        store
            .equipment
            .insert(equipment.id.clone(), equipment.clone());
        Ok(())
    }

    async fn get_equipment(&self, id: &str) -> Result<Option<Equipment>> {
        Ok(self.store.read().await.equipment.get(id).cloned())
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        Ok(self.store.read().await.equipment.values().cloned().collect())
    }

    async fn delete_equipment(&self, id: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.equipment.remove(id).is_none() {
            return Ok(false);
        }
        store.assignments.retain(|_, a| a.equipment_id != id);
        for signature in store.signatures.values_mut() {
            signature.remove_match(id);
        }
        Ok(true)
    }

    async fn create_signature(&self, signature: &Signature) -> Result<()> {
        let mut store = self.store.write().await;
        if store.signatures.contains_key(&signature.id) {
            return Err(Error::Conflict(format!(
                "signature {} already exists",
                signature.id
            )));
        }
        let mut stored = signature.clone();
        stored.matching_equipment_ids.clear();
        store.signatures.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> Result<()> {
        let mut store = self.store.write().await;
        match store.signatures.get_mut(&signature.id) {
            Some(existing) => {
                let matches = std::mem::take(&mut existing.matching_equipment_ids);
                *existing = Signature {
                    matching_equipment_ids: matches,
                    ..signature.clone()
                };
                Ok(())
            }
            None => Err(Error::NotFound(format!("signature {}", signature.id))),
        }
    }

    async fn get_signature(&self, id: &str) -> Result<Option<Signature>> {
        Ok(self.store.read().await.signatures.get(id).cloned())
    }

    async fn list_signatures(&self) -> Result<Vec<Signature>> {
        Ok(self.store.read().await.signatures.values().cloned().collect())
    }

    async fn delete_signature(&self, id: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.signatures.remove(id).is_none() {
            return Ok(false);
        }
        store.analytics.remove(id);
        store.assignments.retain(|_, a| a.signature_id != id);
        Ok(true)
    }

    async fn get_analytics(&self, signature_id: &str) -> Result<Option<SignatureAnalytics>> {
        Ok(self.store.read().await.analytics.get(signature_id).cloned())
    }

    async fn list_analytics(&self) -> Result<Vec<SignatureAnalytics>> {
        Ok(self.store.read().await.analytics.values().cloned().collect())
    }

    async fn save_analytics(&self, analytics: &SignatureAnalytics) -> Result<()> {
        self.store
            .write()
            .await
            .analytics
            .insert(analytics.signature_id.clone(), analytics.clone());
        Ok(())
    }

    async fn save_assignment(&self, assignment: &AutoAssignmentResult) -> Result<()> {
        let mut store = self.store.write().await;
        let other_active = store.assignments.values().any(|a| {
            a.id != assignment.id
                && a.is_active()
                && a.equipment_id == assignment.equipment_id
                && a.signature_id == assignment.signature_id
        });
        let signature = store
            .signatures
            .get_mut(&assignment.signature_id)
            .ok_or_else(|| Error::NotFound(format!("signature {}", assignment.signature_id)))?;
        sync_match(signature, assignment, other_active);
        store.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, id: Uuid) -> Result<Option<AutoAssignmentResult>> {
        Ok(self.store.read().await.assignments.get(&id).cloned())
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<AutoAssignmentResult>> {
        let store = self.store.read().await;
        let mut assignments: Vec<_> = store
            .assignments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(assignments)
    }

    async fn reset(&self) -> Result<()> {
        *self.store.write().await = Store::default();
        Ok(())
    }
}
