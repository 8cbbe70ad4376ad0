//! Concurrent assignment transitions
//!
//! The store yields inside every call so that joined futures interleave
//! between the state check and the write.

mod helpers;

use async_trait::async_trait;
use helpers::*;
use sigmap_common::config::EngineConfig;
use sigmap_common::events::EventBus;
use sigmap_common::models::{Equipment, Signature, SignatureAnalytics};
use sigmap_engine::assignment::types::{AssignmentStatus, AutoAssignmentResult, ProcessOptions};
use sigmap_engine::db::AssignmentFilter;
use sigmap_engine::{AssignmentError, AutoAssignmentOrchestrator, InMemoryRepository, SignatureRepository};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct YieldingRepository {
    inner: InMemoryRepository,
}

async fn pause() {
    tokio::task::yield_now().await;
}

#[async_trait]
impl SignatureRepository for YieldingRepository {
    async fn save_equipment(&self, equipment: &Equipment) -> sigmap_common::Result<()> {
        pause().await;
        self.inner.save_equipment(equipment).await
    }

    async fn get_equipment(&self, id: &str) -> sigmap_common::Result<Option<Equipment>> {
        pause().await;
        self.inner.get_equipment(id).await
    }

    async fn list_equipment(&self) -> sigmap_common::Result<Vec<Equipment>> {
        pause().await;
        self.inner.list_equipment().await
    }

    async fn delete_equipment(&self, id: &str) -> sigmap_common::Result<bool> {
        pause().await;
        self.inner.delete_equipment(id).await
    }

    async fn create_signature(&self, signature: &Signature) -> sigmap_common::Result<()> {
        pause().await;
        self.inner.create_signature(signature).await
    }

    async fn update_signature(&self, signature: &Signature) -> sigmap_common::Result<()> {
        pause().await;
        self.inner.update_signature(signature).await
    }

    async fn get_signature(&self, id: &str) -> sigmap_common::Result<Option<Signature>> {
        pause().await;
        self.inner.get_signature(id).await
    }

    async fn list_signatures(&self) -> sigmap_common::Result<Vec<Signature>> {
        pause().await;
        self.inner.list_signatures().await
    }

    async fn delete_signature(&self, id: &str) -> sigmap_common::Result<bool> {
        pause().await;
        self.inner.delete_signature(id).await
    }

    async fn get_analytics(&self, signature_id: &str) -> sigmap_common::Result<Option<SignatureAnalytics>> {
        pause().await;
        self.inner.get_analytics(signature_id).await
    }

    async fn list_analytics(&self) -> sigmap_common::Result<Vec<SignatureAnalytics>> {
        pause().await;
        self.inner.list_analytics().await
    }

    async fn save_analytics(&self, analytics: &SignatureAnalytics) -> sigmap_common::Result<()> {
        pause().await;
        self.inner.save_analytics(analytics).await
    }

    async fn save_assignment(&self, assignment: &AutoAssignmentResult) -> sigmap_common::Result<()> {
        pause().await;
        self.inner.save_assignment(assignment).await
    }

    async fn get_assignment(&self, id: Uuid) -> sigmap_common::Result<Option<AutoAssignmentResult>> {
        pause().await;
        self.inner.get_assignment(id).await
    }

    async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> sigmap_common::Result<Vec<AutoAssignmentResult>> {
        pause().await;
        let assignments = self.inner.list_assignments(filter).await;
        pause().await;
        assignments
    }

    async fn reset(&self) -> sigmap_common::Result<()> {
        self.inner.reset().await
    }
}

/// Verified VAV signature, stored equipment `eq-1`, initialized orchestrator
async fn setup() -> (Arc<YieldingRepository>, AutoAssignmentOrchestrator) {
    let repo = Arc::new(YieldingRepository::default());
    repo.create_signature(&vav_signature(VAV_SIGNATURE)).await.unwrap();
    repo.save_analytics(&verified_analytics(VAV_SIGNATURE, 20))
        .await
        .unwrap();
    repo.save_equipment(&vav_equipment("eq-1")).await.unwrap();

    let orchestrator =
        AutoAssignmentOrchestrator::from_config(repo.clone(), &EngineConfig::default(), EventBus::new(256));
    orchestrator.initialize().await.unwrap();
    (repo, orchestrator)
}

fn live() -> ProcessOptions {
    ProcessOptions {
        dry_run: false,
        user_id: Some("tester".to_string()),
    }
}

#[tokio::test]
async fn concurrent_feedback_is_recorded_once() {
    let (repo, orchestrator) = setup().await;
    orchestrator
        .assign_manually("eq-1", VAV_SIGNATURE, "carol")
        .await
        .unwrap();
    let before = repo.get_analytics(VAV_SIGNATURE).await.unwrap().unwrap();

    let (first, second) = tokio::join!(
        orchestrator.record_user_feedback("eq-1", VAV_SIGNATURE, true, "bob", None),
        orchestrator.record_user_feedback("eq-1", VAV_SIGNATURE, false, "dave", None),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(AssignmentError::Conflict(_))));

    let after = repo.get_analytics(VAV_SIGNATURE).await.unwrap().unwrap();
    assert_eq!(after.total_matches, before.total_matches + 1);
    assert_eq!(after.positive_feedback, before.positive_feedback + 1);
    assert_eq!(after.negative_feedback, before.negative_feedback);
    assert_eq!(orchestrator.scorer().sample_count(), 1);
}

#[tokio::test]
async fn concurrent_processing_assigns_equipment_once() {
    let (repo, orchestrator) = setup().await;
    let equipment = vav_equipment("eq-1");
    let options = live();

    let (first, second) = tokio::join!(
        orchestrator.process_equipment(&equipment, &options),
        orchestrator.process_equipment(&equipment, &options),
    );

    let produced = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(produced, 1);

    let stored = repo
        .list_assignments(&AssignmentFilter::for_equipment("eq-1"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    let signature = repo.get_signature(VAV_SIGNATURE).await.unwrap().unwrap();
    assert_eq!(signature.matching_equipment_ids, vec!["eq-1"]);
}

#[tokio::test]
async fn concurrent_rollbacks_reverse_once() {
    let (repo, orchestrator) = setup().await;
    orchestrator
        .process_equipment(&vav_equipment("eq-1"), &live())
        .await
        .unwrap()
        .expect("assignment");
    let before = repo.get_analytics(VAV_SIGNATURE).await.unwrap().unwrap();

    let (first, second) = tokio::join!(
        orchestrator.rollback_assignment("eq-1", VAV_SIGNATURE, "wrong box", "alice"),
        orchestrator.rollback_assignment("eq-1", VAV_SIGNATURE, "wrong box", "erin"),
    );

    assert_eq!(first.unwrap().status, AssignmentStatus::RolledBack);
    assert!(matches!(second, Err(AssignmentError::Conflict(_))));

    let after = repo.get_analytics(VAV_SIGNATURE).await.unwrap().unwrap();
    assert_eq!(after.negative_feedback, before.negative_feedback + 1);
    assert_eq!(after.total_matches, before.total_matches + 1);
}
