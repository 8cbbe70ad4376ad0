//! Shared fixtures for sigmap-engine integration tests
#![allow(dead_code)]

use chrono::Utc;
use sigmap_common::config::EngineConfig;
use sigmap_common::events::{EngineEvent, EventBus};
use sigmap_common::models::{
    Equipment, Point, PointKind, PointTemplate, Signature, SignatureAnalytics, SignatureSource,
};
use sigmap_engine::{AutoAssignmentOrchestrator, InMemoryRepository, SignatureRepository};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const VAV_SIGNATURE: &str = "sig-vav";

/// Four keyword-rich points; identical templates score above the auto-assignment bar
pub fn vav_points() -> Vec<Point> {
    vec![
        Point::new("zone_temp", PointKind::Numeric).with_unit("°F"),
        Point::new("zone_temp_setpoint", PointKind::Numeric).with_unit("°F"),
        Point::new("supply_air_flow", PointKind::Numeric).with_unit("cfm"),
        Point::new("fan_status", PointKind::Boolean),
    ]
}

pub fn vav_equipment(id: &str) -> Equipment {
    Equipment::new(id, "VAV").with_points(vav_points())
}

pub fn vav_signature(id: &str) -> Signature {
    let templates = vav_points()
        .iter()
        .map(|p| PointTemplate::new(p.label.clone(), p.kind, p.unit.as_deref()))
        .collect();
    Signature::new(id, "Standard VAV", "VAV", templates, SignatureSource::UserValidated)
}

/// Air handler with nothing in common with the VAV signature
pub fn unrelated_equipment(id: &str) -> Equipment {
    Equipment::new(id, "AHU").with_points(vec![
        Point::new("OaDmpr", PointKind::Numeric).with_unit("%"),
        Point::new("ChwVlv", PointKind::Numeric).with_unit("%"),
        Point::new("MaTmp", PointKind::Numeric).with_unit("°F"),
    ])
}

/// Analytics with `confirmations` confirmed outcomes and as many uses
pub fn verified_analytics(signature_id: &str, confirmations: u64) -> SignatureAnalytics {
    let now = Utc::now();
    let mut analytics = SignatureAnalytics::new(signature_id);
    for _ in 0..confirmations {
        analytics.record_outcome(true, 96.0, now);
        analytics.record_usage(now);
    }
    analytics
}

pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub orchestrator: AutoAssignmentOrchestrator,
    pub events: broadcast::Receiver<EngineEvent>,
}

/// Orchestrator over an empty in-memory store
pub fn harness(config: EngineConfig) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let bus = EventBus::new(256);
    let events = bus.subscribe();
    let orchestrator = AutoAssignmentOrchestrator::from_config(repo.clone(), &config, bus);
    Harness {
        repo,
        orchestrator,
        events,
    }
}

/// Store the VAV signature (already verified) and initialize the orchestrator
pub async fn verified_harness(config: EngineConfig) -> Harness {
    let h = harness(config);
    h.repo
        .create_signature(&vav_signature(VAV_SIGNATURE))
        .await
        .unwrap();
    h.repo
        .save_analytics(&verified_analytics(VAV_SIGNATURE, 20))
        .await
        .unwrap();
    h.orchestrator.initialize().await.unwrap();
    h
}

/// Everything received so far
pub fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

pub fn event_types(events: &[EngineEvent]) -> Vec<&'static str> {
    events.iter().map(EngineEvent::event_type).collect()
}
