//! Confidence scoring and weight adaptation tests

mod helpers;

use helpers::*;
use sigmap_common::config::{NormalizationConfig, ScoringConfig};
use sigmap_common::events::{EngineEvent, EventBus};
use sigmap_common::models::{Equipment, Point, PointKind, PointTemplate, Signature, SignatureSource};
use sigmap_engine::scoring::factors::{ConfidenceFactors, Factor};
use sigmap_engine::scoring::learning::LearningSample;
use sigmap_engine::scoring::weights::INITIAL_WEIGHTS;
use sigmap_engine::signatures::generate_signature;
use sigmap_engine::{ConfidenceScorer, InMemoryRepository, PointNormalizer, SignatureRepository};

fn scorer(bus: &EventBus) -> ConfidenceScorer {
    ConfidenceScorer::new(ScoringConfig::default(), bus.clone())
}

/// Name similarity separates outcomes; every other factor is constant
fn sample(i: usize, confirmed: bool) -> LearningSample {
    let factors = ConfidenceFactors {
        point_name_similarity: if confirmed { 90.0 + i as f64 } else { 40.0 + i as f64 },
        point_count_match: 80.0,
        point_type_match: 70.0,
        equipment_type_match: 100.0,
        historical_accuracy: 50.0,
        ..Default::default()
    };
    LearningSample::new(format!("eq-{i}"), VAV_SIGNATURE, confirmed, 90.0, factors)
}

#[test]
fn keyword_rich_identical_sets_cross_the_threshold() {
    let bus = EventBus::new(16);
    let s = scorer(&bus);
    let result = s.score(&vav_equipment("eq-1"), &vav_signature(VAV_SIGNATURE), None);

    assert_eq!(result.factors.semantic_similarity, 100.0);
    assert_eq!(result.factors.structural_consistency, 100.0);
    assert_eq!(result.factors.historical_accuracy, 50.0);
    // vendor factor is zero and drops out of the average
    assert!((result.confidence - 86.0 / 0.9).abs() < 1e-9);
    assert!(result.auto_assignment_eligible);
    assert_eq!(result.signature_name, "Standard VAV");
}

#[test]
fn unrelated_equipment_stays_below_threshold() {
    let bus = EventBus::new(16);
    let analytics = verified_analytics(VAV_SIGNATURE, 5);
    let result = scorer(&bus).score(
        &unrelated_equipment("ahu-1"),
        &vav_signature(VAV_SIGNATURE),
        Some(&analytics),
    );
    assert_eq!(result.factors.equipment_type_match, 0.0);
    assert_eq!(result.factors.point_count_match, 75.0);
    assert!(!result.auto_assignment_eligible);
    assert!(result.reasoning.iter().any(|r| r.contains("type")));
}

#[test]
fn compatible_equipment_types_score_partially() {
    let bus = EventBus::new(16);
    let equipment = Equipment::new("rtu-1", "RTU").with_points(vec![Point::new("MaTmp", PointKind::Numeric)]);
    let mut signature = vav_signature("sig-ahu");
    signature.equipment_type = "AHU".to_string();
    let factors = scorer(&bus).compute_factors(&equipment, &signature, None);
    assert_eq!(factors.equipment_type_match, 75.0);
}

#[test]
fn normalized_points_match_generated_signature() {
    let bus = EventBus::new(16);
    let normalizer = PointNormalizer::new(&NormalizationConfig::default()).unwrap();

    let raw = || {
        Equipment::new("x", "VAV")
            .with_vendor("Schneider Electric")
            .with_points(vec![
                Point::new("SaTmp", PointKind::Numeric).with_unit("°F"),
                Point::new("ZnTmpSp", PointKind::Numeric).with_unit("°F").writable(),
            ])
    };
    let mut reference = raw();
    normalizer.normalize_equipment(&mut reference);
    let signature = generate_signature(&reference, "Schneider VAV");

    let mut candidate = raw();
    candidate.id = "eq-2".to_string();
    normalizer.normalize_equipment(&mut candidate);

    let factors = scorer(&bus).compute_factors(&candidate, &signature, None);
    assert_eq!(factors.point_name_similarity, 100.0);
    assert_eq!(factors.point_count_match, 100.0);
    assert_eq!(factors.point_type_match, 100.0);
    assert_eq!(factors.equipment_type_match, 100.0);
}

#[tokio::test]
async fn feedback_adapts_weights_after_minimum_samples() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let s = scorer(&bus);
    let repo = InMemoryRepository::new();
    repo.create_signature(&vav_signature(VAV_SIGNATURE)).await.unwrap();

    for i in 0..9 {
        let adapted = s.record_feedback(&repo, sample(i, i % 2 == 0)).await.unwrap();
        assert!(adapted.is_none());
    }
    assert_eq!(s.current_weights().version, 0);

    let adapted = s
        .record_feedback(&repo, sample(9, false))
        .await
        .unwrap()
        .expect("weights adapted");
    assert_eq!(adapted.version, 1);

    // only the name factor correlates: 0.9 * 0.25 + 0.1
    let name = adapted.weights.get(Factor::PointNameSimilarity);
    assert!((name - 0.325).abs() < 1e-9);
    assert!(adapted.weights.get(Factor::PointCountMatch) < INITIAL_WEIGHTS[1]);
    assert!((adapted.weights.sum() - 1.0).abs() < 1e-9);

    let analytics = repo.get_analytics(VAV_SIGNATURE).await.unwrap().unwrap();
    assert_eq!(analytics.total_matches, 10);
    assert_eq!(analytics.positive_feedback, 5);
    let signature = repo.get_signature(VAV_SIGNATURE).await.unwrap().unwrap();
    let learning = signature.learning.unwrap();
    assert_eq!((learning.confirmations, learning.rejections), (5, 5));

    let received = drain(&mut events);
    assert!(matches!(
        received.as_slice(),
        [EngineEvent::WeightsAdapted { version: 1, sample_count: 10, .. }]
    ));
}

#[tokio::test]
async fn adapted_weights_change_aggregation_and_reset_restores_them() {
    let bus = EventBus::new(64);
    let s = scorer(&bus);
    let repo = InMemoryRepository::new();

    let factors = ConfidenceFactors {
        point_name_similarity: 100.0,
        point_count_match: 50.0,
        ..Default::default()
    };
    let before = s.aggregate(&factors);

    for i in 0..10 {
        s.record_feedback(&repo, sample(i, i % 2 == 0)).await.unwrap();
    }
    assert!(s.aggregate(&factors) > before);
    assert_eq!(s.sample_count(), 10);

    s.reset_learning();
    assert_eq!(s.sample_count(), 0);
    assert_eq!(s.current_weights().version, 0);
    assert!((s.aggregate(&factors) - before).abs() < 1e-9);
}

#[tokio::test]
async fn usage_is_counted_on_analytics() {
    let bus = EventBus::new(16);
    let s = scorer(&bus);
    let repo = InMemoryRepository::new();

    s.record_usage(&repo, "sig-new").await.unwrap();
    let analytics = s.record_usage(&repo, "sig-new").await.unwrap();
    assert_eq!(analytics.usage_frequency, 2);
    assert!(analytics.last_used.is_some());
    assert!(!analytics.has_history());
}

#[test]
fn identical_point_sets_score_identically() {
    let bus = EventBus::new(16);
    let s = scorer(&bus);
    let signature = vav_signature(VAV_SIGNATURE);
    let analytics = verified_analytics(VAV_SIGNATURE, 4);

    let a = s.score(&vav_equipment("eq-1"), &signature, Some(&analytics));
    let b = s.score(&vav_equipment("eq-2"), &signature, Some(&analytics));
    assert_eq!(a.factors, b.factors);
    assert_eq!(a.confidence, b.confidence);
    for value in a.factors.to_array() {
        assert!((0.0..=100.0).contains(&value));
    }
}

#[test]
fn factors_stay_in_range_for_degenerate_and_oversized_sets() {
    let bus = EventBus::new(16);
    let s = scorer(&bus);

    let empty_equipment = Equipment::new("eq-empty", "VAV");
    let empty_signature = Signature::new("sig-empty", "Empty", "VAV", vec![], SignatureSource::UserValidated);

    let kinds = [PointKind::Numeric, PointKind::Boolean, PointKind::String];
    let big_points: Vec<Point> = (0..500)
        .map(|i| {
            let point = Point::new(format!("zone_temp_setpoint_{i}"), kinds[i % 3]).with_unit("degF");
            if i % 2 == 0 {
                point.writable()
            } else {
                point
            }
        })
        .collect();
    let big_equipment = Equipment::new("eq-big", "Terminal Unit")
        .with_vendor("Schneider Electric")
        .with_model("MNB-V2")
        .with_points(big_points);
    let big_templates: Vec<PointTemplate> = (0..300)
        .map(|i| PointTemplate::new(format!("supply_air_flow_{i}"), kinds[i % 3], Some("cfm")))
        .collect();
    let big_signature = Signature::new("sig-big", "Big", "VAV", big_templates, SignatureSource::UserValidated);

    let equipment = [empty_equipment, vav_equipment("eq-1"), big_equipment];
    let signatures = [empty_signature, vav_signature(VAV_SIGNATURE), big_signature];
    let analytics = [None, Some(verified_analytics(VAV_SIGNATURE, 200))];

    for e in &equipment {
        for sig in &signatures {
            for a in &analytics {
                let result = s.score(e, sig, a.as_ref());
                for value in result.factors.to_array() {
                    assert!((0.0..=100.0).contains(&value), "{} vs {}: {value}", e.id, sig.id);
                }
                assert!((0.0..=100.0).contains(&result.confidence), "{} vs {}", e.id, sig.id);
            }
        }
    }
}
