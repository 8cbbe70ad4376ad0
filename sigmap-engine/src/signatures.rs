//! Signature library helpers

use serde::{Deserialize, Serialize};
use sigmap_common::models::{Equipment, PointTemplate, Signature, SignatureSource};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AssignmentError, Result};

/// Build an `auto-generated` signature from an equipment's point set
///
/// Templates take the canonical name when the point was normalized and the
/// raw label otherwise. The baseline confidence is the equipment's average
/// normalization confidence. The match set starts empty; link the source
/// equipment with `AutoAssignmentOrchestrator::assign_manually`.
pub fn generate_signature(equipment: &Equipment, name: &str) -> Signature {
    let points = equipment
        .points
        .iter()
        .map(|p| PointTemplate::new(p.display_name(), p.kind, p.unit.as_deref()))
        .collect();

    let mut signature = Signature::new(
        format!("sig-{}", Uuid::new_v4().simple()),
        name,
        equipment.equipment_type.clone(),
        points,
        SignatureSource::AutoGenerated,
    );
    signature.confidence = baseline_confidence(equipment);

    debug!(
        signature_id = %signature.id,
        equipment_id = %equipment.id,
        points = signature.points.len(),
        "Generated signature"
    );
    signature
}

fn baseline_confidence(equipment: &Equipment) -> f64 {
    if let Some(summary) = &equipment.normalization {
        return summary.average_confidence;
    }
    if equipment.points.is_empty() {
        return 0.0;
    }
    equipment
        .points
        .iter()
        .map(|p| p.normalization_confidence)
        .sum::<f64>()
        / equipment.points.len() as f64
}

/// User edit of a signature; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub equipment_type: Option<String>,
    #[serde(default)]
    pub points: Option<Vec<PointTemplate>>,
}

/// Apply a user edit and mark the signature `user-validated`
///
/// # Errors
/// `InvalidInput` for a blank name or equipment type, or an empty point list.
pub fn apply_signature_edit(signature: &mut Signature, edit: SignatureEdit) -> Result<()> {
    if let Some(name) = &edit.name {
        if name.trim().is_empty() {
            return Err(AssignmentError::InvalidInput("name must not be blank".into()));
        }
    }
    if let Some(equipment_type) = &edit.equipment_type {
        if equipment_type.trim().is_empty() {
            return Err(AssignmentError::InvalidInput(
                "equipment_type must not be blank".into(),
            ));
        }
    }
    if edit.points.as_ref().map_or(false, Vec::is_empty) {
        return Err(AssignmentError::InvalidInput(
            "points must not be empty".into(),
        ));
    }

    if let Some(name) = edit.name {
        signature.name = name.trim().to_string();
    }
    if let Some(equipment_type) = edit.equipment_type {
        signature.equipment_type = equipment_type.trim().to_string();
    }
    if let Some(points) = edit.points {
        signature.points = points;
        // Breakdown described the old template set
        signature.detailed_confidence = None;
    }
    signature.source = SignatureSource::UserValidated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigmap_common::models::{NormalizationSummary, Point, PointKind};

    #[test]
    fn generated_templates_prefer_canonical_names() {
        let mut normalized = Point::new("SaTmp", PointKind::Numeric).with_unit("°F");
        normalized.canonical_name = Some("Supply Air Temperature".into());
        normalized.normalization_confidence = 90.0;
        let mut raw = Point::new("Xyz1", PointKind::Boolean);
        raw.normalization_confidence = 30.0;

        let equipment = Equipment::new("eq-1", "VAV").with_points(vec![normalized, raw]);
        let signature = generate_signature(&equipment, "Generated VAV");

        assert_eq!(signature.source, SignatureSource::AutoGenerated);
        assert_eq!(signature.points[0].label, "Supply Air Temperature");
        assert_eq!(signature.points[0].unit.as_deref(), Some("°F"));
        assert_eq!(signature.points[1].label, "Xyz1");
        assert_eq!(signature.points[1].kind, PointKind::Boolean);
        assert_eq!(signature.confidence, 60.0);
        assert!(signature.matching_equipment_ids.is_empty());
        assert!(signature.id.starts_with("sig-"));
    }

    #[test]
    fn summary_wins_over_point_average() {
        let mut equipment = Equipment::new("eq-1", "AHU");
        equipment.normalization = Some(NormalizationSummary {
            total_points: 4,
            normalized_points: 3,
            average_confidence: 72.5,
        });
        assert_eq!(generate_signature(&equipment, "AHU").confidence, 72.5);
    }

    #[test]
    fn edit_marks_signature_user_validated() {
        let equipment = Equipment::new("eq-1", "VAV")
            .with_points(vec![Point::new("ZnTmp", PointKind::Numeric)]);
        let mut signature = generate_signature(&equipment, "VAV");

        apply_signature_edit(
            &mut signature,
            SignatureEdit {
                name: Some("  Reheat VAV ".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(signature.name, "Reheat VAV");
        assert_eq!(signature.source, SignatureSource::UserValidated);
        assert_eq!(signature.points.len(), 1);
    }

    #[test]
    fn invalid_edit_leaves_signature_untouched() {
        let equipment = Equipment::new("eq-1", "VAV");
        let mut signature = generate_signature(&equipment, "VAV");
        let before = signature.clone();

        let err = apply_signature_edit(
            &mut signature,
            SignatureEdit {
                name: Some("Renamed".into()),
                points: Some(vec![]),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AssignmentError::InvalidInput(_)));
        assert_eq!(signature, before);
    }
}
