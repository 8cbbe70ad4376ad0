//! Human-readable match explanations
//!
//! Presentation only: nothing here feeds back into the score.

use super::factors::ConfidenceFactors;

pub fn explain(
    factors: &ConfidenceFactors,
    has_history: bool,
    confidence: f64,
    threshold: f64,
) -> Vec<String> {
    let mut reasons = Vec::new();

    let name = factors.point_name_similarity;
    if name > 80.0 {
        reasons.push(format!("High point name similarity ({:.1}%)", name));
    } else if name >= 60.0 {
        reasons.push(format!("Moderate point name similarity ({:.1}%)", name));
    } else if name >= 40.0 {
        reasons.push(format!("Partial point name similarity ({:.1}%)", name));
    } else {
        reasons.push(format!("Low point name similarity ({:.1}%)", name));
    }

    let count = factors.point_count_match;
    if count >= 100.0 {
        reasons.push("Point count matches exactly".to_string());
    } else if count >= 70.0 {
        reasons.push(format!("Similar point count ({:.1}%)", count));
    } else {
        reasons.push(format!("Point count differs significantly ({:.1}%)", count));
    }

    let kind = factors.point_type_match;
    if kind > 80.0 {
        reasons.push("Point types and units align".to_string());
    } else if kind > 0.0 && kind < 50.0 {
        reasons.push(format!("Point type/unit mismatches ({:.1}%)", kind));
    }

    if factors.vendor_model_match > 0.0 {
        reasons.push("Vendor/model information available".to_string());
    }

    match factors.equipment_type_match {
        t if t >= 100.0 => reasons.push("Exact equipment type match".to_string()),
        t if t > 0.0 => reasons.push("Compatible equipment type".to_string()),
        _ => reasons.push("Equipment type mismatch".to_string()),
    }

    let history = factors.historical_accuracy;
    if !has_history {
        reasons.push("No historical data (neutral)".to_string());
    } else if history >= 80.0 {
        reasons.push(format!("Strong historical accuracy ({:.1}%)", history));
    } else if history < 50.0 {
        reasons.push(format!("Poor historical accuracy ({:.1}%)", history));
    }

    if factors.semantic_similarity > 70.0 {
        reasons.push("Strong semantic overlap".to_string());
    }
    if factors.structural_consistency > 80.0 {
        reasons.push("Consistent point structure".to_string());
    }

    if confidence >= threshold {
        reasons.push(format!("Meets auto-assignment threshold ({:.0}%)", threshold));
    } else {
        reasons.push(format!(
            "Below auto-assignment threshold ({:.1}% < {:.0}%)",
            confidence, threshold
        ));
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clauses_follow_factor_bands() {
        let factors = ConfidenceFactors {
            point_name_similarity: 85.0,
            point_count_match: 100.0,
            equipment_type_match: 0.0,
            ..Default::default()
        };
        let reasons = explain(&factors, false, 60.0, 95.0);
        assert!(reasons[0].starts_with("High point name similarity"));
        assert!(reasons.contains(&"Point count matches exactly".to_string()));
        assert!(reasons.contains(&"Equipment type mismatch".to_string()));
        assert!(reasons.contains(&"No historical data (neutral)".to_string()));
        assert!(reasons.last().unwrap().starts_with("Below auto-assignment threshold"));
    }
}
