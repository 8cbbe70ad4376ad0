//! The eight confidence factors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FACTOR_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    PointNameSimilarity,
    PointCountMatch,
    PointTypeMatch,
    VendorModelMatch,
    EquipmentTypeMatch,
    HistoricalAccuracy,
    SemanticSimilarity,
    StructuralConsistency,
}

impl Factor {
    /// Canonical order; weight vectors are indexed by it
    pub const ALL: [Factor; FACTOR_COUNT] = [
        Factor::PointNameSimilarity,
        Factor::PointCountMatch,
        Factor::PointTypeMatch,
        Factor::VendorModelMatch,
        Factor::EquipmentTypeMatch,
        Factor::HistoricalAccuracy,
        Factor::SemanticSimilarity,
        Factor::StructuralConsistency,
    ];

    pub fn index(&self) -> usize {
        match self {
            Factor::PointNameSimilarity => 0,
            Factor::PointCountMatch => 1,
            Factor::PointTypeMatch => 2,
            Factor::VendorModelMatch => 3,
            Factor::EquipmentTypeMatch => 4,
            Factor::HistoricalAccuracy => 5,
            Factor::SemanticSimilarity => 6,
            Factor::StructuralConsistency => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::PointNameSimilarity => "point_name_similarity",
            Factor::PointCountMatch => "point_count_match",
            Factor::PointTypeMatch => "point_type_match",
            Factor::VendorModelMatch => "vendor_model_match",
            Factor::EquipmentTypeMatch => "equipment_type_match",
            Factor::HistoricalAccuracy => "historical_accuracy",
            Factor::SemanticSimilarity => "semantic_similarity",
            Factor::StructuralConsistency => "structural_consistency",
        }
    }
}

/// Factor vector for one (equipment, signature) pair, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub point_name_similarity: f64,
    pub point_count_match: f64,
    pub point_type_match: f64,
    pub vendor_model_match: f64,
    pub equipment_type_match: f64,
    pub historical_accuracy: f64,
    pub semantic_similarity: f64,
    pub structural_consistency: f64,
}

impl ConfidenceFactors {
    pub fn from_array(values: [f64; FACTOR_COUNT]) -> Self {
        let [name, count, kind, vendor, equipment_type, history, semantic, structural] = values;
        Self {
            point_name_similarity: name,
            point_count_match: count,
            point_type_match: kind,
            vendor_model_match: vendor,
            equipment_type_match: equipment_type,
            historical_accuracy: history,
            semantic_similarity: semantic,
            structural_consistency: structural,
        }
    }

    pub fn to_array(&self) -> [f64; FACTOR_COUNT] {
        [
            self.point_name_similarity,
            self.point_count_match,
            self.point_type_match,
            self.vendor_model_match,
            self.equipment_type_match,
            self.historical_accuracy,
            self.semantic_similarity,
            self.structural_consistency,
        ]
    }

    pub fn get(&self, factor: Factor) -> f64 {
        self.to_array()[factor.index()]
    }

    /// Every factor clamped to [0, 100]; NaN becomes 0
    pub fn clamped(&self) -> Self {
        Self::from_array(self.to_array().map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }))
    }

    /// Factor name -> value, for signature breakdowns and JSON output
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        Factor::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), self.get(*f)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_order_follows_factor_index() {
        let factors = ConfidenceFactors::from_array([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        for (i, factor) in Factor::ALL.iter().enumerate() {
            assert_eq!(factor.index(), i);
            assert_eq!(factors.get(*factor), (i + 1) as f64);
        }
    }

    #[test]
    fn clamping_bounds_every_factor() {
        let factors = ConfidenceFactors::from_array([-5.0, 150.0, f64::NAN, 50.0, 0.0, 100.0, 101.0, 99.0]);
        assert_eq!(
            factors.clamped().to_array(),
            [0.0, 100.0, 0.0, 50.0, 0.0, 100.0, 100.0, 99.0]
        );
    }
}
