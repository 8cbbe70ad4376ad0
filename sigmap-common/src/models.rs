//! Equipment, point and signature models
//!
//! Records arrive already parsed from the ingestion layer. The engine only
//! mutates the normalization fields of points, the normalization summary of
//! equipment, and signature bookkeeping (matches, learning data).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Most recent accuracy samples kept on a signature's learning data
pub const ACCURACY_TREND_LEN: usize = 20;

/// Data kind of a point's present value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Numeric,
    Boolean,
    String,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::Numeric => "numeric",
            PointKind::Boolean => "boolean",
            PointKind::String => "string",
        }
    }
}

/// Semantic metadata written by the normalization engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSemantics {
    /// A vendor rule contributed to the canonical name
    pub is_vendor_specific: bool,
    /// The equipment-type prefix was applied
    pub is_equipment_specific: bool,
    /// A vendor name was supplied for the normalization
    pub has_vendor_context: bool,
    /// An equipment type was supplied for the normalization
    pub has_equipment_context: bool,
    /// Ordered explanation of every expansion step
    pub reasoning: Vec<String>,
}

/// One sensed or controlled value on a piece of equipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Raw label as exported by the field controller
    pub label: String,
    /// Reference to the present value (object id, history id, ...)
    #[serde(default)]
    pub value_ref: Option<String>,
    pub kind: PointKind,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub description: String,

    // Normalization output (overwritten on each run)
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub normalization_confidence: f64,
    #[serde(default)]
    pub semantics: Option<PointSemantics>,
}

impl Point {
    pub fn new(label: impl Into<String>, kind: PointKind) -> Self {
        Self {
            label: label.into(),
            value_ref: None,
            kind,
            unit: None,
            writable: false,
            description: String::new(),
            canonical_name: None,
            tags: Vec::new(),
            normalization_confidence: 0.0,
            semantics: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Canonical name when normalized, raw label otherwise
    pub fn display_name(&self) -> &str {
        self.canonical_name.as_deref().unwrap_or(&self.label)
    }
}

/// Aggregate normalization statistics for one equipment item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub total_points: usize,
    pub normalized_points: usize,
    pub average_confidence: f64,
}

/// A physical device instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    /// Connector / source the equipment was discovered through
    #[serde(default)]
    pub connector_id: String,
    /// Free-form category ("VAV", "AHU", ...)
    pub equipment_type: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub normalization: Option<NormalizationSummary>,
}

impl Equipment {
    pub fn new(id: impl Into<String>, equipment_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connector_id: String::new(),
            equipment_type: equipment_type.into(),
            vendor: None,
            model: None,
            points: Vec::new(),
            normalization: None,
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }
}

/// Expected point inside a signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTemplate {
    pub label: String,
    pub kind: PointKind,
    #[serde(default)]
    pub unit: Option<String>,
}

impl PointTemplate {
    pub fn new(label: impl Into<String>, kind: PointKind, unit: Option<&str>) -> Self {
        Self {
            label: label.into(),
            kind,
            unit: unit.map(str::to_string),
        }
    }
}

/// Provenance of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureSource {
    AutoGenerated,
    UserValidated,
    UserCreated,
}

impl SignatureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureSource::AutoGenerated => "auto-generated",
            SignatureSource::UserValidated => "user-validated",
            SignatureSource::UserCreated => "user-created",
        }
    }
}

/// Learning bookkeeping carried on a signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningData {
    pub confirmations: u64,
    pub rejections: u64,
    pub last_updated: DateTime<Utc>,
    /// Accuracy after each outcome, oldest first
    pub accuracy_trend: Vec<f64>,
}

impl LearningData {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            confirmations: 0,
            rejections: 0,
            last_updated: now,
            accuracy_trend: Vec::new(),
        }
    }

    /// Record one confirmed/rejected outcome and push the new accuracy
    pub fn record(&mut self, confirmed: bool, now: DateTime<Utc>) {
        if confirmed {
            self.confirmations += 1;
        } else {
            self.rejections += 1;
        }
        self.last_updated = now;

        let total = self.confirmations + self.rejections;
        self.accuracy_trend
            .push(self.confirmations as f64 / total as f64);
        if self.accuracy_trend.len() > ACCURACY_TREND_LEN {
            let overflow = self.accuracy_trend.len() - ACCURACY_TREND_LEN;
            self.accuracy_trend.drain(..overflow);
        }
    }
}

/// Reusable template describing the expected point set of an equipment class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: String,
    pub name: String,
    pub equipment_type: String,
    pub points: Vec<PointTemplate>,
    pub source: SignatureSource,
    /// Baseline confidence (0-100)
    pub confidence: f64,
    /// Equipment currently assigned to this signature
    #[serde(default)]
    pub matching_equipment_ids: Vec<String>,
    /// Factor name -> value of the most detailed known breakdown
    #[serde(default)]
    pub detailed_confidence: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub learning: Option<LearningData>,
}

impl Signature {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        equipment_type: impl Into<String>,
        points: Vec<PointTemplate>,
        source: SignatureSource,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            equipment_type: equipment_type.into(),
            points,
            source,
            confidence: 0.0,
            matching_equipment_ids: Vec::new(),
            detailed_confidence: None,
            learning: None,
        }
    }

    /// Add an equipment id to the match set (no duplicates)
    pub fn add_match(&mut self, equipment_id: &str) {
        if !self.matching_equipment_ids.iter().any(|id| id == equipment_id) {
            self.matching_equipment_ids.push(equipment_id.to_string());
        }
    }

    /// Remove an equipment id from the match set
    pub fn remove_match(&mut self, equipment_id: &str) {
        self.matching_equipment_ids.retain(|id| id != equipment_id);
    }
}

/// Running aggregate per signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureAnalytics {
    pub signature_id: String,
    pub total_matches: u64,
    pub accurate_matches: u64,
    /// accurate_matches / total_matches (0-1)
    pub accuracy: f64,
    pub average_confidence: f64,
    pub usage_frequency: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub positive_feedback: u64,
    pub negative_feedback: u64,
}

impl SignatureAnalytics {
    pub fn new(signature_id: impl Into<String>) -> Self {
        Self {
            signature_id: signature_id.into(),
            total_matches: 0,
            accurate_matches: 0,
            accuracy: 0.0,
            average_confidence: 0.0,
            usage_frequency: 0,
            last_used: None,
            positive_feedback: 0,
            negative_feedback: 0,
        }
    }

    /// Signature was used for an assignment
    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        self.usage_frequency += 1;
        self.last_used = Some(now);
    }

    /// Confirmed or rejected outcome for a match made at `confidence`
    pub fn record_outcome(&mut self, confirmed: bool, confidence: f64, now: DateTime<Utc>) {
        let previous = self.total_matches as f64;
        self.total_matches += 1;
        if confirmed {
            self.accurate_matches += 1;
            self.positive_feedback += 1;
        } else {
            self.negative_feedback += 1;
        }
        self.accuracy = self.accurate_matches as f64 / self.total_matches as f64;
        self.average_confidence =
            (self.average_confidence * previous + confidence) / self.total_matches as f64;
        self.last_used = Some(now);
    }

    /// Share of positive feedback, None before any feedback
    pub fn positive_feedback_ratio(&self) -> Option<f64> {
        let total = self.positive_feedback + self.negative_feedback;
        if total == 0 {
            None
        } else {
            Some(self.positive_feedback as f64 / total as f64)
        }
    }

    pub fn has_history(&self) -> bool {
        self.total_matches > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_running_average() {
        let now = Utc::now();
        let mut analytics = SignatureAnalytics::new("sig-1");
        analytics.record_outcome(true, 90.0, now);
        analytics.record_outcome(false, 70.0, now);

        assert_eq!(analytics.total_matches, 2);
        assert_eq!(analytics.accurate_matches, 1);
        assert!((analytics.accuracy - 0.5).abs() < 1e-9);
        assert!((analytics.average_confidence - 80.0).abs() < 1e-9);
        assert_eq!(analytics.positive_feedback_ratio(), Some(0.5));
    }

    #[test]
    fn signature_match_set_has_no_duplicates() {
        let mut sig = Signature::new("s", "VAV", "VAV", vec![], SignatureSource::UserCreated);
        sig.add_match("eq-1");
        sig.add_match("eq-1");
        sig.add_match("eq-2");
        assert_eq!(sig.matching_equipment_ids, vec!["eq-1", "eq-2"]);
        sig.remove_match("eq-1");
        assert_eq!(sig.matching_equipment_ids, vec!["eq-2"]);
    }

    #[test]
    fn learning_trend_is_bounded() {
        let now = Utc::now();
        let mut data = LearningData::new(now);
        for i in 0..(ACCURACY_TREND_LEN + 5) {
            data.record(i % 2 == 0, now);
        }
        assert_eq!(data.accuracy_trend.len(), ACCURACY_TREND_LEN);
        assert_eq!(data.confirmations + data.rejections, (ACCURACY_TREND_LEN + 5) as u64);
    }

    #[test]
    fn point_kind_serializes_lowercase() {
        let json = serde_json::to_string(&PointKind::Numeric).unwrap();
        assert_eq!(json, "\"numeric\"");
        let source = serde_json::to_string(&SignatureSource::UserValidated).unwrap();
        assert_eq!(source, "\"user-validated\"");
    }
}
