//! String, keyword and structure similarity primitives

use sigmap_common::models::{Point, PointTemplate};
use std::collections::BTreeSet;

use crate::normalization::dictionary::registry_key;

/// Domain keywords used for semantic overlap
pub const SEMANTIC_KEYWORDS: [&str; 18] = [
    "temp", "flow", "pressure", "humidity", "setpoint", "command", "status", "alarm", "sensor",
    "air", "water", "steam", "supply", "return", "exhaust", "outside", "room", "zone",
];

/// Equipment-type pairs that score as compatible (registry keys)
const COMPATIBLE_TYPES: [(&str, &str); 8] = [
    ("ahu", "rtu"),
    ("ahu", "airhandler"),
    ("ahu", "airhandlingunit"),
    ("rtu", "rooftopunit"),
    ("vav", "terminalunit"),
    ("vav", "vavbox"),
    ("fcu", "fancoilunit"),
    ("fcu", "fancoil"),
];

/// Lower-case alphanumerics, the form every name comparison uses
pub fn match_key(name: &str) -> String {
    registry_key(name)
}

/// Normalized Levenshtein similarity in [0, 1]; empty names never match
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = match_key(a);
    let b = match_key(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Best of raw-label and canonical-name similarity against a template
pub fn point_similarity(template: &PointTemplate, point: &Point) -> f64 {
    let raw = name_similarity(&template.label, &point.label);
    match &point.canonical_name {
        Some(canonical) => raw.max(name_similarity(&template.label, canonical)),
        None => raw,
    }
}

/// Best matching point for a template, with its similarity
pub fn best_match<'a>(template: &PointTemplate, points: &'a [Point]) -> Option<(&'a Point, f64)> {
    points
        .iter()
        .map(|p| (p, point_similarity(template, p)))
        .fold(None, |best, (p, s)| match best {
            Some((_, best_s)) if best_s >= s => best,
            _ => Some((p, s)),
        })
}

/// 100 for the same type, 75 for a compatible pair, else 0
pub fn equipment_type_score(a: &str, b: &str) -> f64 {
    let a = registry_key(a);
    let b = registry_key(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }
    let compatible = COMPATIBLE_TYPES
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x));
    if compatible {
        75.0
    } else {
        0.0
    }
}

pub fn keyword_set(name: &str) -> BTreeSet<&'static str> {
    let lower = name.to_lowercase();
    SEMANTIC_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}

/// Jaccard index of two keyword sets; two empty sets score 0
pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Structural role of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Sensor,
    Setpoint,
    Command,
    Status,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Sensor, Bucket::Setpoint, Bucket::Command, Bucket::Status];

    /// Substring heuristics on the name; writable non-setpoints are commands
    pub fn classify(name: &str, writable: bool) -> Self {
        let lower = name.to_lowercase();
        if ["setpoint", "stpt", "spt"].iter().any(|k| lower.contains(k)) {
            Bucket::Setpoint
        } else if writable || ["command", "cmd"].iter().any(|k| lower.contains(k)) {
            Bucket::Command
        } else if ["status", "sts", "stat", "alarm"].iter().any(|k| lower.contains(k)) {
            Bucket::Status
        } else {
            Bucket::Sensor
        }
    }
}

/// Bucket counts in `Bucket::ALL` order
pub fn bucket_counts(buckets: impl IntoIterator<Item = Bucket>) -> [usize; 4] {
    let mut counts = [0usize; 4];
    for bucket in buckets {
        if let Some(i) = Bucket::ALL.iter().position(|b| *b == bucket) {
            counts[i] += 1;
        }
    }
    counts
}

/// min/max of two counts; 0 when either is 0
pub fn count_ratio(a: usize, b: usize) -> f64 {
    let max = a.max(b);
    if max == 0 {
        return 0.0;
    }
    a.min(b) as f64 / max as f64
}
