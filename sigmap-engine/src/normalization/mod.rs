//! Point-name normalization engine
//!
//! Expands raw controller labels ("SaTmp", "RmTmpSpt") into canonical names
//! ("Supply Air Temperature"), semantic tags and a 0-100 confidence.
//!
//! # Pipeline
//! 1. Vendor rules when the vendor is known: pre-expansion of short
//!    ambiguous tokens, exact vendor abbreviations (+20), partial patterns
//!    inside a token (+12), whole-label idioms (+8 each)
//! 2. General dictionary: exact token (+15), two-key compound (+8), then up
//!    to three passes over leftover compound tokens (+5 per productive pass)
//! 3. Equipment-type context prefix when absent (+5)
//! 4. Title-casing with an upper-case acronym allow-list
//! 5. Unit family and writable tags
//! 6. Baseline 50 when any token expanded (25 otherwise), clamp, de-duplicate
//!
//! Steps 1-4 depend only on (label, equipment type, vendor) and are cached.

pub mod cache;
pub mod dictionary;
pub mod tokenizer;
pub mod vendor_rules;

use serde::{Deserialize, Serialize};
use sigmap_common::config::NormalizationConfig;
use sigmap_common::models::{Equipment, NormalizationSummary, Point, PointSemantics};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::units::unit_family;
use cache::{CacheKey, NormalizationCache};
use dictionary::AbbreviationDictionary;
use tokenizer::{pre_expand, split_tokens};
use vendor_rules::{VendorRegistry, VendorRuleSet};

const BASELINE_EXPANDED: f64 = 50.0;
const BASELINE_UNRECOGNIZED: f64 = 25.0;
const VENDOR_EXACT_BONUS: f64 = 20.0;
const VENDOR_PARTIAL_BONUS: f64 = 12.0;
const VENDOR_IDIOM_BONUS: f64 = 8.0;
const DICTIONARY_EXACT_BONUS: f64 = 15.0;
const DICTIONARY_PARTIAL_BONUS: f64 = 8.0;
const DICTIONARY_PASS_BONUS: f64 = 5.0;
const CONTEXT_PREFIX_BONUS: f64 = 5.0;
const MAX_EXPANSION_PASSES: usize = 3;

/// Longer tokens are treated as words, not packed abbreviations
const MAX_COMPOUND_TOKEN_LEN: usize = 8;

/// Words kept upper-case in canonical names
const UPPERCASE_ACRONYMS: [&str; 10] = [
    "VAV", "AHU", "RTU", "FCU", "VFD", "UPS", "PDU", "BAS", "DDC", "PLC",
];

/// Rule loading errors (normalization itself never fails)
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("Invalid normalization rules: {0}")]
    Rules(String),

    #[error("Failed to read rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which step produced the canonical name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMethod {
    VendorSpecific,
    Dictionary,
    EquipmentContext,
    Unchanged,
}

impl NormalizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMethod::VendorSpecific => "vendor-specific",
            NormalizationMethod::Dictionary => "dictionary",
            NormalizationMethod::EquipmentContext => "equipment-context",
            NormalizationMethod::Unchanged => "unchanged",
        }
    }
}

/// Label-dependent part of a normalization (the cached value)
#[derive(Debug, Clone, PartialEq)]
pub struct LabelExpansion {
    pub canonical_name: String,
    pub tags: Vec<String>,
    pub confidence: f64,
    pub method: NormalizationMethod,
    pub reasoning: Vec<String>,
    pub vendor_specific: bool,
    pub equipment_specific: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub canonical_name: String,
    pub tags: Vec<String>,
    /// 0-100
    pub confidence: f64,
    pub method: NormalizationMethod,
    pub reasoning: Vec<String>,
    pub vendor_specific: bool,
    pub equipment_specific: bool,
    pub has_vendor_context: bool,
    pub has_equipment_context: bool,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    expanded: bool,
}

/// Working state of one label expansion
struct Expansion<'a> {
    canonical_words: &'a BTreeSet<String>,
    tokens: Vec<Token>,
    tags: Vec<String>,
    reasoning: Vec<String>,
    bonus: f64,
    any_expanded: bool,
    vendor_specific: bool,
    dictionary_used: bool,
    equipment_specific: bool,
}

impl<'a> Expansion<'a> {
    fn new(canonical_words: &'a BTreeSet<String>) -> Self {
        Self {
            canonical_words,
            tokens: Vec::new(),
            tags: Vec::new(),
            reasoning: Vec::new(),
            bonus: 0.0,
            any_expanded: false,
            vendor_specific: false,
            dictionary_used: false,
            equipment_specific: false,
        }
    }

    /// Raw text token; canonical words are never expanded again
    fn push_raw(&mut self, text: &str) {
        let expanded = self.canonical_words.contains(&text.to_lowercase());
        self.tokens.push(Token {
            text: text.to_string(),
            expanded,
        });
    }

    fn push_split(&mut self, text: &str) {
        for piece in split_tokens(text) {
            self.push_raw(&piece);
        }
    }

    fn push_expanded(&mut self, expansion: &str, tags: &[String]) {
        self.tokens.push(Token {
            text: expansion.to_string(),
            expanded: true,
        });
        self.tags.extend(tags.iter().cloned());
        self.any_expanded = true;
    }

    /// Push `text` with `range` replaced by an expansion
    fn push_replaced(&mut self, text: &str, range: std::ops::Range<usize>, expansion: &str, tags: &[String]) {
        let before = &text[..range.start];
        let after = &text[range.end..];
        if !before.is_empty() {
            self.push_raw(before);
        }
        self.push_expanded(expansion, tags);
        if !after.is_empty() {
            self.push_raw(after);
        }
    }

    fn apply_vendor(&mut self, rules: &VendorRuleSet, label: &str) {
        for token in std::mem::take(&mut self.tokens) {
            if token.expanded {
                self.tokens.push(token);
                continue;
            }

            if let Some(abbr) = rules.abbreviation(&token.text) {
                self.push_expanded(&abbr.expansion, &abbr.tags);
                self.bonus += VENDOR_EXACT_BONUS;
                self.vendor_specific = true;
                self.reasoning.push(format!(
                    "{} abbreviation '{}' -> '{}'",
                    rules.name, token.text, abbr.expansion
                ));
            } else if let Some((pattern, range)) = rules.partial_match(&token.text) {
                self.push_replaced(&token.text, range, &pattern.expansion, &pattern.tags);
                self.bonus += VENDOR_PARTIAL_BONUS;
                self.vendor_specific = true;
                self.reasoning.push(format!(
                    "{} partial match in '{}' -> '{}'",
                    rules.name, token.text, pattern.expansion
                ));
            } else {
                self.tokens.push(token);
            }
        }

        for idiom in rules.idioms_matching(label) {
            self.tags.extend(idiom.tags.iter().cloned());
            self.bonus += VENDOR_IDIOM_BONUS;
            self.vendor_specific = true;
            self.reasoning
                .push(format!("{} idiom recognized: {}", rules.name, idiom.expansion));
        }
    }

    fn apply_dictionary(&mut self, dictionary: &AbbreviationDictionary) {
        for token in std::mem::take(&mut self.tokens) {
            if token.expanded {
                self.tokens.push(token);
                continue;
            }
            for piece in split_tokens(&token.text) {
                if self.canonical_words.contains(&piece.to_lowercase()) {
                    self.push_raw(&piece);
                } else if let Some(entry) = dictionary.lookup(&piece) {
                    self.push_expanded(&entry.expansion, &entry.tags);
                    self.bonus += DICTIONARY_EXACT_BONUS;
                    self.dictionary_used = true;
                    self.reasoning
                        .push(format!("Dictionary '{}' -> '{}'", piece, entry.expansion));
                } else if let Some((head, tail)) = dictionary.split_compound(&piece) {
                    self.push_expanded(&head.expansion, &head.tags);
                    self.push_expanded(&tail.expansion, &tail.tags);
                    self.bonus += DICTIONARY_PARTIAL_BONUS;
                    self.dictionary_used = true;
                    self.reasoning.push(format!(
                        "Compound '{}' -> '{} {}'",
                        piece, head.expansion, tail.expansion
                    ));
                } else {
                    self.push_raw(&piece);
                }
            }
        }

        for pass in 1..=MAX_EXPANSION_PASSES {
            let mut changed = false;
            for token in std::mem::take(&mut self.tokens) {
                if token.expanded || token.text.chars().count() > MAX_COMPOUND_TOKEN_LEN {
                    self.tokens.push(token);
                    continue;
                }
                if let Some(entry) = dictionary.lookup(&token.text) {
                    self.push_expanded(&entry.expansion, &entry.tags);
                    changed = true;
                } else if let Some((entry, range)) = dictionary.find_embedded(&token.text) {
                    self.push_replaced(&token.text, range, &entry.expansion, &entry.tags);
                    changed = true;
                } else {
                    self.tokens.push(token);
                }
            }
            if !changed {
                break;
            }
            self.bonus += DICTIONARY_PASS_BONUS;
            self.dictionary_used = true;
            self.reasoning
                .push(format!("Expansion pass {} resolved embedded abbreviations", pass));
        }
    }

    fn apply_context(&mut self, prefix: &str, equipment_type: &str) {
        if self.tokens.is_empty() {
            return;
        }
        let present = self
            .tokens
            .iter()
            .flat_map(|t| t.text.split_whitespace())
            .any(|word| word.eq_ignore_ascii_case(prefix));
        if present {
            return;
        }
        self.tokens.insert(
            0,
            Token {
                text: prefix.to_string(),
                expanded: true,
            },
        );
        self.bonus += CONTEXT_PREFIX_BONUS;
        self.equipment_specific = true;
        self.reasoning
            .push(format!("Equipment type '{}' adds prefix '{}'", equipment_type, prefix));
    }

    fn finish(self) -> LabelExpansion {
        let canonical_name = self
            .tokens
            .iter()
            .flat_map(|t| t.text.split_whitespace())
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ");

        let baseline = if self.any_expanded {
            BASELINE_EXPANDED
        } else {
            BASELINE_UNRECOGNIZED
        };

        let method = if self.vendor_specific {
            NormalizationMethod::VendorSpecific
        } else if self.dictionary_used {
            NormalizationMethod::Dictionary
        } else if self.equipment_specific {
            NormalizationMethod::EquipmentContext
        } else {
            NormalizationMethod::Unchanged
        };

        LabelExpansion {
            canonical_name,
            tags: dedup_tags(self.tags),
            confidence: (baseline + self.bonus).clamp(0.0, 100.0),
            method,
            reasoning: self.reasoning,
            vendor_specific: self.vendor_specific,
            equipment_specific: self.equipment_specific,
        }
    }
}

fn title_case(word: &str) -> String {
    let upper = word.to_uppercase();
    if UPPERCASE_ACRONYMS.contains(&upper.as_str()) {
        return upper;
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// De-duplicate keeping first-seen order
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Point-name normalizer with its rule registries and result cache
#[derive(Debug)]
pub struct PointNormalizer {
    dictionary: AbbreviationDictionary,
    vendors: VendorRegistry,
    canonical_words: BTreeSet<String>,
    cache: NormalizationCache,
}

impl PointNormalizer {
    /// Built-in rules plus the configured extra vendor file
    pub fn new(config: &NormalizationConfig) -> Result<Self, NormalizationError> {
        let dictionary = AbbreviationDictionary::builtin()?;
        let mut vendors = VendorRegistry::builtin()?;
        if let Some(path) = &config.extra_vendor_rules {
            vendors.merge_file(path)?;
        }
        Ok(Self::with_rules(dictionary, vendors, config))
    }

    pub fn with_rules(
        dictionary: AbbreviationDictionary,
        vendors: VendorRegistry,
        config: &NormalizationConfig,
    ) -> Self {
        let mut canonical_words = dictionary.expansion_words();
        canonical_words.extend(vendors.expansion_words());

        Self {
            dictionary,
            vendors,
            canonical_words,
            cache: NormalizationCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
        }
    }

    pub fn dictionary(&self) -> &AbbreviationDictionary {
        &self.dictionary
    }

    pub fn vendors(&self) -> &VendorRegistry {
        &self.vendors
    }

    /// Normalize one point label in the given vendor / equipment context
    pub fn normalize(
        &self,
        point: &Point,
        vendor: Option<&str>,
        equipment_type: Option<&str>,
    ) -> NormalizationResult {
        let vendor = non_blank(vendor);
        let equipment_type = non_blank(equipment_type);

        let key = CacheKey::new(&point.label, equipment_type, vendor);
        let expansion = match self.cache.get(&key) {
            Some(hit) => hit,
            None => {
                let fresh = Arc::new(self.expand_label(&point.label, vendor, equipment_type));
                self.cache.insert(key, Arc::clone(&fresh));
                fresh
            }
        };

        let mut tags = expansion.tags.clone();
        if let Some(family) = point.unit.as_deref().and_then(unit_family) {
            tags.push(family.tag().to_string());
        }
        let access = if point.writable { "writable" } else { "sensor" };
        tags.push(access.to_string());
        tags.push("point".to_string());

        NormalizationResult {
            canonical_name: expansion.canonical_name.clone(),
            tags: dedup_tags(tags),
            confidence: expansion.confidence,
            method: expansion.method,
            reasoning: expansion.reasoning.clone(),
            vendor_specific: expansion.vendor_specific,
            equipment_specific: expansion.equipment_specific,
            has_vendor_context: vendor.is_some(),
            has_equipment_context: equipment_type.is_some(),
        }
    }

    /// Normalize and write the result into the point
    pub fn normalize_point(
        &self,
        point: &mut Point,
        vendor: Option<&str>,
        equipment_type: Option<&str>,
    ) -> NormalizationResult {
        let result = self.normalize(point, vendor, equipment_type);
        point.canonical_name = Some(result.canonical_name.clone());
        point.tags = result.tags.clone();
        point.normalization_confidence = result.confidence;
        point.semantics = Some(PointSemantics {
            is_vendor_specific: result.vendor_specific,
            is_equipment_specific: result.equipment_specific,
            has_vendor_context: result.has_vendor_context,
            has_equipment_context: result.has_equipment_context,
            reasoning: result.reasoning.clone(),
        });
        result
    }

    /// Normalize every point and refresh the equipment's summary
    pub fn normalize_equipment(&self, equipment: &mut Equipment) -> NormalizationSummary {
        let vendor = equipment.vendor.clone();
        let equipment_type = equipment.equipment_type.clone();

        let mut normalized_points = 0;
        let mut confidence_sum = 0.0;
        for point in &mut equipment.points {
            let result = self.normalize_point(point, vendor.as_deref(), Some(equipment_type.as_str()));
            if result.canonical_name != point.label || result.confidence > BASELINE_EXPANDED {
                normalized_points += 1;
            }
            confidence_sum += result.confidence;
        }

        let total_points = equipment.points.len();
        let summary = NormalizationSummary {
            total_points,
            normalized_points,
            average_confidence: if total_points == 0 {
                0.0
            } else {
                confidence_sum / total_points as f64
            },
        };
        debug!(
            equipment_id = %equipment.id,
            total = total_points,
            normalized = normalized_points,
            average_confidence = summary.average_confidence,
            "Normalized equipment points"
        );
        equipment.normalization = Some(summary.clone());
        summary
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_entry_count(&self) -> u64 {
        self.cache.len()
    }

    fn expand_label(
        &self,
        label: &str,
        vendor: Option<&str>,
        equipment_type: Option<&str>,
    ) -> LabelExpansion {
        let mut expansion = Expansion::new(&self.canonical_words);

        match vendor.and_then(|v| self.vendors.get(v)) {
            Some(rules) => {
                let (rewritten, fired) = pre_expand(label, self.dictionary.pre_expansions());
                for entry in fired {
                    expansion.tags.extend(entry.tags.iter().cloned());
                    expansion.any_expanded = true;
                    expansion.dictionary_used = true;
                    expansion
                        .reasoning
                        .push(format!("Pre-expanded '{}' -> '{}'", entry.token, entry.expansion));
                }
                expansion.push_split(&rewritten);
                expansion.apply_vendor(rules, label);
            }
            None => expansion.push_split(label),
        }

        expansion.apply_dictionary(&self.dictionary);

        if let Some(equipment_type) = equipment_type {
            if let Some(prefix) = self.dictionary.context_prefix(equipment_type) {
                expansion.apply_context(prefix, equipment_type);
            }
        }

        expansion.finish()
    }
}
