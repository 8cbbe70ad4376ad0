//! General abbreviation dictionary
//!
//! Loaded from `rules/abbreviations.toml`. Besides the abbreviation table the
//! file carries the pre-expansion list used by the vendor splitter and the
//! equipment-type context prefixes.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

use super::NormalizationError;

const BUILTIN_RULES: &str = include_str!("../../rules/abbreviations.toml");

/// Shortest abbreviation searched for inside compound tokens
pub const MIN_EMBEDDED_KEY_LEN: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryEntry {
    pub abbr: String,
    pub expansion: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Short token expanded before splitting when followed by a capital
#[derive(Debug, Clone, Deserialize)]
pub struct PreExpansion {
    pub token: String,
    pub expansion: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentContext {
    pub equipment_type: String,
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    entry: Vec<DictionaryEntry>,
    #[serde(default)]
    pre_expansion: Vec<PreExpansion>,
    #[serde(default)]
    equipment_context: Vec<EquipmentContext>,
}

/// Lower-case alphanumerics only; used for every registry key
pub fn registry_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct AbbreviationDictionary {
    entries: HashMap<String, DictionaryEntry>,
    /// Keys of at least MIN_EMBEDDED_KEY_LEN chars, longest first
    embedded_keys: Vec<String>,
    pre_expansions: Vec<PreExpansion>,
    contexts: HashMap<String, String>,
}

impl AbbreviationDictionary {
    /// Dictionary compiled into the binary
    pub fn builtin() -> Result<Self, NormalizationError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, NormalizationError> {
        let file: DictionaryFile = toml::from_str(content)
            .map_err(|e| NormalizationError::Rules(format!("abbreviation dictionary: {}", e)))?;

        let mut entries = HashMap::with_capacity(file.entry.len());
        for entry in file.entry {
            entries.insert(entry.abbr.to_lowercase(), entry);
        }

        let mut embedded_keys: Vec<String> = entries
            .keys()
            .filter(|k| k.chars().count() >= MIN_EMBEDDED_KEY_LEN)
            .cloned()
            .collect();
        embedded_keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let contexts = file
            .equipment_context
            .into_iter()
            .map(|ctx| (registry_key(&ctx.equipment_type), ctx.prefix))
            .collect();

        Ok(Self {
            entries,
            embedded_keys,
            pre_expansions: file.pre_expansion,
            contexts,
        })
    }

    /// Exact, case-insensitive lookup
    pub fn lookup(&self, token: &str) -> Option<&DictionaryEntry> {
        self.entries.get(&token.to_lowercase())
    }

    /// Split a token into two dictionary keys, longest prefix first
    pub fn split_compound(&self, token: &str) -> Option<(&DictionaryEntry, &DictionaryEntry)> {
        let lower = token.to_lowercase();
        let boundaries: Vec<usize> = lower.char_indices().map(|(i, _)| i).skip(1).collect();
        boundaries.iter().rev().find_map(|&at| {
            let (head, tail) = lower.split_at(at);
            Some((self.entries.get(head)?, self.entries.get(tail)?))
        })
    }

    /// Longest key of at least MIN_EMBEDDED_KEY_LEN chars occurring inside `token`
    ///
    /// Returns the entry and the byte range of the occurrence in `token`.
    pub fn find_embedded(&self, token: &str) -> Option<(&DictionaryEntry, std::ops::Range<usize>)> {
        // Only ASCII lower-casing keeps every byte offset
        if !token.is_ascii() {
            return None;
        }
        let lower = token.to_ascii_lowercase();
        self.embedded_keys.iter().find_map(|key| {
            let start = lower.find(key.as_str())?;
            let entry = self.entries.get(key)?;
            Some((entry, start..start + key.len()))
        })
    }

    pub fn pre_expansions(&self) -> &[PreExpansion] {
        &self.pre_expansions
    }

    /// Contextual name prefix for an equipment type ("Terminal Unit" -> "VAV")
    pub fn context_prefix(&self, equipment_type: &str) -> Option<&str> {
        self.contexts
            .get(&registry_key(equipment_type))
            .map(String::as_str)
    }

    /// Every lower-cased word produced by an expansion
    pub fn expansion_words(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|e| e.expansion.as_str())
            .chain(self.pre_expansions.iter().map(|p| p.expansion.as_str()))
            .flat_map(str::split_whitespace)
            .map(str::to_lowercase)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_dictionary_loads() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        assert!(dict.len() > 50);
        assert_eq!(dict.lookup("TMP").unwrap().expansion, "Temperature");
        assert_eq!(dict.lookup("Spt").unwrap().tags, vec!["setpoint"]);
        assert!(dict.lookup("banana").is_none());
        assert_eq!(dict.pre_expansions().len(), 4);
    }

    #[test]
    fn context_prefix_uses_normalized_type() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        assert_eq!(dict.context_prefix("VAV"), Some("VAV"));
        assert_eq!(dict.context_prefix("terminal unit"), Some("VAV"));
        assert_eq!(dict.context_prefix("Air-Handler"), Some("AHU"));
        assert_eq!(dict.context_prefix("Pump"), None);
    }

    #[test]
    fn compound_split_needs_both_halves() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        let (head, tail) = dict.split_compound("RMTMP").unwrap();
        assert_eq!(head.expansion, "Room");
        assert_eq!(tail.expansion, "Temperature");
        assert!(dict.split_compound("RMXYZ").is_none());
    }

    #[test]
    fn embedded_search_prefers_longest_key() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        let (entry, range) = dict.find_embedded("ZNTMPSP").unwrap();
        assert_eq!(entry.expansion, "Temperature");
        assert_eq!(range, 2..5);
        assert!(dict.find_embedded("ramp").is_none());
    }

    #[test]
    fn embedded_search_skips_non_ascii_tokens() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        // same byte length after lower-casing, shifted offsets
        let token = "\u{23A}tmp\u{1E9E}";
        assert_eq!(token.len(), token.to_lowercase().len());
        assert!(dict.find_embedded(token).is_none());
    }

    #[test]
    fn expansion_words_are_lowercase() {
        let dict = AbbreviationDictionary::builtin().unwrap();
        let words = dict.expansion_words();
        assert!(words.contains("temperature"));
        assert!(words.contains("air"));
        assert!(!words.contains("tmp"));
    }

    #[test]
    fn malformed_rules_are_rejected() {
        let err = AbbreviationDictionary::from_toml_str("[[entry]]\nabbr = 3").unwrap_err();
        assert!(matches!(err, NormalizationError::Rules(_)));
    }
}
