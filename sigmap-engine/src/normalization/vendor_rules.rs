//! Vendor-specific rule registry
//!
//! Rule sets are declarative data (`rules/vendors.toml`) compiled once into
//! regexes. The registry is keyed by normalized vendor name and alias, so
//! "Schneider Electric", "schneider-electric" and "TAC" all resolve to the
//! same set.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::dictionary::registry_key;
use super::NormalizationError;

const BUILTIN_RULES: &str = include_str!("../../rules/vendors.toml");

/// Shortest registry key accepted for a substring match of a vendor name
const MIN_FUZZY_KEY_LEN: usize = 4;

#[derive(Debug, Deserialize)]
struct VendorFile {
    #[serde(default)]
    vendor: Vec<VendorSpec>,
}

#[derive(Debug, Deserialize)]
struct VendorSpec {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    abbreviation: Vec<AbbreviationSpec>,
    #[serde(default)]
    partial: Vec<PatternSpec>,
    #[serde(default)]
    idiom: Vec<PatternSpec>,
}

#[derive(Debug, Deserialize)]
struct AbbreviationSpec {
    token: String,
    expansion: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PatternSpec {
    pattern: String,
    expansion: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VendorAbbreviation {
    pub expansion: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub expansion: String,
    pub tags: Vec<String>,
}

impl CompiledPattern {
    fn compile(vendor: &str, spec: PatternSpec) -> Result<Self, NormalizationError> {
        let regex = Regex::new(&spec.pattern).map_err(|e| {
            NormalizationError::Rules(format!("vendor '{}' pattern '{}': {}", vendor, spec.pattern, e))
        })?;
        Ok(Self {
            regex,
            expansion: spec.expansion,
            tags: spec.tags,
        })
    }
}

/// Compiled rules for one vendor
#[derive(Debug, Clone)]
pub struct VendorRuleSet {
    pub name: String,
    pub aliases: Vec<String>,
    abbreviations: HashMap<String, VendorAbbreviation>,
    partials: Vec<CompiledPattern>,
    idioms: Vec<CompiledPattern>,
}

impl VendorRuleSet {
    fn compile(spec: VendorSpec) -> Result<Self, NormalizationError> {
        let abbreviations = spec
            .abbreviation
            .into_iter()
            .map(|a| {
                (
                    a.token.to_lowercase(),
                    VendorAbbreviation {
                        expansion: a.expansion,
                        tags: a.tags,
                    },
                )
            })
            .collect();
        let partials = spec
            .partial
            .into_iter()
            .map(|p| CompiledPattern::compile(&spec.name, p))
            .collect::<Result<Vec<_>, _>>()?;
        let idioms = spec
            .idiom
            .into_iter()
            .map(|p| CompiledPattern::compile(&spec.name, p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: spec.name,
            aliases: spec.aliases,
            abbreviations,
            partials,
            idioms,
        })
    }

    /// Exact, case-insensitive whole-token abbreviation
    pub fn abbreviation(&self, token: &str) -> Option<&VendorAbbreviation> {
        self.abbreviations.get(&token.to_lowercase())
    }

    /// First partial pattern matching inside `token`, with the matched byte range
    pub fn partial_match(&self, token: &str) -> Option<(&CompiledPattern, std::ops::Range<usize>)> {
        self.partials.iter().find_map(|p| {
            let m = p.regex.find(token)?;
            if m.as_str().is_empty() {
                return None;
            }
            Some((p, m.range()))
        })
    }

    /// Every idiom matching the full raw label
    pub fn idioms_matching<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a CompiledPattern> + 'a {
        self.idioms.iter().filter(move |p| p.regex.is_match(label))
    }

    fn keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(registry_key(&self.name)).chain(self.aliases.iter().map(|a| registry_key(a)))
    }

    fn expansion_words(&self) -> impl Iterator<Item = &str> {
        self.abbreviations
            .values()
            .map(|a| a.expansion.as_str())
            .chain(self.partials.iter().map(|p| p.expansion.as_str()))
            .flat_map(str::split_whitespace)
    }
}

/// Registry of vendor rule sets
#[derive(Debug, Clone, Default)]
pub struct VendorRegistry {
    sets: Vec<VendorRuleSet>,
    keys: HashMap<String, usize>,
}

impl VendorRegistry {
    /// Rule sets compiled into the binary
    pub fn builtin() -> Result<Self, NormalizationError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, NormalizationError> {
        let file: VendorFile = toml::from_str(content)
            .map_err(|e| NormalizationError::Rules(format!("vendor rules: {}", e)))?;

        let mut registry = Self::default();
        for spec in file.vendor {
            registry.insert(VendorRuleSet::compile(spec)?);
        }
        Ok(registry)
    }

    /// Load an extra rules file and merge it over the current sets
    pub fn merge_file(&mut self, path: &Path) -> Result<(), NormalizationError> {
        let content = std::fs::read_to_string(path).map_err(|e| NormalizationError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let extra = Self::from_toml_str(&content)?;
        let count = extra.sets.len();
        self.merge(extra);
        info!(path = %path.display(), vendors = count, "Merged extra vendor rules");
        Ok(())
    }

    /// Sets in `other` replace sets with the same vendor name
    pub fn merge(&mut self, other: VendorRegistry) {
        for set in other.sets {
            self.insert(set);
        }
    }

    fn insert(&mut self, set: VendorRuleSet) {
        let name_key = registry_key(&set.name);
        match self
            .sets
            .iter()
            .position(|existing| registry_key(&existing.name) == name_key)
        {
            Some(index) => {
                debug!(vendor = %set.name, "Replacing vendor rule set");
                self.sets[index] = set;
            }
            None => self.sets.push(set),
        }
        self.rebuild_keys();
    }

    fn rebuild_keys(&mut self) {
        self.keys.clear();
        for (index, set) in self.sets.iter().enumerate() {
            for key in set.keys() {
                if !key.is_empty() {
                    self.keys.insert(key, index);
                }
            }
        }
    }

    /// Rule set for a vendor name
    ///
    /// Exact key first, then the longest registered key contained in the
    /// normalized name ("Schneider Electric Buildings" -> Schneider).
    pub fn get(&self, vendor: &str) -> Option<&VendorRuleSet> {
        let key = registry_key(vendor);
        if key.is_empty() {
            return None;
        }
        if let Some(&index) = self.keys.get(&key) {
            return self.sets.get(index);
        }
        self.keys
            .iter()
            .filter(|(k, _)| k.len() >= MIN_FUZZY_KEY_LEN && key.contains(k.as_str()))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .and_then(|(_, &index)| self.sets.get(index))
    }

    pub fn vendor_names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Lower-cased words produced by any vendor substitution
    pub fn expansion_words(&self) -> BTreeSet<String> {
        self.sets
            .iter()
            .flat_map(VendorRuleSet::expansion_words)
            .map(str::to_lowercase)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
