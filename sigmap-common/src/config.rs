//! Configuration loading and validation
//!
//! Resolution priority for the configuration file:
//! 1. Explicit path (command-line argument)
//! 2. `SIGMAP_CONFIG` environment variable
//! 3. Platform config directory (`sigmap/sigmap.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file is not an error: a warning is logged and defaults are used.
//! `SIGMAP_LOG_LEVEL` and `SIGMAP_DATABASE` override the file afterwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "SIGMAP_CONFIG";
pub const LOG_LEVEL_ENV_VAR: &str = "SIGMAP_LOG_LEVEL";
pub const DATABASE_ENV_VAR: &str = "SIGMAP_DATABASE";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalization: NormalizationConfig,
    pub scoring: ScoringConfig,
    pub assignment: AssignmentConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

/// Point-name normalization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Lifetime of a cached normalization result
    pub cache_ttl_secs: u64,
    /// Maximum cached results before least-recently-used eviction
    pub cache_capacity: u64,
    /// Additional vendor rule sets merged over the built-in ones
    pub extra_vendor_rules: Option<PathBuf>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 30 * 60,
            cache_capacity: 10_000,
            extra_vendor_rules: None,
        }
    }
}

/// Confidence scoring and weight adaptation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum name similarity (0-1) for a template to count as matched
    pub name_match_threshold: f64,
    /// Minimum name similarity (0-1) for the kind/unit comparison
    pub type_match_threshold: f64,
    /// Aggregated confidence (0-100) required for auto-assignment
    pub auto_assignment_threshold: f64,
    /// Share of the correlation target blended into each weight update
    pub learning_rate: f64,
    /// Samples required before weights adapt
    pub min_learning_samples: usize,
    /// Most recent learning samples retained
    pub max_learning_samples: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            name_match_threshold: 0.6,
            type_match_threshold: 0.7,
            auto_assignment_threshold: 95.0,
            learning_rate: 0.1,
            min_learning_samples: 10,
            max_learning_samples: 1_000,
        }
    }
}

/// Auto-assignment orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Confidence (0-100) a recommendation needs to be surfaced
    pub high_confidence_threshold: f64,
    /// Assignments below this confidence (0-100) require review
    pub review_threshold: f64,
    /// Success rate (0-1) a verified signature must keep
    pub min_success_rate: f64,
    /// Positive confirmations needed to enter the verified pool
    pub min_confirmations: u64,
    /// Error rate (0-1) that raises an alert
    pub error_rate_alert_threshold: f64,
    /// Attempts before the alert threshold applies
    pub error_rate_min_attempts: u64,
    /// Error rate (0-1) that evicts a signature from the verified pool
    pub eviction_error_rate: f64,
    pub rollback_enabled: bool,
    /// Rolled-back pairs may be proposed again by later runs
    pub allow_reassignment_after_rollback: bool,
    /// Most recent audit entries retained
    pub audit_log_capacity: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 90.0,
            review_threshold: 98.0,
            min_success_rate: 0.85,
            min_confirmations: 3,
            error_rate_alert_threshold: 0.05,
            error_rate_min_attempts: 5,
            eviction_error_rate: 0.15,
            rollback_enabled: true,
            allow_reassignment_after_rollback: true,
            audit_log_capacity: 1_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (RUST_LOG overrides)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("sigmap.db"),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve, load, override from environment, and validate
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) => {
                if cli_path.is_some() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIGMAP_LOG_LEVEL` and `SIGMAP_DATABASE`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV_VAR) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
    }

    /// Reject out-of-range thresholds and empty capacities
    pub fn validate(&self) -> Result<()> {
        check_percent("scoring.auto_assignment_threshold", self.scoring.auto_assignment_threshold)?;
        check_percent("assignment.high_confidence_threshold", self.assignment.high_confidence_threshold)?;
        check_percent("assignment.review_threshold", self.assignment.review_threshold)?;

        check_ratio("scoring.name_match_threshold", self.scoring.name_match_threshold)?;
        check_ratio("scoring.type_match_threshold", self.scoring.type_match_threshold)?;
        check_ratio("scoring.learning_rate", self.scoring.learning_rate)?;
        check_ratio("assignment.min_success_rate", self.assignment.min_success_rate)?;
        check_ratio("assignment.error_rate_alert_threshold", self.assignment.error_rate_alert_threshold)?;
        check_ratio("assignment.eviction_error_rate", self.assignment.eviction_error_rate)?;

        if self.normalization.cache_capacity == 0 {
            return Err(Error::Config("normalization.cache_capacity must be > 0".to_string()));
        }
        if self.normalization.cache_ttl_secs == 0 {
            return Err(Error::Config("normalization.cache_ttl_secs must be > 0".to_string()));
        }
        if self.scoring.max_learning_samples == 0 {
            return Err(Error::Config("scoring.max_learning_samples must be > 0".to_string()));
        }
        if self.scoring.min_learning_samples < 2 {
            // Correlation needs at least two samples
            return Err(Error::Config("scoring.min_learning_samples must be >= 2".to_string()));
        }
        if self.assignment.audit_log_capacity == 0 {
            return Err(Error::Config("assignment.audit_log_capacity must be > 0".to_string()));
        }
        Ok(())
    }
}

fn check_percent(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(Error::Config(format!("{} must be within [0, 100], got {}", name, value)));
    }
    Ok(())
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}

/// Resolve the configuration file path by priority
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("sigmap").join("sigmap.toml"))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sigmap"))
        .unwrap_or_else(|| PathBuf::from("./sigmap_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.auto_assignment_threshold, 95.0);
        assert_eq!(config.assignment.high_confidence_threshold, 90.0);
        assert_eq!(config.assignment.error_rate_alert_threshold, 0.05);
        assert_eq!(config.normalization.cache_ttl_secs, 1800);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [scoring]
            auto_assignment_threshold = 92.5
            "#,
        )
        .unwrap();

        assert_eq!(config.scoring.auto_assignment_threshold, 92.5);
        assert_eq!(config.scoring.name_match_threshold, 0.6);
        assert!(config.assignment.rollback_enabled);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = EngineConfig::default();
        config.assignment.eviction_error_rate = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = EngineConfig::default();
        config.scoring.auto_assignment_threshold = 101.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
