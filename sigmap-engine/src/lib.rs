//! sigmap-engine library interface
//!
//! Point-name normalization, signature confidence scoring and the
//! auto-assignment orchestrator, plus the repository implementations they
//! persist through.

pub mod assignment;
pub mod db;
pub mod error;
pub mod normalization;
pub mod scoring;
pub mod signatures;
pub mod units;

pub use crate::assignment::AutoAssignmentOrchestrator;
pub use crate::db::{InMemoryRepository, SignatureRepository, SqliteRepository};
pub use crate::error::{AssignmentError, Result};
pub use crate::normalization::{NormalizationResult, PointNormalizer};
pub use crate::scoring::{ConfidenceScorer, SignatureMatchResult};
