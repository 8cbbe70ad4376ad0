//! # Sigmap Common Library
//!
//! Shared code for the signature-matching workspace:
//! - Equipment, point and signature models
//! - Event types (EngineEvent enum) and the EventBus
//! - Configuration loading and validation
//! - Tracing initialization

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
