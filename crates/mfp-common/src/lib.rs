//! Shared types for the multi-fidelity benchmark tools.
//!
//! This crate provides foundational types used across the workspace:
//! - Dataset and configuration identity types
//! - Run identifiers for processing manifests
//! - The unified error type with stable error codes
//! - Output format selection for CLI rendering

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, Result};
pub use id::{ConfigId, DatasetKey, RunId};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
