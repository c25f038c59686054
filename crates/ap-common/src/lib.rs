//! Measurement autopsy common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the autopsy crates:
//! - Measurement and config identity types
//! - The closed set of bucket aggregators
//! - Artifact schema versioning
//! - The unified error taxonomy

pub mod agg;
pub mod error;
pub mod id;
pub mod schema;

pub use agg::AggFunc;
pub use error::{Error, Result};
pub use id::{ArtifactKind, ConfigKey, MeasurementId};
pub use schema::SCHEMA_VERSION;
