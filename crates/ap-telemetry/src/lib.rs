//! Measurement autopsy overview storage.
//!
//! This crate provides:
//! - The in-memory overview table (buckets × signal aggregates)
//! - Arrow schema definitions for the persisted table
//! - Parquet encode/decode with deterministic bytes
//!
//! Parquet support sits behind the default `parquet` feature. Without it the
//! codec reports [`CodecError::Unavailable`] and callers surface a missing
//! dependency at their persistence boundary.

pub mod codec;
pub mod schema;
pub mod table;

pub use codec::{decode_overview, encode_overview, is_available, CodecError};
pub use table::{Bucket, OverviewTable, MAX_BUCKET_INDEX};

/// Parquet key/value entry holding the overview metadata document.
pub const OVERVIEW_METADATA_KEY: &str = "measurement_autopsy.overview";
