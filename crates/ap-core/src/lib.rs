//! Measurement autopsy core library.
//!
//! Builds a downsampled overview of a measurement log, runs the coarse
//! quality pass (missing data, flatlines, spikes, timestamp integrity) on
//! that overview only, and caches both artifacts under content-addressed
//! paths.
//!
//! Entry points live in [`autopsy`]; the engines ([`overview`], [`quality`],
//! [`windows`]) are pure and can be used without a cache.

pub mod autopsy;
pub mod logging;
pub mod overview;
pub mod quality;
pub mod rows;
pub mod store;
pub mod summary;
pub mod windows;

pub use autopsy::{
    build_overview, load_autopsy_pass1, load_overview, run_autopsy_pass1, AutopsyResultPass1,
    ConfigOrKey, OverviewHandle, Pass1Outcome,
};
pub use overview::aggregate;
pub use quality::{analyze, QcMetric, QualityReport, TimestampCheck, TimestampGap};
pub use rows::{Cell, Column, MemoryRows, RowSource};
pub use store::{CacheLookup, CacheStore, MeasurementMeta};
pub use windows::{build_windows, AnomalyWindow, Contributor};
