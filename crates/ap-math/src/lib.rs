//! Measurement autopsy math utilities.

pub mod math;

pub use math::robust::*;
pub use math::runs::*;
