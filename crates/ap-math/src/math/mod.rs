//! Core math modules.

pub mod robust;
pub mod runs;
