//! Core math modules.

pub mod accumulate;
pub mod rank;
