//! Numerical utilities for benchmark table processing.

pub mod math;

pub use math::accumulate::*;
pub use math::rank::*;
