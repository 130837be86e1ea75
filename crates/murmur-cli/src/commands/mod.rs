//! CLI command implementations.

pub mod order;
pub mod render;
pub mod units;
