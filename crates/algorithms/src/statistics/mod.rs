//! Aggregate statistics over grids

mod regional;

pub use regional::{regional_statistics, RegionalStats};
