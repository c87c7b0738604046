//! Temporal analytics over regional index series
//!
//! Long-horizon degradation trends (Mann-Kendall, Sen's slope) and
//! structural break monitoring against a fitted seasonal model.

mod harmonic;
mod trends;

pub use harmonic::{
    detect_breakpoints, harmonic_fit, BreakpointParams, Breakpoint, HarmonicFit,
};
pub use trends::{mann_kendall, sens_slope, SlopeResult, TrendDirection, TrendResult};
