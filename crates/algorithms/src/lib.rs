//! # VIGIA Algorithms
//!
//! Anomaly detection and temporal analytics for the VIGIA deforestation
//! monitoring engine:
//!
//! - `imagery`: spectral indices and sensor-aware band dispatch
//! - `detection`: monthly baselines, anomaly scoring, confidence fusion,
//!   clearing-type classification
//! - `vectorize`: alert polygon extraction from confidence grids
//! - `spi`: Standardized Precipitation Index and drought classes
//! - `timeseries`: Mann-Kendall, Sen's slope, harmonic breakpoints
//! - `statistics`: regional summaries of index grids
//!
//! All per-pixel loops are pure and row-parallel via rayon.

pub mod detection;
pub mod imagery;
pub mod spi;
pub mod statistics;
pub mod timeseries;
pub mod vectorize;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::detection::{
        classify_fire_vs_mechanical, detect_deforestation, BaselinePair, BaselineSet,
        ClearingType, DetectionParams, DetectionResult,
    };
    pub use crate::imagery::{Band, BandSet, IndexKind, Sensor};
    pub use crate::spi::{compute_spi, compute_spi_3month, DroughtClass};
    pub use crate::statistics::{regional_statistics, RegionalStats};
    pub use crate::timeseries::{
        detect_breakpoints, mann_kendall, sens_slope, BreakpointParams, TrendDirection,
    };
    pub use crate::vectorize::{vectorize_alerts, Connectivity, VectorizeParams};
}
