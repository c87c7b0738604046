//! Spectral index computation
//!
//! Band math for the six supported indices plus the sensor-aware
//! dispatch layer that maps index names to band requirements.

mod dispatch;
mod indices;

pub use dispatch::{required_bands, Band, BandSet, IndexKind, Sensor};
pub use indices::{
    bsi, dnbr, evi2, nbr, ndmi, ndvi, normalized_difference, savi, SaviParams,
    DNBR_HIGH_SEVERITY, DNBR_LOW_SEVERITY, DNBR_MODERATE_SEVERITY,
};
