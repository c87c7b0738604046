//! Anomaly detection pipeline
//!
//! Baseline construction, per-pixel anomaly scoring, multi-index
//! confidence fusion and clearing-type classification.

mod anomaly;
mod baseline;
mod clearing;
mod fusion;

pub use anomaly::{delta, zscore, MIN_STD};
pub use baseline::{
    median_composite, monthly_baselines, pixel_statistics, seasonal_composite, BaselinePair,
    BaselineSet, Season,
};
pub use clearing::{classify_fire_vs_mechanical, ClearingType, NBR_POST_FIRE_THRESHOLD};
pub use fusion::{detect_deforestation, DetectionParams, DetectionResult};
