//! Error types for VIGIA

use thiserror::Error;

/// Main error type for VIGIA operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unknown spectral index: {0}")]
    UnknownIndex(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Band {band} required for {index} is missing from the scene")]
    MissingBand { band: String, index: String },

    #[error("No baseline available for {index} month {month}")]
    BaselineUnavailable { index: String, month: u32 },

    #[error("No index has a usable baseline; detection must be skipped")]
    NoUsableIndices,

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for VIGIA operations
pub type Result<T> = std::result::Result<T, Error>;
