//! # VIGIA Core
//!
//! Core types for the VIGIA deforestation monitoring engine.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced raster grid over `ndarray`
//! - `GeoTransform`: affine transformation for georeferencing
//! - `Crs`: coordinate reference system handling
//! - Alert vector types (`Alert`, `AlertCollection`, `Confidence`)
//! - The workspace error taxonomy
//!
//! Grids entering the engine are assumed co-registered (same shape,
//! transform, CRS) by the acquisition collaborator; mismatches are
//! rejected with explicit errors rather than silently realigned.

pub mod crs;
pub mod error;
pub mod raster;
pub mod vector;

pub use crs::Crs;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{Alert, AlertCollection, AlertSummary, Confidence};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::Crs;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{Alert, AlertCollection, AlertSummary, Confidence};
}
