//! # VIGIA Store
//!
//! Persistence layer for the VIGIA deforestation monitoring engine:
//!
//! - SQLite ledger for regional statistics and per-date alert summaries
//! - Dated GeoJSON alert files, written atomically
//! - Binary baseline grid files for the month-by-month detection baselines
//!
//! All handles are constructed explicitly and injected; there is no
//! global database path. The single-writer-per-key discipline is the
//! caller's responsibility.

pub mod alerts;
pub mod db;
pub mod error;
pub mod geojson_io;
pub mod grids;
pub mod regional;
pub mod schema;

pub use db::Database;
pub use error::{Result, StoreError};
pub use geojson_io::AlertFileStore;
pub use grids::{read_grid, write_grid, BaselineStat, BaselineStore};
pub use regional::RegionalStatRecord;
