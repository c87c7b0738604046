//! SQL schema for the time-series ledger
//!
//! Two tables: per-scene regional statistics keyed on
//! (date, index_name, region) and per-date alert summaries. Both use
//! `INSERT OR REPLACE`, so re-running a detection for the same date is
//! idempotent.

/// Full schema as one batch, safe to apply repeatedly.
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS regional_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        index_name TEXT NOT NULL,
        region TEXT NOT NULL,
        mean REAL,
        median REAL,
        std REAL,
        min REAL,
        max REAL,
        pct_valid REAL,
        n_pixels INTEGER,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(date, index_name, region)
    );

    CREATE TABLE IF NOT EXISTS alert_stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        total_alerts INTEGER,
        total_area_ha REAL,
        high_confidence INTEGER,
        medium_confidence INTEGER,
        low_confidence INTEGER,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(date)
    );

    CREATE INDEX IF NOT EXISTS idx_regional_date
    ON regional_stats(date, index_name);

    "#
}
