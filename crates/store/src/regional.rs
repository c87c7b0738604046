//! Regional statistics ledger

use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::Result;

/// One row of the `regional_stats` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalStatRecord {
    pub date: NaiveDate,
    pub index_name: String,
    pub region: String,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub pct_valid: f64,
    pub n_pixels: i64,
}

impl Database {
    /// Insert or replace the statistics row for (date, index, region).
    pub fn upsert_regional_stats(&self, record: &RegionalStatRecord) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO regional_stats
             (date, index_name, region, mean, median, std, min, max, pct_valid, n_pixels)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.date.to_string(),
                record.index_name,
                record.region,
                record.mean,
                record.median,
                record.std,
                record.min,
                record.max,
                record.pct_valid,
                record.n_pixels,
            ],
        )?;
        tracing::debug!(
            date = %record.date,
            index = record.index_name,
            region = record.region,
            "regional stats stored"
        );
        Ok(())
    }

    /// Load the time series for one index and region, ordered by date.
    ///
    /// `start` and `end` are inclusive; `None` leaves that side open.
    pub fn load_timeseries(
        &self,
        index_name: &str,
        region: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<RegionalStatRecord>> {
        let mut sql = String::from(
            "SELECT date, index_name, region, mean, median, std, min, max, pct_valid, n_pixels
             FROM regional_stats
             WHERE index_name = ?1 AND region = ?2",
        );
        let mut bindings: Vec<String> = vec![index_name.to_string(), region.to_string()];

        if let Some(start) = start {
            bindings.push(start.to_string());
            sql.push_str(&format!(" AND date >= ?{}", bindings.len()));
        }
        if let Some(end) = end {
            bindings.push(end.to_string());
            sql.push_str(&format!(" AND date <= ?{}", bindings.len()));
        }
        sql.push_str(" ORDER BY date");

        let mut stmt = self.conn().prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(&bindings), |row| {
                let date: String = row.get(0)?;
                let date = date.parse::<NaiveDate>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(RegionalStatRecord {
                    date,
                    index_name: row.get(1)?,
                    region: row.get(2)?,
                    mean: row.get(3)?,
                    median: row.get(4)?,
                    std: row.get(5)?,
                    min: row.get(6)?,
                    max: row.get(7)?,
                    pct_valid: row.get(8)?,
                    n_pixels: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
