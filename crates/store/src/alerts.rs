//! Alert summary ledger

use chrono::NaiveDate;
use rusqlite::params;
use vigia_core::AlertSummary;

use crate::db::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace the alert summary for a detection date.
    ///
    /// The summary must be recomputed from the alert collection being
    /// persisted for that date, so the cached row and the GeoJSON file
    /// always agree.
    pub fn upsert_alert_summary(&self, date: NaiveDate, summary: &AlertSummary) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO alert_stats
             (date, total_alerts, total_area_ha, high_confidence, medium_confidence,
              low_confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                date.to_string(),
                summary.total_alerts,
                summary.total_area_ha,
                summary.high_confidence,
                summary.medium_confidence,
                summary.low_confidence,
            ],
        )?;
        tracing::debug!(date = %date, alerts = summary.total_alerts, "alert summary stored");
        Ok(())
    }

    /// Load all stored alert summaries ordered by date.
    pub fn load_alert_series(&self) -> Result<Vec<(NaiveDate, AlertSummary)>> {
        let mut stmt = self.conn().prepare(
            "SELECT date, total_alerts, total_area_ha, high_confidence, medium_confidence,
                    low_confidence
             FROM alert_stats
             ORDER BY date",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                let date = date.parse::<NaiveDate>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok((
                    date,
                    AlertSummary {
                        total_alerts: row.get(1)?,
                        total_area_ha: row.get(2)?,
                        high_confidence: row.get(3)?,
                        medium_confidence: row.get(4)?,
                        low_confidence: row.get(5)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
