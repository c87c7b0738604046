//! Vector data structures: alert polygons and their summaries

use chrono::NaiveDate;
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::crs::Crs;

/// Ordinal confidence assigned to an alert polygon.
///
/// Raster cells additionally carry level 0 ("none"); polygons only exist
/// for levels 1–3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Confidence {
    /// Map a confidence raster level to a polygon confidence.
    ///
    /// Level 0 (no alert) has no polygon representation.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Confidence::Low),
            2 => Some(Confidence::Medium),
            3 => Some(Confidence::High),
            _ => None,
        }
    }

    /// Raster cell value for this confidence
    pub fn level(&self) -> u8 {
        *self as u8
    }

    /// Human-readable label used in persisted alert files
    pub fn label(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// One detected deforestation alert polygon.
///
/// Geometry is in the projected coordinates of the confidence raster it
/// was vectorized from. A MultiPolygon is used because 8-connected
/// components pinched at a corner trace into more than one exterior ring.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Alert footprint in projected coordinates
    pub geometry: MultiPolygon<f64>,
    /// Area in hectares, from the projected geometry
    pub area_ha: f64,
    /// Representative confidence for the polygon
    pub confidence: Confidence,
    /// Date of the detection run that produced this alert
    pub detection_date: Option<NaiveDate>,
}

/// A (possibly empty) set of alerts from one or more detection runs.
#[derive(Debug, Clone, Default)]
pub struct AlertCollection {
    pub alerts: Vec<Alert>,
    /// CRS the geometries are expressed in
    pub crs: Option<Crs>,
}

impl AlertCollection {
    pub fn new(crs: Option<Crs>) -> Self {
        Self {
            alerts: Vec::new(),
            crs,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    /// Derive summary statistics from the collection.
    ///
    /// The summary is always recomputed from the alerts themselves; the
    /// per-date cached row in the ledger must match this exactly.
    pub fn summarize(&self) -> AlertSummary {
        let mut summary = AlertSummary::default();
        for alert in &self.alerts {
            summary.total_alerts += 1;
            summary.total_area_ha += alert.area_ha;
            match alert.confidence {
                Confidence::High => summary.high_confidence += 1,
                Confidence::Medium => summary.medium_confidence += 1,
                Confidence::Low => summary.low_confidence += 1,
            }
        }
        summary
    }
}

impl IntoIterator for AlertCollection {
    type Item = Alert;
    type IntoIter = std::vec::IntoIter<Alert>;

    fn into_iter(self) -> Self::IntoIter {
        self.alerts.into_iter()
    }
}

/// Summary statistics for one detection date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total_alerts: i64,
    pub total_area_ha: f64,
    pub high_confidence: i64,
    pub medium_confidence: i64,
    pub low_confidence: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};

    fn square(size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ]])
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(Confidence::from_level(3), Some(Confidence::High));
        assert_eq!(Confidence::from_level(0), None);
        assert_eq!(Confidence::High.level(), 3);
        assert_eq!(Confidence::Medium.label(), "medium");
    }

    #[test]
    fn test_empty_collection_summary() {
        let collection = AlertCollection::default();
        let summary = collection.summarize();
        assert_eq!(summary.total_alerts, 0);
        assert_eq!(summary.total_area_ha, 0.0);
    }

    #[test]
    fn test_summary_counts_by_confidence() {
        let mut collection = AlertCollection::default();
        for (conf, area) in [
            (Confidence::High, 2.5),
            (Confidence::High, 1.0),
            (Confidence::Low, 1.5),
        ] {
            collection.push(Alert {
                geometry: square(100.0),
                area_ha: area,
                confidence: conf,
                detection_date: None,
            });
        }

        let summary = collection.summarize();
        assert_eq!(summary.total_alerts, 3);
        assert_eq!(summary.high_confidence, 2);
        assert_eq!(summary.medium_confidence, 0);
        assert_eq!(summary.low_confidence, 1);
        assert!((summary.total_area_ha - 5.0).abs() < 1e-12);
    }
}
