//! Dated GeoJSON alert files
//!
//! One file per detection date, `alerts_{date}.geojson`, written
//! atomically (temp file + rename) so a crashed run never leaves a
//! half-written file behind. Re-running a detection for a date replaces
//! its file. Geometries are stored in the grid's projected CRS; the EPSG
//! code travels as a foreign member.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_types::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use vigia_core::{Alert, AlertCollection, Confidence, Crs};

use crate::error::{Result, StoreError};

/// Directory-backed store of per-date alert GeoJSON files.
pub struct AlertFileStore {
    dir: PathBuf,
}

impl AlertFileStore {
    /// Create the store, making the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("alerts_{date}.geojson"))
    }

    /// Write the collection for `date`, replacing any existing file.
    pub fn save(&self, collection: &AlertCollection, date: NaiveDate) -> Result<PathBuf> {
        let features: Vec<Feature> = collection
            .iter()
            .map(|alert| alert_to_feature(alert, date))
            .collect();

        let mut foreign_members = JsonObject::new();
        if let Some(epsg) = collection.crs.as_ref().and_then(|c| c.epsg()) {
            foreign_members.insert("crs_epsg".into(), JsonValue::from(epsg));
        }

        let fc = FeatureCollection {
            bbox: None,
            features,
            foreign_members: if foreign_members.is_empty() {
                None
            } else {
                Some(foreign_members)
            },
        };

        let path = self.path_for(date);
        let tmp = path.with_extension("geojson.tmp");
        fs::write(&tmp, GeoJson::from(fc).to_string())?;
        fs::rename(&tmp, &path)?;

        tracing::info!(
            path = %path.display(),
            alerts = collection.len(),
            "alert file written"
        );
        Ok(path)
    }

    /// Load the alerts for one date.
    ///
    /// A date that was never saved is `NotFound`; a file that exists but
    /// does not parse is `Corrupt`.
    pub fn load(&self, date: NaiveDate) -> Result<AlertCollection> {
        let path = self.path_for(date);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("no alerts for {date}")));
        }
        self.load_file(&path)
    }

    /// Load every stored date, sorted, tagging each alert with the date
    /// of its originating file.
    pub fn load_all(&self) -> Result<AlertCollection> {
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(date) = date_from_filename(&entry.file_name().to_string_lossy()) {
                dates.push(date);
            }
        }
        dates.sort_unstable();

        let mut combined = AlertCollection::default();
        for date in &dates {
            let collection = self.load(*date)?;
            if combined.crs.is_none() {
                combined.crs = collection.crs.clone();
            }
            for alert in collection {
                combined.push(alert);
            }
        }
        tracing::info!(
            alerts = combined.len(),
            files = dates.len(),
            "loaded alert history"
        );
        Ok(combined)
    }

    fn load_file(&self, path: &Path) -> Result<AlertCollection> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let text = fs::read_to_string(path)?;
        let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| corrupt(e.to_string()))?;
        let fc = FeatureCollection::try_from(geojson)
            .map_err(|e| corrupt(format!("not a feature collection: {e}")))?;

        let crs = fc
            .foreign_members
            .as_ref()
            .and_then(|m| m.get("crs_epsg"))
            .and_then(|v| v.as_u64())
            .map(|epsg| Crs::from_epsg(epsg as u32));

        let mut collection = AlertCollection::new(crs);
        for feature in fc.features {
            collection.push(feature_to_alert(feature, &corrupt)?);
        }
        Ok(collection)
    }
}

fn alert_to_feature(alert: &Alert, date: NaiveDate) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("detection_date".into(), JsonValue::from(date.to_string()));
    properties.insert(
        "confidence".into(),
        JsonValue::from(alert.confidence.level()),
    );
    properties.insert(
        "confidence_label".into(),
        JsonValue::from(alert.confidence.label()),
    );
    properties.insert("area_ha".into(), JsonValue::from(alert.area_ha));

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(
            &alert.geometry,
        ))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn feature_to_alert<F>(feature: Feature, corrupt: &F) -> Result<Alert>
where
    F: Fn(String) -> StoreError,
{
    let geometry = feature
        .geometry
        .ok_or_else(|| corrupt("feature without geometry".into()))?;
    let geometry = MultiPolygon::<f64>::try_from(geometry.value)
        .map_err(|e| corrupt(format!("geometry is not a multipolygon: {e}")))?;

    let properties = feature
        .properties
        .ok_or_else(|| corrupt("feature without properties".into()))?;

    let area_ha = properties
        .get("area_ha")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| corrupt("missing area_ha".into()))?;
    let level = properties
        .get("confidence")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| corrupt("missing confidence".into()))?;
    let confidence = Confidence::from_level(level as u8)
        .ok_or_else(|| corrupt(format!("invalid confidence level {level}")))?;
    let detection_date = properties
        .get("detection_date")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());

    Ok(Alert {
        geometry,
        area_ha,
        confidence,
        detection_date,
    })
}

fn date_from_filename(name: &str) -> Option<NaiveDate> {
    name.strip_prefix("alerts_")?
        .strip_suffix(".geojson")?
        .parse()
        .ok()
}
