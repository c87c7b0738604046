//! Multi-index confidence fusion
//!
//! Combines z-scores and deltas across indices into a per-pixel
//! confidence level:
//!
//! - 3 (high): z and delta both beyond the strict thresholds in BOTH
//!   moisture indices (NDMI and NBR)
//! - 2 (medium): z or delta beyond the medium thresholds in at least
//!   one moisture index
//! - 1 (low): z beyond the loose threshold in any single index
//! - 0: no alert
//!
//! During drought (3-month SPI below -1.0) the z thresholds are widened
//! by half a standard deviation, because moisture indices drop basin-wide
//! when the canopy dries out. Delta thresholds stay fixed; an absolute
//! index drop of 0.2 is clearing regardless of rainfall.

use std::collections::HashMap;

use ndarray::Array2;
use rayon::prelude::*;
use vigia_core::raster::Raster;
use vigia_core::{Error, Result};

use crate::detection::anomaly::{delta, zscore};
use crate::detection::baseline::BaselineSet;
use crate::imagery::IndexKind;

/// Thresholds driving the confidence classification.
#[derive(Debug, Clone)]
pub struct DetectionParams {
    pub z_high: f64,
    pub z_medium: f64,
    pub z_low: f64,
    pub delta_high: f64,
    pub delta_medium: f64,
    pub delta_low: f64,
    /// SPI below this value counts as drought.
    pub spi_drought_threshold: f64,
    /// Amount the z thresholds are pushed further negative during drought.
    pub drought_z_adjustment: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            z_high: -3.0,
            z_medium: -2.5,
            z_low: -2.0,
            delta_high: -0.20,
            delta_medium: -0.15,
            delta_low: -0.10,
            spi_drought_threshold: -1.0,
            drought_z_adjustment: 0.5,
        }
    }
}

/// Output of one detection run.
#[derive(Debug)]
pub struct DetectionResult {
    /// Per-pixel confidence level: 0 none, 1 low, 2 medium, 3 high.
    pub confidence: Raster<u8>,
    /// 1 where confidence > 0.
    pub alert_mask: Raster<u8>,
    /// Z-score grid per usable index.
    pub zscores: HashMap<IndexKind, Raster<f64>>,
    /// Delta grid per usable index.
    pub deltas: HashMap<IndexKind, Raster<f64>>,
    /// Whether drought widening was applied to the z thresholds.
    pub drought_adjusted: bool,
}

impl DetectionResult {
    /// Count of pixels at exactly the given confidence level.
    pub fn count_at_level(&self, level: u8) -> usize {
        self.confidence.data().iter().filter(|&&v| v == level).count()
    }

    /// Count of alert pixels at any confidence level.
    pub fn alert_count(&self) -> usize {
        self.alert_mask.data().iter().filter(|&&v| v > 0).count()
    }
}

/// Score a scene's indices against their monthly baselines and fuse the
/// anomalies into per-pixel confidence levels.
///
/// Indices without a baseline for `month` are skipped with a warning.
/// When none of the supplied indices has a usable baseline the run is an
/// error; detection for the scene must be skipped, not reported as clean.
pub fn detect_deforestation(
    current: &HashMap<IndexKind, Raster<f64>>,
    baselines: &BaselineSet,
    month: u32,
    spi_3month: Option<f64>,
    params: &DetectionParams,
) -> Result<DetectionResult> {
    let mut z_adj = 0.0;
    let drought_adjusted = match spi_3month {
        Some(spi) if spi < params.spi_drought_threshold => {
            z_adj = params.drought_z_adjustment;
            tracing::warn!(
                spi = format!("{spi:.2}"),
                adjustment = z_adj,
                "drought conditions, widening z thresholds"
            );
            true
        }
        _ => false,
    };

    let z_high = params.z_high - z_adj;
    let z_med = params.z_medium - z_adj;
    let z_low = params.z_low - z_adj;

    let mut zscores = HashMap::new();
    let mut deltas = HashMap::new();
    let mut usable: Vec<IndexKind> = Vec::new();

    for (&kind, scene) in current {
        let Some(pair) = baselines.get(kind, month) else {
            tracing::warn!(index = %kind, month, "no baseline for index, skipping");
            continue;
        };
        zscores.insert(kind, zscore(scene, &pair.mean, &pair.std)?);
        deltas.insert(kind, delta(scene, &pair.mean)?);
        usable.push(kind);
    }

    if usable.is_empty() {
        return Err(Error::NoUsableIndices);
    }
    usable.sort_by_key(|k| k.name());

    let template = &zscores[&usable[0]];
    for kind in &usable[1..] {
        template.check_shape(&zscores[kind])?;
    }
    let (rows, cols) = template.shape();

    let moisture: Vec<(&Raster<f64>, &Raster<f64>)> = usable
        .iter()
        .filter(|k| k.is_moisture_family())
        .map(|k| (&zscores[k], &deltas[k]))
        .collect();
    let all_z: Vec<&Raster<f64>> = usable.iter().map(|k| &zscores[k]).collect();
    let both_moisture = moisture.len() >= 2;

    // NaN fails every comparison, so cloudy pixels end up at level 0.
    let levels: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_levels = vec![0u8; cols];
            for col in 0..cols {
                let mut level = 0u8;

                if both_moisture {
                    let confirmed = moisture.iter().all(|(z, d)| {
                        let zv = unsafe { z.get_unchecked(row, col) };
                        let dv = unsafe { d.get_unchecked(row, col) };
                        zv < z_high && dv < params.delta_high
                    });
                    if confirmed {
                        level = 3;
                    }
                }

                if level < 2 {
                    let hit = moisture.iter().any(|(z, d)| {
                        let zv = unsafe { z.get_unchecked(row, col) };
                        let dv = unsafe { d.get_unchecked(row, col) };
                        zv < z_med || dv < params.delta_medium
                    });
                    if hit {
                        level = 2;
                    }
                }

                if level < 1 {
                    let hit = all_z
                        .iter()
                        .any(|z| unsafe { z.get_unchecked(row, col) } < z_low);
                    if hit {
                        level = 1;
                    }
                }

                row_levels[col] = level;
            }
            row_levels
        })
        .collect();

    let mut confidence = template.with_same_meta::<u8>(rows, cols);
    *confidence.data_mut() = Array2::from_shape_vec((rows, cols), levels)
        .map_err(|e| Error::Other(e.to_string()))?;

    let mut alert_mask = template.with_same_meta::<u8>(rows, cols);
    *alert_mask.data_mut() = confidence.data().mapv(|v| u8::from(v > 0));

    let result = DetectionResult {
        confidence,
        alert_mask,
        zscores,
        deltas,
        drought_adjusted,
    };

    tracing::info!(
        alerts = result.alert_count(),
        high = result.count_at_level(3),
        medium = result.count_at_level(2),
        low = result.count_at_level(1),
        "detection complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::baseline::BaselinePair;

    fn raster(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, value);
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn pair(mean: f64, std: f64) -> BaselinePair {
        BaselinePair {
            mean: raster(mean),
            std: raster(std),
        }
    }

    fn baselines_for(month: u32) -> BaselineSet {
        let mut set = BaselineSet::new();
        set.insert(IndexKind::Ndmi, month, pair(0.5, 0.1));
        set.insert(IndexKind::Nbr, month, pair(0.5, 0.1));
        set.insert(IndexKind::Evi2, month, pair(0.4, 0.1));
        set
    }

    #[test]
    fn test_high_confidence_needs_both_moisture_indices() {
        let mut current = HashMap::new();
        // z = -4, delta = -0.4: beyond the strict thresholds in both
        current.insert(IndexKind::Ndmi, raster(0.1));
        current.insert(IndexKind::Nbr, raster(0.1));

        let result = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            None,
            &DetectionParams::default(),
        )
        .unwrap();

        assert_eq!(result.confidence.get(0, 0).unwrap(), 3);
        assert_eq!(result.alert_mask.get(0, 0).unwrap(), 1);
    }

    #[test]
    fn test_single_moisture_index_caps_at_medium() {
        let mut current = HashMap::new();
        current.insert(IndexKind::Ndmi, raster(0.1));

        let result = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            None,
            &DetectionParams::default(),
        )
        .unwrap();

        assert_eq!(result.confidence.get(0, 0).unwrap(), 2);
    }

    #[test]
    fn test_low_confidence_from_non_moisture_index() {
        let mut current = HashMap::new();
        // z = -2.2 on EVI2 only
        current.insert(IndexKind::Evi2, raster(0.18));

        let result = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            None,
            &DetectionParams::default(),
        )
        .unwrap();

        assert_eq!(result.confidence.get(0, 0).unwrap(), 1);
    }

    #[test]
    fn test_drought_widening_suppresses_marginal_alerts() {
        let mut current = HashMap::new();
        // EVI2 value 0.17 against mean 0.4, std 0.1 gives z = -2.3
        current.insert(IndexKind::Evi2, raster(0.17));

        let normal = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            Some(0.5),
            &DetectionParams::default(),
        )
        .unwrap();
        let drought = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            Some(-1.5),
            &DetectionParams::default(),
        )
        .unwrap();

        assert!(!normal.drought_adjusted);
        assert!(drought.drought_adjusted);
        // z = -2.3 trips the -2.0 threshold but not the widened -2.5
        assert_eq!(normal.alert_count(), 16);
        assert_eq!(drought.alert_count(), 0);
        assert!(drought.alert_count() <= normal.alert_count());
    }

    #[test]
    fn test_delta_threshold_not_drought_adjusted() {
        let mut current = HashMap::new();
        // NDMI delta = -0.16 trips the medium delta threshold even in
        // drought; std is large so z stays mild.
        let mut set = BaselineSet::new();
        set.insert(
            IndexKind::Ndmi,
            6,
            BaselinePair {
                mean: raster(0.5),
                std: raster(0.5),
            },
        );
        current.insert(IndexKind::Ndmi, raster(0.34));

        let result =
            detect_deforestation(&current, &set, 6, Some(-2.0), &DetectionParams::default())
                .unwrap();
        assert_eq!(result.confidence.get(0, 0).unwrap(), 2);
    }

    #[test]
    fn test_no_usable_indices_is_error() {
        let mut current = HashMap::new();
        current.insert(IndexKind::Ndmi, raster(0.1));

        let empty = BaselineSet::new();
        let err = detect_deforestation(&current, &empty, 6, None, &DetectionParams::default());
        assert!(matches!(err, Err(Error::NoUsableIndices)));
    }

    #[test]
    fn test_near_baseline_values_stay_clean() {
        let mut current = HashMap::new();
        current.insert(IndexKind::Ndmi, raster(0.49));
        current.insert(IndexKind::Nbr, raster(0.51));
        current.insert(IndexKind::Evi2, raster(0.41));

        let result = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            None,
            &DetectionParams::default(),
        )
        .unwrap();

        assert_eq!(result.alert_count(), 0);
        assert!(result.confidence.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_cloudy_pixel_stays_clean() {
        let mut ndmi = raster(0.1);
        ndmi.set(2, 2, f64::NAN).unwrap();
        let mut nbr = raster(0.1);
        nbr.set(2, 2, f64::NAN).unwrap();

        let mut current = HashMap::new();
        current.insert(IndexKind::Ndmi, ndmi);
        current.insert(IndexKind::Nbr, nbr);

        let result = detect_deforestation(
            &current,
            &baselines_for(6),
            6,
            None,
            &DetectionParams::default(),
        )
        .unwrap();

        assert_eq!(result.confidence.get(2, 2).unwrap(), 0);
        assert_eq!(result.confidence.get(0, 0).unwrap(), 3);
    }

    #[test]
    fn test_missing_baseline_index_skipped_not_fatal() {
        let mut current = HashMap::new();
        current.insert(IndexKind::Ndmi, raster(0.1));
        current.insert(IndexKind::Savi, raster(0.1));

        let mut set = BaselineSet::new();
        set.insert(IndexKind::Ndmi, 6, pair(0.5, 0.1));

        let result =
            detect_deforestation(&current, &set, 6, None, &DetectionParams::default()).unwrap();
        assert!(result.zscores.contains_key(&IndexKind::Ndmi));
        assert!(!result.zscores.contains_key(&IndexKind::Savi));
    }
}
