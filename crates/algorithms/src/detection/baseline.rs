//! Monthly per-pixel baselines
//!
//! Baselines capture the seasonal norm of each spectral index: for every
//! calendar month, the per-pixel mean and standard deviation over all
//! reference-period scenes falling in that month. Detection later scores
//! a new scene against the baseline of its own month, which keeps the
//! strong Caatinga dry-season/wet-season cycle out of the anomaly signal.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use ndarray::Array2;
use rayon::prelude::*;
use vigia_core::raster::{Raster, RasterElement};
use vigia_core::{Error, Result};

use crate::imagery::IndexKind;

/// Per-pixel mean and standard deviation for one index and month.
#[derive(Debug, Clone)]
pub struct BaselinePair {
    pub mean: Raster<f64>,
    pub std: Raster<f64>,
}

/// Compute the per-pixel mean and population standard deviation over a
/// stack of co-registered scenes, ignoring NaN per pixel.
///
/// A pixel with no valid observation across the stack is NaN in both
/// outputs. A pixel with a single observation gets std 0; the z-score
/// stage clamps the divisor, so this does not blow up scores.
pub fn pixel_statistics(scenes: &[&Raster<f64>]) -> Result<BaselinePair> {
    let first = scenes.first().ok_or_else(|| {
        Error::Algorithm("cannot compute baseline statistics from an empty stack".into())
    })?;

    for scene in &scenes[1..] {
        first.check_shape(scene)?;
    }

    let (rows, cols) = first.shape();
    let nodata: Vec<Option<f64>> = scenes.iter().map(|s| s.nodata()).collect();

    let stats: Vec<(f64, f64)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_stats = vec![(f64::NAN, f64::NAN); cols];
            for col in 0..cols {
                let mut sum = 0.0;
                let mut sum_sq = 0.0;
                let mut n = 0usize;

                for (scene, nd) in scenes.iter().zip(&nodata) {
                    let v = unsafe { scene.get_unchecked(row, col) };
                    if v.is_nodata(*nd) {
                        continue;
                    }
                    sum += v;
                    sum_sq += v * v;
                    n += 1;
                }

                if n > 0 {
                    let mean = sum / n as f64;
                    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
                    row_stats[col] = (mean, var.sqrt());
                }
            }
            row_stats
        })
        .collect();

    let (means, stds): (Vec<f64>, Vec<f64>) = stats.into_iter().unzip();

    let mut mean = first.with_same_meta::<f64>(rows, cols);
    mean.set_nodata(Some(f64::NAN));
    *mean.data_mut() =
        Array2::from_shape_vec((rows, cols), means).map_err(|e| Error::Other(e.to_string()))?;

    let mut std = first.with_same_meta::<f64>(rows, cols);
    std.set_nodata(Some(f64::NAN));
    *std.data_mut() =
        Array2::from_shape_vec((rows, cols), stds).map_err(|e| Error::Other(e.to_string()))?;

    Ok(BaselinePair { mean, std })
}

/// Compute the per-pixel median over a stack of co-registered scenes,
/// ignoring NaN per pixel.
///
/// Medians resist the residual cloud and shadow pixels that survive
/// masking better than means, so this is the compositing step used for
/// visual products and seasonal references. A pixel with no valid
/// observation is NaN.
pub fn median_composite(scenes: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let first = scenes.first().ok_or_else(|| {
        Error::Algorithm("cannot create composite from an empty stack".into())
    })?;

    for scene in &scenes[1..] {
        first.check_shape(scene)?;
    }

    let (rows, cols) = first.shape();
    let nodata: Vec<Option<f64>> = scenes.iter().map(|s| s.nodata()).collect();

    let medians: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_out = vec![f64::NAN; cols];
            let mut valid = Vec::with_capacity(scenes.len());
            for (col, out) in row_out.iter_mut().enumerate() {
                valid.clear();
                for (scene, nd) in scenes.iter().zip(&nodata) {
                    let v = unsafe { scene.get_unchecked(row, col) };
                    if !v.is_nodata(*nd) {
                        valid.push(v);
                    }
                }
                if valid.is_empty() {
                    continue;
                }
                valid.sort_unstable_by(|a, b| a.total_cmp(b));
                let mid = valid.len() / 2;
                *out = if valid.len() % 2 == 1 {
                    valid[mid]
                } else {
                    (valid[mid - 1] + valid[mid]) / 2.0
                };
            }
            row_out
        })
        .collect();

    let mut composite = first.with_same_meta::<f64>(rows, cols);
    composite.set_nodata(Some(f64::NAN));
    *composite.data_mut() =
        Array2::from_shape_vec((rows, cols), medians).map_err(|e| Error::Other(e.to_string()))?;

    Ok(composite)
}

/// Caatinga hydrological seasons used for seasonal composites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    /// November through April
    Wet,
    /// May through October
    Dry,
}

impl Season {
    pub fn contains(&self, month: u32) -> bool {
        match self {
            Season::Wet => matches!(month, 11 | 12 | 1..=4),
            Season::Dry => matches!(month, 5..=10),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Season::Wet => "wet",
            Season::Dry => "dry",
        }
    }
}

/// Median composite over all scenes falling in one season.
pub fn seasonal_composite(
    scenes: &[(NaiveDate, Raster<f64>)],
    season: Season,
) -> Result<Raster<f64>> {
    let stack: Vec<&Raster<f64>> = scenes
        .iter()
        .filter(|(date, _)| season.contains(date.month()))
        .map(|(_, raster)| raster)
        .collect();

    if stack.is_empty() {
        return Err(Error::Algorithm(format!(
            "no scenes in the {} season",
            season.label()
        )));
    }

    tracing::debug!(
        season = season.label(),
        scenes = stack.len(),
        "building seasonal composite"
    );
    median_composite(&stack)
}

/// Group dated scenes of one index by calendar month and compute a
/// [`BaselinePair`] per month.
///
/// Months with no scenes in the reference stack are simply absent from
/// the result; detection on such a month reports the index unusable.
pub fn monthly_baselines(
    scenes: &[(NaiveDate, Raster<f64>)],
) -> Result<HashMap<u32, BaselinePair>> {
    let mut by_month: HashMap<u32, Vec<&Raster<f64>>> = HashMap::new();
    for (date, raster) in scenes {
        by_month.entry(date.month()).or_default().push(raster);
    }

    let mut result = HashMap::new();
    for (month, stack) in by_month {
        tracing::debug!(month, scenes = stack.len(), "computing monthly baseline");
        result.insert(month, pixel_statistics(&stack)?);
    }

    if result.len() < 12 {
        tracing::warn!(
            months_covered = result.len(),
            "reference stack does not cover all calendar months"
        );
    }

    Ok(result)
}

/// Baselines for every (index, month) combination the reference period
/// could support.
#[derive(Debug, Default)]
pub struct BaselineSet {
    pairs: HashMap<(IndexKind, u32), BaselinePair>,
}

impl BaselineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build baselines for several indices at once from dated scene stacks.
    pub fn build(stacks: &HashMap<IndexKind, Vec<(NaiveDate, Raster<f64>)>>) -> Result<Self> {
        let mut set = Self::new();
        for (kind, scenes) in stacks {
            for (month, pair) in monthly_baselines(scenes)? {
                set.insert(*kind, month, pair);
            }
        }
        tracing::info!(pairs = set.len(), "baseline set built");
        Ok(set)
    }

    pub fn insert(&mut self, kind: IndexKind, month: u32, pair: BaselinePair) {
        self.pairs.insert((kind, month), pair);
    }

    /// Baseline for one index and month, if the reference period covered it.
    pub fn get(&self, kind: IndexKind, month: u32) -> Option<&BaselinePair> {
        self.pairs.get(&(kind, month))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Months covered for a given index, sorted.
    pub fn months(&self, kind: IndexKind) -> Vec<u32> {
        let mut months: Vec<u32> = self
            .pairs
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| *m)
            .collect();
        months.sort_unstable();
        months
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_pixel_statistics_mean_and_std() {
        let scenes = [scene(3, 3, 0.2), scene(3, 3, 0.4), scene(3, 3, 0.6)];
        let refs: Vec<&Raster<f64>> = scenes.iter().collect();

        let pair = pixel_statistics(&refs).unwrap();
        let mean = pair.mean.get(1, 1).unwrap();
        let std = pair.std.get(1, 1).unwrap();

        assert!((mean - 0.4).abs() < 1e-12);
        // population std of [0.2, 0.4, 0.6]
        let expected = (2.0 * 0.04 / 3.0_f64).sqrt();
        assert!((std - expected).abs() < 1e-12, "got {}", std);
    }

    #[test]
    fn test_nan_ignored_per_pixel() {
        let mut cloudy = scene(2, 2, 0.5);
        cloudy.set(0, 0, f64::NAN).unwrap();
        let clear = scene(2, 2, 0.3);

        let pair = pixel_statistics(&[&cloudy, &clear]).unwrap();
        // (0,0) only has the clear observation
        assert!((pair.mean.get(0, 0).unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(pair.std.get(0, 0).unwrap(), 0.0);
        // (1,1) averages both
        assert!((pair.mean.get(1, 1).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_all_nan_pixel_stays_nan() {
        let mut a = scene(2, 2, 0.5);
        let mut b = scene(2, 2, 0.5);
        a.set(1, 0, f64::NAN).unwrap();
        b.set(1, 0, f64::NAN).unwrap();

        let pair = pixel_statistics(&[&a, &b]).unwrap();
        assert!(pair.mean.get(1, 0).unwrap().is_nan());
        assert!(pair.std.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_empty_stack_errors() {
        assert!(pixel_statistics(&[]).is_err());
    }

    #[test]
    fn test_median_composite_ignores_nan() {
        let mut cloudy = scene(2, 2, 0.9);
        cloudy.set(0, 0, f64::NAN).unwrap();
        let scenes = [cloudy, scene(2, 2, 0.3), scene(2, 2, 0.5)];
        let refs: Vec<&Raster<f64>> = scenes.iter().collect();

        let composite = median_composite(&refs).unwrap();
        // (0,0): median of [0.3, 0.5], even count averages
        assert!((composite.get(0, 0).unwrap() - 0.4).abs() < 1e-12);
        // (1,1): median of [0.3, 0.5, 0.9]
        assert!((composite.get(1, 1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_median_composite_empty_stack_errors() {
        assert!(median_composite(&[]).is_err());
    }

    #[test]
    fn test_seasonal_composite_filters_by_season() {
        let scenes = vec![
            (NaiveDate::from_ymd_opt(2020, 1, 5).unwrap(), scene(2, 2, 0.8)),
            (NaiveDate::from_ymd_opt(2020, 3, 9).unwrap(), scene(2, 2, 0.6)),
            (NaiveDate::from_ymd_opt(2020, 7, 2).unwrap(), scene(2, 2, 0.2)),
        ];

        let wet = seasonal_composite(&scenes, Season::Wet).unwrap();
        assert!((wet.get(0, 0).unwrap() - 0.7).abs() < 1e-12);

        let dry = seasonal_composite(&scenes, Season::Dry).unwrap();
        assert!((dry.get(0, 0).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_seasonal_composite_empty_season_errors() {
        let scenes = vec![(
            NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
            scene(2, 2, 0.4),
        )];
        assert!(seasonal_composite(&scenes, Season::Dry).is_err());
    }

    #[test]
    fn test_monthly_grouping() {
        let scenes = vec![
            (NaiveDate::from_ymd_opt(2019, 6, 10).unwrap(), scene(2, 2, 0.3)),
            (NaiveDate::from_ymd_opt(2020, 6, 14).unwrap(), scene(2, 2, 0.5)),
            (NaiveDate::from_ymd_opt(2020, 7, 1).unwrap(), scene(2, 2, 0.9)),
        ];

        let baselines = monthly_baselines(&scenes).unwrap();
        assert_eq!(baselines.len(), 2);
        assert!((baselines[&6].mean.get(0, 0).unwrap() - 0.4).abs() < 1e-12);
        assert!((baselines[&7].mean.get(0, 0).unwrap() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_baseline_set_lookup() {
        let mut stacks = HashMap::new();
        stacks.insert(
            IndexKind::Ndmi,
            vec![(NaiveDate::from_ymd_opt(2020, 3, 5).unwrap(), scene(2, 2, 0.2))],
        );

        let set = BaselineSet::build(&stacks).unwrap();
        assert!(set.get(IndexKind::Ndmi, 3).is_some());
        assert!(set.get(IndexKind::Ndmi, 4).is_none());
        assert!(set.get(IndexKind::Nbr, 3).is_none());
        assert_eq!(set.months(IndexKind::Ndmi), vec![3]);
    }
}
