//! Per-pixel anomaly scoring
//!
//! Two complementary measures against the monthly baseline: the z-score
//! (how many standard deviations below the norm) and the raw delta
//! (absolute index drop). Fusion requires both because a low-variance
//! pixel can post an extreme z-score on a tiny, ecologically meaningless
//! change.

use ndarray::Array2;
use rayon::prelude::*;
use vigia_core::raster::{Raster, RasterElement};
use vigia_core::{Error, Result};

/// Floor applied to the baseline standard deviation before dividing.
///
/// Matches the detection thresholds' calibration; pixels with a nearly
/// constant history would otherwise produce unbounded scores.
pub const MIN_STD: f64 = 0.01;

/// Z-score of a scene against its monthly baseline:
///
/// `z = (current - mean) / max(std, MIN_STD)`
///
/// NaN in any of the three inputs propagates to the output pixel.
pub fn zscore(
    current: &Raster<f64>,
    mean: &Raster<f64>,
    std: &Raster<f64>,
) -> Result<Raster<f64>> {
    current.check_shape(mean)?;
    current.check_shape(std)?;

    let (rows, cols) = current.shape();
    let nd_cur = current.nodata();
    let nd_mean = mean.nodata();
    let nd_std = std.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let c = unsafe { current.get_unchecked(row, col) };
                let m = unsafe { mean.get_unchecked(row, col) };
                let s = unsafe { std.get_unchecked(row, col) };

                if c.is_nodata(nd_cur) || m.is_nodata(nd_mean) || s.is_nodata(nd_std) {
                    continue;
                }

                row_data[col] = (c - m) / s.max(MIN_STD);
            }
            row_data
        })
        .collect();

    build_output(current, rows, cols, data)
}

/// Raw anomaly: `current - mean`. NaN propagates.
pub fn delta(current: &Raster<f64>, mean: &Raster<f64>) -> Result<Raster<f64>> {
    current.check_shape(mean)?;

    let (rows, cols) = current.shape();
    let nd_cur = current.nodata();
    let nd_mean = mean.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let c = unsafe { current.get_unchecked(row, col) };
                let m = unsafe { mean.get_unchecked(row, col) };

                if c.is_nodata(nd_cur) || m.is_nodata(nd_mean) {
                    continue;
                }

                row_data[col] = c - m;
            }
            row_data
        })
        .collect();

    build_output(current, rows, cols, data)
}

fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_zscore_basic() {
        let current = raster(3, 3, 0.1);
        let mean = raster(3, 3, 0.5);
        let std = raster(3, 3, 0.1);

        let z = zscore(&current, &mean, &std).unwrap();
        assert!((z.get(1, 1).unwrap() - (-4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_self_comparison_is_neutral() {
        let mean = raster(3, 3, 0.5);
        let std = raster(3, 3, 0.1);

        let z = zscore(&mean, &mean, &std).unwrap();
        for v in z.data() {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn test_zscore_clamps_small_std() {
        let current = raster(3, 3, 0.45);
        let mean = raster(3, 3, 0.5);
        let std = raster(3, 3, 0.0001);

        let z = zscore(&current, &mean, &std).unwrap();
        // divisor clamped to 0.01, so -0.05 / 0.01 = -5
        assert!((z.get(0, 0).unwrap() - (-5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_nan_propagates() {
        let current = raster(2, 2, 0.3);
        let mut mean = raster(2, 2, 0.5);
        mean.set(0, 1, f64::NAN).unwrap();
        let std = raster(2, 2, 0.1);

        let z = zscore(&current, &mean, &std).unwrap();
        assert!(z.get(0, 1).unwrap().is_nan());
        assert!(!z.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_delta() {
        let current = raster(2, 2, 0.32);
        let mean = raster(2, 2, 0.5);

        let d = delta(&current, &mean).unwrap();
        assert!((d.get(0, 0).unwrap() - (-0.18)).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let current = raster(2, 2, 0.3);
        let mean = raster(2, 3, 0.5);
        assert!(delta(&current, &mean).is_err());
    }
}
