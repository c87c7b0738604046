//! Spectral index formulas
//!
//! Per-pixel formulas turning reflectance bands into vegetation, moisture
//! and soil indices. All divisions guard against zero denominators by
//! producing NaN for that pixel rather than erroring; NaN inputs propagate.
//!
//! NDMI is the best single index for clearing detection in the
//! Caatinga/Cerrado transition; NBR adds the fire-sensitive confirmation.

use ndarray::Array2;
use rayon::prelude::*;
use vigia_core::raster::{Raster, RasterElement};
use vigia_core::{Error, Result};

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Result is in [-1, 1]. Pixels with a zero denominator or a nodata input
/// are NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.check_shape(band_b)?;

    let (rows, cols) = band_a.shape();
    let nodata_a = band_a.nodata();
    let nodata_b = band_b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if a.is_nodata(nodata_a) || b.is_nodata(nodata_b) {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = (a - b) / sum;
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

/// Normalized Difference Moisture Index
///
/// `NDMI = (NIR - SWIR1) / (NIR + SWIR1)`
///
/// Uses the narrow NIR band; falls sharply when canopy water content is
/// removed by clearing.
pub fn ndmi(nir: &Raster<f64>, swir16: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, swir16)
}

/// Normalized Burn Ratio
///
/// `NBR = (NIR - SWIR2) / (NIR + SWIR2)`
///
/// Low values indicate burned or recently cleared areas.
pub fn nbr(nir: &Raster<f64>, swir22: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, swir22)
}

/// Two-band Enhanced Vegetation Index (Jiang et al., 2008)
///
/// `EVI2 = 2.5 * (NIR - Red) / (NIR + 2.4 * Red + 1)`
///
/// No blue band required, so it works on every supported sensor.
pub fn evi2(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    nir.check_shape(red)?;

    let (rows, cols) = nir.shape();
    let nodata_nir = nir.nodata();
    let nodata_red = red.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };

                if n.is_nodata(nodata_nir) || r.is_nodata(nodata_red) {
                    continue;
                }

                let denom = n + 2.4 * r + 1.0;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = 2.5 * (n - r) / denom;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}

/// Parameters for SAVI
#[derive(Debug, Clone)]
pub struct SaviParams {
    /// Soil brightness correction factor. 0.5 is the standard value for
    /// the sparse Caatinga canopy.
    pub l_factor: f64,
}

impl Default for SaviParams {
    fn default() -> Self {
        Self { l_factor: 0.5 }
    }
}

/// Soil-Adjusted Vegetation Index (Huete, 1988)
///
/// `SAVI = (1 + L) * (NIR - Red) / (NIR + Red + L)`
///
/// With the default L of 0.5 this is `1.5 * (NIR - Red) / (NIR + Red + 0.5)`.
pub fn savi(nir: &Raster<f64>, red: &Raster<f64>, params: SaviParams) -> Result<Raster<f64>> {
    nir.check_shape(red)?;

    let (rows, cols) = nir.shape();
    let nodata_nir = nir.nodata();
    let nodata_red = red.nodata();
    let l = params.l_factor;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let n = unsafe { nir.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };

                if n.is_nodata(nodata_nir) || r.is_nodata(nodata_red) {
                    continue;
                }

                let denom = n + r + l;
                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = (1.0 + l) * (n - r) / denom;
            }
            row_data
        })
        .collect();

    build_output(nir, rows, cols, data)
}

/// Bare Soil Index
///
/// `BSI = ((SWIR1 + Red) - (NIR + Blue)) / ((SWIR1 + Red) + (NIR + Blue))`
///
/// High values indicate exposed soil; confirms clearing when combined
/// with vegetation index drops.
pub fn bsi(
    swir16: &Raster<f64>,
    red: &Raster<f64>,
    nir: &Raster<f64>,
    blue: &Raster<f64>,
) -> Result<Raster<f64>> {
    swir16.check_shape(red)?;
    swir16.check_shape(nir)?;
    swir16.check_shape(blue)?;

    let (rows, cols) = swir16.shape();
    let nd_swir = swir16.nodata();
    let nd_red = red.nodata();
    let nd_nir = nir.nodata();
    let nd_blue = blue.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let sw = unsafe { swir16.get_unchecked(row, col) };
                let r = unsafe { red.get_unchecked(row, col) };
                let n = unsafe { nir.get_unchecked(row, col) };
                let b = unsafe { blue.get_unchecked(row, col) };

                if sw.is_nodata(nd_swir)
                    || r.is_nodata(nd_red)
                    || n.is_nodata(nd_nir)
                    || b.is_nodata(nd_blue)
                {
                    continue;
                }

                let soil = sw + r;
                let veg = n + b;
                let denom = soil + veg;

                if denom.abs() < 1e-10 {
                    continue;
                }

                row_data[col] = (soil - veg) / denom;
            }
            row_data
        })
        .collect();

    build_output(swir16, rows, cols, data)
}

/// Delta Normalized Burn Ratio for fire severity assessment
///
/// `dNBR = NBR_pre - NBR_post`
///
/// Severity classes: > 0.27 low, > 0.44 moderate, > 0.66 high.
pub fn dnbr(nbr_pre: &Raster<f64>, nbr_post: &Raster<f64>) -> Result<Raster<f64>> {
    nbr_pre.check_shape(nbr_post)?;

    let (rows, cols) = nbr_pre.shape();
    let nd_pre = nbr_pre.nodata();
    let nd_post = nbr_post.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let pre = unsafe { nbr_pre.get_unchecked(row, col) };
                let post = unsafe { nbr_post.get_unchecked(row, col) };

                if pre.is_nodata(nd_pre) || post.is_nodata(nd_post) {
                    continue;
                }

                row_data[col] = pre - post;
            }
            row_data
        })
        .collect();

    build_output(nbr_pre, rows, cols, data)
}

/// dNBR burn severity thresholds
pub const DNBR_LOW_SEVERITY: f64 = 0.27;
pub const DNBR_MODERATE_SEVERITY: f64 = 0.44;
pub const DNBR_HIGH_SEVERITY: f64 = 0.66;

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
    use vigia_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_ndmi_exact_value() {
        let nir = make_band(5, 5, 0.4);
        let swir = make_band(5, 5, 0.2);

        let result = ndmi(&nir, &swir).unwrap();
        let val = result.get(2, 2).unwrap();

        // (0.4 - 0.2) / (0.4 + 0.2) = 1/3
        assert!((val - 1.0 / 3.0).abs() < 1e-12, "got {}", val);
    }

    #[test]
    fn test_evi2_exact_value() {
        let nir = make_band(5, 5, 0.5);
        let red = make_band(5, 5, 0.1);

        let result = evi2(&nir, &red).unwrap();
        let val = result.get(2, 2).unwrap();

        // 2.5 * 0.4 / (0.5 + 0.24 + 1) = 2.5 * 0.4 / 1.74
        let expected = 2.5 * 0.4 / 1.74;
        assert!((val - expected).abs() < 1e-12, "got {}", val);
    }

    #[test]
    fn test_savi_default_l() {
        let nir = make_band(5, 5, 0.5);
        let red = make_band(5, 5, 0.1);

        let result = savi(&nir, &red, SaviParams::default()).unwrap();
        let val = result.get(2, 2).unwrap();

        let expected = 1.5 * 0.4 / (0.5 + 0.1 + 0.5);
        assert!((val - expected).abs() < 1e-12, "got {}", val);
    }

    #[test]
    fn test_bsi() {
        let swir = make_band(5, 5, 0.4);
        let red = make_band(5, 5, 0.3);
        let nir = make_band(5, 5, 0.2);
        let blue = make_band(5, 5, 0.1);

        let result = bsi(&swir, &red, &nir, &blue).unwrap();
        let val = result.get(2, 2).unwrap();

        // ((0.4+0.3) - (0.2+0.1)) / ((0.4+0.3) + (0.2+0.1)) = 0.4
        assert!((val - 0.4).abs() < 1e-12, "got {}", val);
    }

    #[test]
    fn test_dnbr() {
        let pre = make_band(5, 5, 0.6);
        let post = make_band(5, 5, 0.1);

        let result = dnbr(&pre, &post).unwrap();
        let val = result.get(2, 2).unwrap();
        assert!((val - 0.5).abs() < 1e-12);
        assert!(val > DNBR_MODERATE_SEVERITY);
    }

    #[test]
    fn test_zero_denominator_is_nan() {
        let a = make_band(3, 3, 0.2);
        let b = make_band(3, 3, -0.2);

        let result = normalized_difference(&a, &b).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_nan_propagates() {
        let mut nir = make_band(3, 3, 0.4);
        nir.set(1, 1, f64::NAN).unwrap();
        let swir = make_band(3, 3, 0.2);

        let result = ndmi(&nir, &swir).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
        assert!(!result.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_explicit_nodata_marker() {
        let mut nir = make_band(3, 3, 0.4);
        nir.set_nodata(Some(-9999.0));
        nir.set(0, 0, -9999.0).unwrap();
        let swir = make_band(3, 3, 0.2);

        let result = ndmi(&nir, &swir).unwrap();
        assert!(result.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = make_band(5, 5, 1.0);
        let b = make_band(5, 10, 1.0);
        assert!(normalized_difference(&a, &b).is_err());
    }

    #[test]
    fn test_range_bounded() {
        let mut a = Raster::new(8, 8);
        let mut b = Raster::new(8, 8);
        for row in 0..8 {
            for col in 0..8 {
                a.set(row, col, 0.1 + (row * 8 + col) as f64 * 0.01).unwrap();
                b.set(row, col, 0.5 - (row * 8 + col) as f64 * 0.004).unwrap();
            }
        }

        let result = normalized_difference(&a, &b).unwrap();
        for row in 0..8 {
            for col in 0..8 {
                let v = result.get(row, col).unwrap();
                if !v.is_nan() {
                    assert!((-1.0..=1.0).contains(&v), "out of range at ({row},{col}): {v}");
                }
            }
        }
    }
}
