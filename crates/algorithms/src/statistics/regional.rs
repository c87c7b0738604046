//! Regional summary statistics of a single index grid

use serde::{Deserialize, Serialize};
use vigia_core::raster::{Raster, RasterElement};

/// Summary statistics over the valid pixels of one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// Percentage of valid pixels over the full grid, in [0, 100].
    pub pct_valid: f64,
    /// Number of valid pixels.
    pub n_pixels: i64,
}

/// Compute regional statistics over the valid pixels of `grid`.
///
/// Returns `None` for a fully invalid (or empty) grid. A cloud-covered
/// scene producing no statistics is a normal condition, not an error.
pub fn regional_statistics(grid: &Raster<f64>) -> Option<RegionalStats> {
    let nodata = grid.nodata();
    let mut valid: Vec<f64> = grid
        .data()
        .iter()
        .copied()
        .filter(|v| !v.is_nodata(nodata))
        .collect();

    if valid.is_empty() {
        tracing::warn!("no valid pixels for regional statistics");
        return None;
    }

    valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = valid.len();
    let mean = valid.iter().sum::<f64>() / n as f64;
    let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        valid[n / 2]
    } else {
        (valid[n / 2 - 1] + valid[n / 2]) / 2.0
    };

    Some(RegionalStats {
        mean,
        median,
        std: var.sqrt(),
        min: valid[0],
        max: valid[n - 1],
        pct_valid: n as f64 / grid.len() as f64 * 100.0,
        n_pixels: n as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_statistics() {
        let mut grid: Raster<f64> = Raster::new(2, 2);
        grid.set_nodata(Some(f64::NAN));
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            grid.set(i / 2, i % 2, *v).unwrap();
        }

        let stats = regional_statistics(&grid).unwrap();
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.n_pixels, 4);
        assert_eq!(stats.pct_valid, 100.0);
    }

    #[test]
    fn test_nan_excluded() {
        let mut grid: Raster<f64> = Raster::filled(2, 2, 2.0);
        grid.set_nodata(Some(f64::NAN));
        grid.set(0, 0, f64::NAN).unwrap();

        let stats = regional_statistics(&grid).unwrap();
        assert_eq!(stats.n_pixels, 3);
        assert_eq!(stats.pct_valid, 75.0);
        assert_eq!(stats.mean, 2.0);
    }

    #[test]
    fn test_all_invalid_is_none() {
        let mut grid: Raster<f64> = Raster::filled(2, 2, f64::NAN);
        grid.set_nodata(Some(f64::NAN));
        assert!(regional_statistics(&grid).is_none());
    }

    #[test]
    fn test_odd_count_median() {
        let mut grid: Raster<f64> = Raster::new(1, 3);
        grid.set_nodata(Some(f64::NAN));
        grid.set(0, 0, 5.0).unwrap();
        grid.set(0, 1, 1.0).unwrap();
        grid.set(0, 2, 3.0).unwrap();

        let stats = regional_statistics(&grid).unwrap();
        assert_eq!(stats.median, 3.0);
    }
}
