//! Standardized Precipitation Index
//!
//! SPI transforms precipitation into a standard normal scale by fitting a
//! gamma distribution to the reference period and mapping the target
//! through the fitted CDF. The 3-month variant (SPI-3) feeds the drought
//! gate of the detection pipeline: Caatinga moisture indices drop
//! basin-wide in drought, and SPI-3 below -1.0 widens the detection
//! thresholds to compensate.
//!
//! The gamma shape and scale come from Thom's maximum-likelihood
//! approximation, which is closed-form and matches the conventional SPI
//! formulation (McKee et al., 1993).

use statrs::distribution::{ContinuousCDF, Gamma, Normal};

/// SPI below this value counts as moderate drought.
pub const SPI_MODERATE_DROUGHT: f64 = -1.0;
/// SPI below this value counts as severe drought.
pub const SPI_SEVERE_DROUGHT: f64 = -1.5;
/// SPI below this value counts as extreme drought.
pub const SPI_EXTREME_DROUGHT: f64 = -2.0;

/// Drought classification of an SPI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroughtClass {
    None,
    Moderate,
    Severe,
    Extreme,
}

impl DroughtClass {
    pub fn from_spi(spi: f64) -> Self {
        if spi < SPI_EXTREME_DROUGHT {
            Self::Extreme
        } else if spi < SPI_SEVERE_DROUGHT {
            Self::Severe
        } else if spi < SPI_MODERATE_DROUGHT {
            Self::Moderate
        } else {
            Self::None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Extreme => "extreme",
        }
    }

    pub fn is_drought(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Standardize the last value of `precipitation` against a reference
/// distribution.
///
/// The reference defaults to the full series. Degenerate inputs never
/// panic; the chain of fallbacks is:
///
/// - NaN target: 0.0
/// - fewer than 10 non-zero reference values: plain z-score
/// - near-zero variance in the non-zero reference: 0.0
/// - gamma fit failure: plain z-score
///
/// Zero precipitation is handled with the mixed distribution
/// `P(X = 0) + P(X > 0) * GammaCDF`, and the CDF is clamped to
/// [0.001, 0.999] before the normal quantile so tails stay finite.
pub fn compute_spi(precipitation: &[f64], reference_period: Option<&[f64]>) -> f64 {
    let reference = reference_period.unwrap_or(precipitation);

    let target = match precipitation.last() {
        Some(&t) => t,
        None => return 0.0,
    };
    if target.is_nan() {
        return 0.0;
    }

    let ref_clean: Vec<f64> = reference.iter().copied().filter(|v| !v.is_nan()).collect();
    let ref_nonzero: Vec<f64> = ref_clean.iter().copied().filter(|&v| v > 0.0).collect();

    if ref_nonzero.len() < 10 {
        tracing::warn!(
            nonzero = ref_nonzero.len(),
            "too few non-zero precipitation values for a gamma fit, using z-score"
        );
        return zscore_fallback(target, &ref_clean);
    }

    if population_std(&ref_nonzero) < 1e-10 {
        tracing::warn!("near-zero variance in reference precipitation");
        return 0.0;
    }

    let q = ref_clean.iter().filter(|&&v| v == 0.0).count() as f64 / ref_clean.len() as f64;

    let gamma = match fit_gamma(&ref_nonzero) {
        Some(g) => g,
        None => {
            tracing::warn!("gamma fit failed, falling back to z-score");
            return zscore_fallback(target, &ref_clean);
        }
    };

    let cdf_val = if target == 0.0 {
        q
    } else {
        q + (1.0 - q) * gamma.cdf(target)
    };
    let cdf_val = cdf_val.clamp(0.001, 0.999);

    // Normal::new only fails on invalid parameters, never for (0, 1)
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.inverse_cdf(cdf_val),
        Err(_) => 0.0,
    }
}

/// SPI-3 from a series of monthly precipitation totals (mm).
///
/// The last three months form the target window; the historical rolling
/// 3-month sums form the reference. Fewer than 3 months (or fewer than 2
/// rolling sums) yields 0.0.
pub fn compute_spi_3month(monthly_precip: &[f64]) -> f64 {
    if monthly_precip.len() < 3 {
        tracing::warn!(
            months = monthly_precip.len(),
            "need at least 3 months of precipitation for SPI-3"
        );
        return 0.0;
    }

    let sums_3m: Vec<f64> = monthly_precip
        .windows(3)
        .map(|w| w.iter().sum())
        .collect();

    if sums_3m.len() < 2 {
        tracing::warn!("not enough data for an SPI-3 reference period");
        return 0.0;
    }

    let spi = compute_spi(&sums_3m, None);
    tracing::info!(
        spi = format!("{spi:.2}"),
        target_mm = format!("{:.1}", sums_3m[sums_3m.len() - 1]),
        "SPI-3 computed"
    );
    spi
}

/// Thom's closed-form ML approximation for the gamma parameters.
fn fit_gamma(values: &[f64]) -> Option<Gamma> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let log_mean = values.iter().map(|v| v.ln()).sum::<f64>() / n;

    let a = mean.ln() - log_mean;
    if !a.is_finite() || a <= 0.0 {
        return None;
    }

    let shape = (1.0 + (1.0 + 4.0 * a / 3.0).sqrt()) / (4.0 * a);
    let scale = mean / shape;
    if !shape.is_finite() || !scale.is_finite() || shape <= 0.0 || scale <= 0.0 {
        return None;
    }

    // statrs parameterizes by rate, not scale
    Gamma::new(shape, 1.0 / scale).ok()
}

fn zscore_fallback(target: f64, reference: &[f64]) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let mean = reference.iter().sum::<f64>() / reference.len() as f64;
    let std = if reference.len() > 1 {
        population_std(reference)
    } else {
        1.0
    };
    if std > 0.0 {
        (target - mean) / std
    } else {
        0.0
    }
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic reference roughly gamma-shaped around 100 mm.
    fn reference_series() -> Vec<f64> {
        vec![
            45.0, 60.0, 72.0, 80.0, 85.0, 90.0, 95.0, 100.0, 104.0, 110.0, 115.0, 120.0, 128.0,
            140.0, 155.0, 170.0, 75.0, 98.0, 88.0, 132.0,
        ]
    }

    #[test]
    fn test_spi_near_zero_at_the_mean() {
        let mut series = reference_series();
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        series.push(mean);
        let spi = compute_spi(&series, None);
        assert!(spi.abs() < 0.5, "SPI at mean was {}", spi);
    }

    #[test]
    fn test_spi_negative_for_dry_value() {
        let mut series = reference_series();
        series.push(30.0);
        let spi = compute_spi(&series, None);
        assert!(spi < -1.0, "dry SPI was {}", spi);
    }

    #[test]
    fn test_spi_positive_for_wet_value() {
        let mut series = reference_series();
        series.push(200.0);
        let spi = compute_spi(&series, None);
        assert!(spi > 1.0, "wet SPI was {}", spi);
    }

    #[test]
    fn test_nan_target_is_zero() {
        let mut series = reference_series();
        series.push(f64::NAN);
        assert_eq!(compute_spi(&series, None), 0.0);
    }

    #[test]
    fn test_empty_series_is_zero() {
        assert_eq!(compute_spi(&[], None), 0.0);
    }

    #[test]
    fn test_short_series_falls_back_to_zscore() {
        // 5 values: gamma fit skipped, z-score path
        let series = [10.0, 20.0, 30.0, 40.0, 10.0];
        let spi = compute_spi(&series, None);
        assert!(spi.is_finite());
        assert!(spi < 0.0);
    }

    #[test]
    fn test_constant_reference_is_zero() {
        let series = vec![50.0; 15];
        assert_eq!(compute_spi(&series, None), 0.0);
    }

    #[test]
    fn test_zero_precipitation_handled() {
        let mut series = reference_series();
        series.extend_from_slice(&[0.0, 0.0]);
        series.push(0.0);
        let spi = compute_spi(&series, None);
        assert!(spi.is_finite());
        assert!(spi < 0.0);
    }

    #[test]
    fn test_spi3_too_short_is_zero() {
        assert_eq!(compute_spi_3month(&[10.0, 20.0]), 0.0);
    }

    #[test]
    fn test_spi3_dry_tail() {
        // 3 years of normal months then a dry quarter
        let mut monthly: Vec<f64> = (0..36).map(|i| 80.0 + (i % 12) as f64 * 5.0).collect();
        monthly.extend_from_slice(&[5.0, 3.0, 2.0]);
        let spi = compute_spi_3month(&monthly);
        assert!(spi < -1.0, "SPI-3 was {}", spi);
    }

    #[test]
    fn test_drought_classes() {
        assert_eq!(DroughtClass::from_spi(0.3), DroughtClass::None);
        assert_eq!(DroughtClass::from_spi(-1.2), DroughtClass::Moderate);
        assert_eq!(DroughtClass::from_spi(-1.7), DroughtClass::Severe);
        assert_eq!(DroughtClass::from_spi(-2.4), DroughtClass::Extreme);
        assert!(DroughtClass::from_spi(-1.2).is_drought());
        assert!(!DroughtClass::from_spi(0.0).is_drought());
    }
}
