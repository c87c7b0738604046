//! Mann-Kendall trend test and Sen's slope estimator
//!
//! Nonparametric trend tools for regional index time series. Both
//! tolerate NaN observations, which satellite series are full of.

use chrono::NaiveDate;
use statrs::distribution::{ContinuousCDF, Normal};

const DAYS_PER_YEAR: f64 = 365.25;

/// Direction reported by the Mann-Kendall test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    NoTrend,
    InsufficientData,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::NoTrend => "no_trend",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

/// Mann-Kendall test output.
#[derive(Debug, Clone)]
pub struct TrendResult {
    /// Kendall's tau in [-1, 1].
    pub tau: f64,
    /// Two-sided p-value from the normal approximation.
    pub p_value: f64,
    pub trend: TrendDirection,
    /// Significance at alpha = 0.05.
    pub significant: bool,
    /// Number of valid observations used.
    pub n: usize,
}

/// Sen's slope estimator output.
#[derive(Debug, Clone)]
pub struct SlopeResult {
    /// Median pairwise slope in index units per year.
    pub slope_per_year: f64,
    /// Median of `y - slope * t`.
    pub intercept: f64,
    /// 95% confidence interval bounds for the slope.
    pub lower_ci: f64,
    pub upper_ci: f64,
}

impl SlopeResult {
    fn zeros() -> Self {
        Self {
            slope_per_year: 0.0,
            intercept: 0.0,
            lower_ci: 0.0,
            upper_ci: 0.0,
        }
    }
}

/// Mann-Kendall test for monotonic trend. NaN values are dropped first.
///
/// Fewer than 4 valid observations yields `InsufficientData` with
/// tau 0 and p-value 1 rather than an error; regional series start short
/// and this keeps callers simple.
pub fn mann_kendall(values: &[f64]) -> TrendResult {
    let clean: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = clean.len();

    if n < 4 {
        tracing::warn!(n, "too few observations for Mann-Kendall");
        return TrendResult {
            tau: 0.0,
            p_value: 1.0,
            trend: TrendDirection::InsufficientData,
            significant: false,
            n,
        };
    }

    let mut s: i64 = 0;
    for i in 0..n - 1 {
        for j in i + 1..n {
            let diff = clean[j] - clean[i];
            if diff > 0.0 {
                s += 1;
            } else if diff < 0.0 {
                s -= 1;
            }
        }
    }

    let tau = s as f64 / (n as f64 * (n as f64 - 1.0) / 2.0);

    // Tie correction: group equal values and subtract their contribution
    let mut sorted = clean.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut var_s = n as f64 * (n as f64 - 1.0) * (2.0 * n as f64 + 5.0) / 18.0;
    let mut i = 0;
    while i < n {
        let mut t = 1usize;
        while i + t < n && sorted[i + t] == sorted[i] {
            t += 1;
        }
        if t > 1 {
            let tf = t as f64;
            var_s -= tf * (tf - 1.0) * (2.0 * tf + 5.0) / 18.0;
        }
        i += t;
    }

    // Continuity-corrected z
    let z = if var_s > 0.0 {
        if s > 0 {
            (s as f64 - 1.0) / var_s.sqrt()
        } else if s < 0 {
            (s as f64 + 1.0) / var_s.sqrt()
        } else {
            0.0
        }
    } else {
        0.0
    };

    let p_value = match Normal::new(0.0, 1.0) {
        Ok(normal) => 2.0 * (1.0 - normal.cdf(z.abs())),
        Err(_) => 1.0,
    };

    let significant = p_value < 0.05;
    let trend = if significant {
        if tau > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    } else {
        TrendDirection::NoTrend
    };

    TrendResult {
        tau,
        p_value,
        trend,
        significant,
        n,
    }
}

/// Sen's (Theil-Sen) slope estimator over dated observations.
///
/// Slope is the median of all pairwise slopes in index units per year,
/// robust to the outliers a cloud-contaminated series produces. Fewer
/// than 3 valid observations yields all zeros.
pub fn sens_slope(dates: &[NaiveDate], values: &[f64]) -> SlopeResult {
    let pairs: Vec<(NaiveDate, f64)> = dates
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_nan())
        .map(|(d, v)| (*d, *v))
        .collect();
    let n = pairs.len();

    if n < 3 {
        return SlopeResult::zeros();
    }

    let origin = pairs[0].0;
    let t: Vec<f64> = pairs
        .iter()
        .map(|(d, _)| (*d - origin).num_days() as f64 / DAYS_PER_YEAR)
        .collect();

    let mut slopes = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n - 1 {
        for j in i + 1..n {
            let dt = t[j] - t[i];
            if dt > 0.0 {
                slopes.push((pairs[j].1 - pairs[i].1) / dt);
            }
        }
    }

    if slopes.is_empty() {
        return SlopeResult::zeros();
    }

    slopes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let slope = median_sorted(&slopes);

    let mut intercepts: Vec<f64> = pairs
        .iter()
        .zip(&t)
        .map(|((_, y), ti)| y - slope * ti)
        .collect();
    intercepts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let intercept = median_sorted(&intercepts);

    // 95% CI from the rank positions around the median slope
    let nf = n as f64;
    let c_alpha = 1.96 * (nf * (nf - 1.0) * (2.0 * nf + 5.0) / 18.0).sqrt();
    let m = slopes.len() as f64;
    let m1 = ((m - c_alpha) / 2.0) as isize;
    let m2 = ((m + c_alpha) / 2.0) as isize;

    let lower = slopes[m1.clamp(0, slopes.len() as isize - 1) as usize];
    let upper = slopes[m2.clamp(0, slopes.len() as isize - 1) as usize];

    SlopeResult {
        slope_per_year: slope,
        intercept,
        lower_ci: lower,
        upper_ci: upper,
    }
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let m = sorted.len();
    if m % 2 == 1 {
        sorted[m / 2]
    } else {
        (sorted[m / 2 - 1] + sorted[m / 2]) / 2.0
    }
}
