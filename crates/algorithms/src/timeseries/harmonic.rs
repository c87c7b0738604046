//! Harmonic model fitting and breakpoint monitoring
//!
//! A Fourier model of the seasonal cycle,
//!
//! `y(t) = a0 + sum_k [ a_k cos(2 pi k t) + b_k sin(2 pi k t) ]`
//!
//! with t the day-of-year fraction, fitted by ordinary least squares on a
//! stable history window. Monitoring observations deviating more than
//! 3x the fit RMSE on 3 consecutive dates confirm a structural break
//! (BFAST Monitor, simplified).

use chrono::{Datelike, NaiveDate};

const DAYS_PER_YEAR: f64 = 365.25;

/// Parameters for the breakpoint monitor.
#[derive(Debug, Clone)]
pub struct BreakpointParams {
    /// Number of harmonic terms. Two captures the bimodal Caatinga
    /// green-up.
    pub n_harmonics: usize,
    /// Residual threshold as a multiple of the history RMSE.
    pub threshold_factor: f64,
    /// Consecutive flagged observations required to confirm a break.
    pub n_consecutive: usize,
}

impl Default for BreakpointParams {
    fn default() -> Self {
        Self {
            n_harmonics: 2,
            threshold_factor: 3.0,
            n_consecutive: 3,
        }
    }
}

/// Result of fitting the harmonic model to a series.
#[derive(Debug, Clone)]
pub struct HarmonicFit {
    /// `[a0, a1, b1, a2, b2, ...]`, length `1 + 2 * n_harmonics`.
    pub coefficients: Vec<f64>,
    /// Model prediction at every input date, NaN inputs included.
    pub fitted: Vec<f64>,
    /// `observed - fitted`; NaN where the observation was NaN.
    pub residuals: Vec<f64>,
    /// Root mean square of the valid residuals.
    pub rmse: f64,
}

impl HarmonicFit {
    /// Evaluate the fitted model at an arbitrary date.
    pub fn predict(&self, date: NaiveDate) -> f64 {
        let row = design_row(date, (self.coefficients.len() - 1) / 2);
        row.iter().zip(&self.coefficients).map(|(x, c)| x * c).sum()
    }
}

/// A confirmed structural break in the monitoring period.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    /// First date of the confirming run.
    pub date: NaiveDate,
    pub observed_value: f64,
    pub expected_value: f64,
    /// `observed - expected` at the break date.
    pub anomaly_magnitude: f64,
}

fn design_row(date: NaiveDate, n_harmonics: usize) -> Vec<f64> {
    let t = date.ordinal() as f64 / DAYS_PER_YEAR;
    let mut row = Vec::with_capacity(1 + 2 * n_harmonics);
    row.push(1.0);
    for k in 1..=n_harmonics {
        let angle = 2.0 * std::f64::consts::PI * k as f64 * t;
        row.push(angle.cos());
        row.push(angle.sin());
    }
    row
}

/// Fit the harmonic model by OLS, ignoring NaN observations.
///
/// Returns `None` when the valid observations cannot determine the
/// coefficients (fewer than `1 + 2 * n_harmonics`, or a singular normal
/// system).
pub fn harmonic_fit(
    dates: &[NaiveDate],
    values: &[f64],
    n_harmonics: usize,
) -> Option<HarmonicFit> {
    let ncoef = 1 + 2 * n_harmonics;
    let rows: Vec<Vec<f64>> = dates.iter().map(|d| design_row(*d, n_harmonics)).collect();

    let valid: Vec<usize> = (0..values.len().min(dates.len()))
        .filter(|&i| !values[i].is_nan())
        .collect();
    if valid.len() < ncoef {
        tracing::warn!(
            valid = valid.len(),
            needed = ncoef,
            "not enough valid observations for a harmonic fit"
        );
        return None;
    }

    // Normal equations: (X^T X) c = X^T y
    let mut xtx = vec![vec![0.0; ncoef]; ncoef];
    let mut xty = vec![0.0; ncoef];
    for &i in &valid {
        for a in 0..ncoef {
            xty[a] += rows[i][a] * values[i];
            for b in 0..ncoef {
                xtx[a][b] += rows[i][a] * rows[i][b];
            }
        }
    }

    let coefficients = solve_linear_system(xtx, xty)?;

    let fitted: Vec<f64> = rows
        .iter()
        .map(|r| r.iter().zip(&coefficients).map(|(x, c)| x * c).sum())
        .collect();
    let residuals: Vec<f64> = values
        .iter()
        .zip(&fitted)
        .map(|(y, f)| y - f)
        .collect();

    let valid_res: Vec<f64> = residuals.iter().copied().filter(|r| !r.is_nan()).collect();
    let rmse =
        (valid_res.iter().map(|r| r * r).sum::<f64>() / valid_res.len() as f64).sqrt();

    Some(HarmonicFit {
        coefficients,
        fitted,
        residuals,
        rmse,
    })
}

/// Gaussian elimination with partial pivoting; None on a singular system.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in col + 1..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}

/// Detect structural breaks in the monitoring period after `history_end`.
///
/// The model is fitted on observations up to and including `history_end`;
/// later observations whose absolute residual exceeds the threshold on
/// `n_consecutive` consecutive dates confirm a break dated at the first
/// observation of the run. The run counter resets after a confirmation
/// and on any non-flagged or missing observation, so sustained clearing
/// can report multiple breaks.
pub fn detect_breakpoints(
    dates: &[NaiveDate],
    values: &[f64],
    history_end: NaiveDate,
    params: &BreakpointParams,
) -> Vec<Breakpoint> {
    let mut hist_dates = Vec::new();
    let mut hist_values = Vec::new();
    let mut mon_dates = Vec::new();
    let mut mon_values = Vec::new();

    for (d, v) in dates.iter().zip(values) {
        if *d <= history_end {
            hist_dates.push(*d);
            hist_values.push(*v);
        } else {
            mon_dates.push(*d);
            mon_values.push(*v);
        }
    }

    let Some(fit) = harmonic_fit(&hist_dates, &hist_values, params.n_harmonics) else {
        return Vec::new();
    };
    let threshold = params.threshold_factor * fit.rmse;

    let mut breaks = Vec::new();
    let mut run = 0usize;
    let mut anomalies: Vec<(f64, f64)> = Vec::with_capacity(mon_dates.len());

    for (d, v) in mon_dates.iter().zip(&mon_values) {
        let expected = fit.predict(*d);
        anomalies.push((expected, v - expected));
        let flagged = !v.is_nan() && (v - expected).abs() > threshold;
        if flagged {
            run += 1;
            if run >= params.n_consecutive {
                let idx = anomalies.len() - params.n_consecutive;
                let (exp, anom) = anomalies[idx];
                breaks.push(Breakpoint {
                    date: mon_dates[idx],
                    observed_value: mon_values[idx],
                    expected_value: exp,
                    anomaly_magnitude: anom,
                });
                run = 0;
            }
        } else {
            run = 0;
        }
    }

    tracing::info!(breaks = breaks.len(), "breakpoint monitoring complete");
    breaks
}
