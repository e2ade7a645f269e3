//! Growth/volatility fitting and risk estimators over valuation series.
//!
//! All rates are continuously compounded and annualized. Inputs are daily
//! `(date, value)` samples; gaps between samples are handled by weighting
//! each log-return with its actual time span.

use chrono::NaiveDate;
use itertools::Itertools;

use crate::error::{AnnealError, FinportResult};

const DAYS_PER_YEAR: f64 = 365.25;

/// Variance floor below which a benchmark is considered ill-conditioned.
const BETA_VARIANCE_EPS: f64 = 1e-12;

fn year_fraction(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_YEAR
}

/// Per-interval log-returns with their time spans in years.
fn log_returns(samples: &[(NaiveDate, f64)]) -> FinportResult<Vec<(f64, f64)>> {
    if samples.len() < 2 {
        return Err(AnnealError::DegenerateSeries(format!(
            "need at least 2 samples, got {}",
            samples.len()
        ))
        .into());
    }
    samples
        .iter()
        .tuple_windows()
        .map(|(&(d0, v0), &(d1, v1))| {
            if v0 <= 0.0 || v1 <= 0.0 {
                return Err(AnnealError::DegenerateSeries(format!(
                    "non-positive value in series at {d1}"
                ))
                .into());
            }
            let dt = year_fraction(d0, d1);
            if dt <= 0.0 {
                return Err(AnnealError::DegenerateSeries(format!(
                    "non-increasing timestamps at {d1}"
                ))
                .into());
            }
            Ok(((v1 / v0).ln(), dt))
        })
        .collect()
}

/// Fits a geometric-Brownian-motion model to a value series.
///
/// Returns `(r, sigma)`: the continuously-compounded annualized growth rate
/// and the annualized volatility around it.
pub fn fit_growth_and_volatility(samples: &[(NaiveDate, f64)]) -> FinportResult<(f64, f64)> {
    let returns = log_returns(samples)?;
    let total_years: f64 = returns.iter().map(|&(_, dt)| dt).sum();

    let r: f64 = returns.iter().map(|&(x, _)| x).sum::<f64>() / total_years;
    let variance: f64 = returns
        .iter()
        .map(|&(x, dt)| (x - r * dt).powi(2))
        .sum::<f64>()
        / total_years;

    Ok((r, variance.sqrt()))
}

/// Annualized semi-deviation of log-returns below `threshold`.
pub fn downside_risk(
    samples: &[(NaiveDate, f64)],
    threshold: f64,
) -> FinportResult<f64> {
    semi_deviation(samples, threshold, f64::min)
}

/// Annualized semi-deviation of log-returns above `threshold`.
pub fn upside_risk(samples: &[(NaiveDate, f64)], threshold: f64) -> FinportResult<f64> {
    semi_deviation(samples, threshold, f64::max)
}

fn semi_deviation(
    samples: &[(NaiveDate, f64)],
    threshold: f64,
    clamp: fn(f64, f64) -> f64,
) -> FinportResult<f64> {
    let returns = log_returns(samples)?;
    let total_years: f64 = returns.iter().map(|&(_, dt)| dt).sum();
    let sum_sq: f64 = returns
        .iter()
        .map(|&(x, dt)| clamp(x - threshold * dt, 0.0).powi(2))
        .sum();
    Ok((sum_sq / total_years).sqrt())
}

/// Beta of a value series against a benchmark series sharing the same date
/// axis (join the benchmark onto the portfolio dates first).
///
/// Returns `None` when the estimate is ill-conditioned: a near-constant
/// benchmark, or too few overlapping samples. This is an absent feature, not
/// an error.
pub fn beta(
    samples: &[(NaiveDate, f64)],
    benchmark: &[(NaiveDate, f64)],
) -> Option<f64> {
    let paired: Vec<(f64, f64)> = samples
        .iter()
        .filter_map(|&(date, value)| {
            let bench = benchmark
                .iter()
                .take_while(|&&(d, _)| d <= date)
                .last()
                .map(|&(_, v)| v)?;
            Some((value, bench))
        })
        .collect();
    if paired.len() < 3 {
        return None;
    }
    if paired.iter().any(|&(v, b)| v <= 0.0 || b <= 0.0) {
        return None;
    }

    let returns: Vec<(f64, f64)> = paired
        .iter()
        .tuple_windows()
        .map(|(&(v0, b0), &(v1, b1))| ((v1 / v0).ln(), (b1 / b0).ln()))
        .collect();

    let n = returns.len() as f64;
    let mean_p = returns.iter().map(|&(p, _)| p).sum::<f64>() / n;
    let mean_b = returns.iter().map(|&(_, b)| b).sum::<f64>() / n;
    let covariance: f64 = returns
        .iter()
        .map(|&(p, b)| (p - mean_p) * (b - mean_b))
        .sum::<f64>()
        / n;
    let variance: f64 = returns.iter().map(|&(_, b)| (b - mean_b).powi(2)).sum::<f64>() / n;

    if variance < BETA_VARIANCE_EPS {
        return None;
    }
    Some(covariance / variance)
}
