//! Descriptive statistics over flat `f64` samples.
//!
//! Quantiles use linear interpolation between closest ranks, matching the
//! convention of the summary tables this tool reproduces.

pub mod bootstrap;
pub mod dist;
pub mod effect;
pub mod hypothesis;
pub mod power;

use serde::Serialize;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance (n - 1 denominator). Needs at least two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    Some(sum_sq / (values.len() - 1) as f64)
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Standard error of the mean.
pub fn standard_error(values: &[f64]) -> Option<f64> {
    sample_std(values).map(|std| std / (values.len() as f64).sqrt())
}

pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));
    Some(quantile_sorted(&sorted, q))
}

/// Linear interpolation at rank `(n - 1) * q` over an ascending slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (n - 1) as f64 * q;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return sorted[low];
    }
    let weight = rank - low as f64;
    sorted[low] + weight * (sorted[high] - sorted[low])
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

#[derive(Debug, Clone, Serialize)]
pub struct Describe {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub sem: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn describe(values: &[f64]) -> Option<Describe> {
    if values.len() < 2 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));

    Some(Describe {
        n: values.len(),
        mean: mean(values)?,
        std: sample_std(values)?,
        sem: standard_error(values)?,
        min: sorted[0],
        q1: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q3: quantile_sorted(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}
