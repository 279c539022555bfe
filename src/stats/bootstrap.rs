//! Percentile bootstrap of the sample mean with a seeded generator so
//! repeated runs produce identical intervals.

use anyhow::{Result, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use super::quantile_sorted;

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapCi {
    pub lower: f64,
    pub upper: f64,
    pub resamples: usize,
    pub confidence: f64,
    pub seed: u64,
    #[serde(skip)]
    pub means: Vec<f64>,
}

pub fn bootstrap_mean_ci(
    values: &[f64],
    resamples: usize,
    confidence: f64,
    seed: u64,
) -> Result<BootstrapCi> {
    if values.is_empty() {
        bail!("bootstrap requires a non-empty sample");
    }
    if resamples == 0 {
        bail!("bootstrap requires at least one resample");
    }
    if confidence <= 0.0 || confidence >= 1.0 {
        bail!("bootstrap confidence must be in (0, 1), got {confidence}");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut means = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let mut total = 0.0_f64;
        for _ in 0..values.len() {
            total += values[rng.gen_range(0..values.len())];
        }
        means.push(total / values.len() as f64);
    }

    means.sort_by(|left, right| left.total_cmp(right));
    let tail = (1.0 - confidence) / 2.0;
    let lower = quantile_sorted(&means, tail);
    let upper = quantile_sorted(&means, 1.0 - tail);

    Ok(BootstrapCi {
        lower,
        upper,
        resamples,
        confidence,
        seed,
        means,
    })
}
