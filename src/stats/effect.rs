//! Effect size measures and their conventional magnitude labels.

use anyhow::{Result, bail};

/// Cohen's d with the pooled standard deviation weighted by n - 1.
pub fn cohen_d(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() < 2 || y.len() < 2 {
        bail!(
            "cohen's d requires at least 2 observations per group, got {} and {}",
            x.len(),
            y.len()
        );
    }

    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let var1 = super::sample_variance(x).expect("checked length");
    let var2 = super::sample_variance(y).expect("checked length");
    let pooled = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0);
    if pooled <= 0.0 {
        bail!("cohen's d is undefined for two zero-variance samples");
    }

    let mean_diff = super::mean(x).expect("non-empty") - super::mean(y).expect("non-empty");
    Ok(mean_diff / pooled.sqrt())
}

/// Cliff's delta: pairwise dominance (#greater - #less) / (n1 * n2).
pub fn cliffs_delta(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.is_empty() || y.is_empty() {
        bail!("cliff's delta requires non-empty groups");
    }

    let mut greater = 0_i64;
    let mut less = 0_i64;
    for &a in x {
        for &b in y {
            if a > b {
                greater += 1;
            } else if a < b {
                less += 1;
            }
        }
    }

    Ok((greater - less) as f64 / (x.len() * y.len()) as f64)
}

pub fn cohen_magnitude(d: f64) -> &'static str {
    match d.abs() {
        v if v < 0.2 => "negligible",
        v if v < 0.5 => "small",
        v if v < 0.8 => "medium",
        _ => "large",
    }
}

pub fn cliffs_magnitude(delta: f64) -> &'static str {
    match delta.abs() {
        v if v < 0.147 => "negligible",
        v if v < 0.33 => "small",
        v if v < 0.474 => "medium",
        _ => "large",
    }
}
