//! Power of the two-sided two-sample t-test via the noncentral t
//! distribution, and the per-group sample size needed for a target power.

use anyhow::{Result, bail};
use serde::Serialize;

use super::dist::{noncentral_t_cdf, student_t_ppf};

#[derive(Debug, Clone, Serialize)]
pub struct SampleSizeSolution {
    pub n_fractional: f64,
    pub n_per_group: u64,
}

/// Achieved power for effect size `effect_size`, `n1` observations in the
/// first group and `ratio * n1` in the second, at significance `alpha`.
pub fn power(effect_size: f64, n1: f64, ratio: f64, alpha: f64) -> Result<f64> {
    if alpha <= 0.0 || alpha >= 1.0 {
        bail!("alpha must be in (0, 1), got {alpha}");
    }
    if n1 < 2.0 || ratio <= 0.0 {
        bail!("power requires n1 >= 2 and a positive ratio");
    }

    let d = effect_size.abs();
    let n2 = ratio * n1;
    let df = n1 + n2 - 2.0;
    if df < 1.0 {
        bail!("power requires at least 1 degree of freedom");
    }

    let noncentrality = d * (n1 * n2 / (n1 + n2)).sqrt();
    let t_critical = student_t_ppf(1.0 - alpha / 2.0, df);

    let upper = 1.0 - noncentral_t_cdf(t_critical, df, noncentrality);
    let lower = noncentral_t_cdf(-t_critical, df, noncentrality);
    Ok((upper + lower).clamp(0.0, 1.0))
}

/// Smallest per-group sample size reaching `target_power`, solved on the
/// continuous power curve by a doubling bracket and bisection.
pub fn solve_sample_size(
    effect_size: f64,
    target_power: f64,
    ratio: f64,
    alpha: f64,
) -> Result<SampleSizeSolution> {
    if effect_size == 0.0 {
        bail!("cannot solve sample size for a zero effect size");
    }
    if target_power <= 0.0 || target_power >= 1.0 {
        bail!("target power must be in (0, 1), got {target_power}");
    }

    let mut low = 2.0_f64;
    if power(effect_size, low, ratio, alpha)? >= target_power {
        return Ok(SampleSizeSolution {
            n_fractional: low,
            n_per_group: 2,
        });
    }

    let mut high = 4.0_f64;
    while power(effect_size, high, ratio, alpha)? < target_power {
        high *= 2.0;
        if high > 1.0e7 {
            bail!("required sample size exceeds 1e7 per group");
        }
    }

    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if power(effect_size, mid, ratio, alpha)? < target_power {
            low = mid;
        } else {
            high = mid;
        }
        if high - low < 1.0e-9 * high {
            break;
        }
    }

    Ok(SampleSizeSolution {
        n_fractional: high,
        n_per_group: high.ceil() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn power_reference_point_medium_effect() {
        // d = 0.5 with 64 per group is the textbook ~80% design
        let p = power(0.5, 64.0, 1.0, 0.05).expect("power");
        assert_close(p, 0.801, 5e-3);
    }

    #[test]
    fn power_reference_point_small_effect() {
        let p = power(0.2, 30.0, 1.0, 0.05).expect("power");
        assert_close(p, 0.116, 3e-3);
    }

    #[test]
    fn power_is_monotone_in_n_and_effect() {
        let p_small_n = power(0.5, 20.0, 1.0, 0.05).expect("power");
        let p_large_n = power(0.5, 80.0, 1.0, 0.05).expect("power");
        assert!(p_large_n > p_small_n);

        let p_small_d = power(0.2, 50.0, 1.0, 0.05).expect("power");
        let p_large_d = power(0.8, 50.0, 1.0, 0.05).expect("power");
        assert!(p_large_d > p_small_d);

        let sign_invariant = power(-0.5, 20.0, 1.0, 0.05).expect("power");
        assert_close(sign_invariant, p_small_n, 1e-12);
    }

    #[test]
    fn huge_samples_saturate_power() {
        let p = power(0.5, 5000.0, 1.0, 0.05).expect("power");
        assert!(p > 0.999999);
    }

    #[test]
    fn solve_sample_size_reference_points() {
        let medium = solve_sample_size(0.5, 0.80, 1.0, 0.05).expect("solve");
        assert_close(medium.n_fractional, 63.77, 0.2);
        assert_eq!(medium.n_per_group, 64);

        let small = solve_sample_size(0.2, 0.80, 1.0, 0.05).expect("solve");
        assert_close(small.n_fractional, 393.4, 1.0);
        assert_eq!(small.n_per_group, 394);
    }

    #[test]
    fn solve_sample_size_reaches_the_target_when_evaluated() {
        let solution = solve_sample_size(0.7, 0.90, 1.0, 0.05).expect("solve");
        let achieved = power(0.7, solution.n_per_group as f64, 1.0, 0.05).expect("power");
        assert!(achieved >= 0.90);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(power(0.5, 1.0, 1.0, 0.05).is_err());
        assert!(power(0.5, 30.0, 1.0, 0.0).is_err());
        assert!(solve_sample_size(0.0, 0.8, 1.0, 0.05).is_err());
        assert!(solve_sample_size(0.5, 1.0, 1.0, 0.05).is_err());
    }
}
