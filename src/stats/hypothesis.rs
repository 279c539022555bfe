//! Distribution diagnostics and two-sample location tests.

use anyhow::{Result, bail};
use serde::Serialize;

use super::dist::{f_sf, normal_ppf, normal_sf, student_t_sf};
use super::{mean, median, sample_variance};

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WelchOutcome {
    pub t_statistic: f64,
    pub df: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MannWhitneyOutcome {
    pub u_statistic: f64,
    pub z_statistic: f64,
    pub p_value: f64,
}

/// Shapiro-Wilk normality test, Royston's AS R94 approximation.
/// Valid for 3 <= n <= 5000.
pub fn shapiro_wilk(values: &[f64]) -> Result<TestOutcome> {
    let n = values.len();
    if !(3..=5000).contains(&n) {
        bail!("shapiro-wilk requires 3 <= n <= 5000, got {n}");
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));
    if sorted[n - 1] - sorted[0] <= 0.0 {
        bail!("shapiro-wilk requires non-constant data");
    }

    let nf = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| normal_ppf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let m_sum_sq: f64 = m.iter().map(|v| v * v).sum();

    let mut weights = vec![0.0_f64; n];
    if n == 3 {
        weights[2] = (0.5_f64).sqrt();
        weights[0] = -weights[2];
    } else {
        let u = 1.0 / nf.sqrt();
        let a_n = -2.706056 * u.powi(5) + 4.434685 * u.powi(4) - 2.071190 * u.powi(3)
            - 0.147981 * u * u
            + 0.221157 * u
            + m[n - 1] / m_sum_sq.sqrt();

        if n > 5 {
            let a_n1 = -3.582633 * u.powi(5) + 5.682633 * u.powi(4) - 1.752461 * u.powi(3)
                - 0.293762 * u * u
                + 0.042981 * u
                + m[n - 2] / m_sum_sq.sqrt();
            let phi = (m_sum_sq - 2.0 * m[n - 1] * m[n - 1] - 2.0 * m[n - 2] * m[n - 2])
                / (1.0 - 2.0 * a_n * a_n - 2.0 * a_n1 * a_n1);
            weights[n - 1] = a_n;
            weights[0] = -a_n;
            weights[n - 2] = a_n1;
            weights[1] = -a_n1;
            for i in 2..n - 2 {
                weights[i] = m[i] / phi.sqrt();
            }
        } else {
            let phi = (m_sum_sq - 2.0 * m[n - 1] * m[n - 1]) / (1.0 - 2.0 * a_n * a_n);
            weights[n - 1] = a_n;
            weights[0] = -a_n;
            for i in 1..n - 1 {
                weights[i] = m[i] / phi.sqrt();
            }
        }
    }

    let sample_mean = mean(&sorted).expect("non-empty");
    let sum_sq: f64 = sorted.iter().map(|v| (v - sample_mean).powi(2)).sum();
    let slope: f64 = weights.iter().zip(&sorted).map(|(a, x)| a * x).sum();
    let w = (slope * slope / sum_sq).min(1.0);

    let p_value = shapiro_p_value(w, n);
    Ok(TestOutcome {
        statistic: w,
        p_value,
    })
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    let nf = n as f64;
    if n == 3 {
        let p = 6.0 / std::f64::consts::PI
            * (w.sqrt().asin() - (0.75_f64).sqrt().asin());
        return p.clamp(0.0, 1.0);
    }

    let log_one_minus_w = (1.0 - w).ln();
    let z = if n <= 11 {
        let gamma = -2.273 + 0.459 * nf;
        if gamma <= log_one_minus_w {
            // outside the fitted region, W is far from normality
            return 0.0;
        }
        let mu = 0.5440 - 0.39978 * nf + 0.025054 * nf * nf - 0.0006714 * nf * nf * nf;
        let sigma = (1.3822 - 0.77857 * nf + 0.062767 * nf * nf - 0.0020322 * nf * nf * nf).exp();
        (-(gamma - log_one_minus_w).ln() - mu) / sigma
    } else {
        let log_n = nf.ln();
        let mu = -1.5861 - 0.31082 * log_n - 0.083751 * log_n * log_n
            + 0.0038915 * log_n * log_n * log_n;
        let sigma = (-0.4803 - 0.082676 * log_n + 0.0030302 * log_n * log_n).exp();
        (log_one_minus_w - mu) / sigma
    };

    normal_sf(z).clamp(0.0, 1.0)
}

/// Homogeneity-of-variance test, Brown-Forsythe variant (median-centered
/// absolute deviations), the default centering of the library the source
/// analysis called.
pub fn levene(x: &[f64], y: &[f64]) -> Result<TestOutcome> {
    if x.len() < 2 || y.len() < 2 {
        bail!(
            "levene requires at least 2 observations per group, got {} and {}",
            x.len(),
            y.len()
        );
    }

    let median_x = median(x).expect("non-empty");
    let median_y = median(y).expect("non-empty");
    let z_x: Vec<f64> = x.iter().map(|v| (v - median_x).abs()).collect();
    let z_y: Vec<f64> = y.iter().map(|v| (v - median_y).abs()).collect();

    let mean_x = mean(&z_x).expect("non-empty");
    let mean_y = mean(&z_y).expect("non-empty");
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let grand = (n1 * mean_x + n2 * mean_y) / (n1 + n2);

    let between = n1 * (mean_x - grand).powi(2) + n2 * (mean_y - grand).powi(2);
    let within: f64 = z_x.iter().map(|z| (z - mean_x).powi(2)).sum::<f64>()
        + z_y.iter().map(|z| (z - mean_y).powi(2)).sum::<f64>();
    if within <= 0.0 {
        bail!("levene is undefined for zero within-group spread");
    }

    let df2 = n1 + n2 - 2.0;
    let statistic = df2 * between / within;
    let p_value = f_sf(statistic, 1.0, df2);

    Ok(TestOutcome {
        statistic,
        p_value,
    })
}

/// Welch's unequal-variance t-test, two-sided.
pub fn welch_t_test(x: &[f64], y: &[f64]) -> Result<WelchOutcome> {
    if x.len() < 2 || y.len() < 2 {
        bail!(
            "welch t-test requires at least 2 observations per group, got {} and {}",
            x.len(),
            y.len()
        );
    }

    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let var1 = sample_variance(x).expect("checked length");
    let var2 = sample_variance(y).expect("checked length");
    if var1 + var2 <= 0.0 {
        bail!("welch t-test is undefined for two zero-variance samples");
    }

    let se1 = var1 / n1;
    let se2 = var2 / n2;
    let pooled = se1 + se2;
    let t_statistic = (mean(x).expect("non-empty") - mean(y).expect("non-empty")) / pooled.sqrt();
    let df = pooled * pooled / (se1 * se1 / (n1 - 1.0) + se2 * se2 / (n2 - 1.0));
    let p_value = (2.0 * student_t_sf(t_statistic.abs(), df)).min(1.0);

    Ok(WelchOutcome {
        t_statistic,
        df,
        p_value,
    })
}

/// Mann-Whitney U test, two-sided, tie-corrected normal approximation
/// with continuity correction. Returns the U statistic of the first
/// sample.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Result<MannWhitneyOutcome> {
    if x.is_empty() || y.is_empty() {
        bail!("mann-whitney requires non-empty groups");
    }

    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let total = n1 + n2;

    let mut combined: Vec<(f64, bool)> = x
        .iter()
        .map(|&v| (v, true))
        .chain(y.iter().map(|&v| (v, false)))
        .collect();
    combined.sort_by(|left, right| left.0.total_cmp(&right.0));

    let mut ranks = vec![0.0_f64; combined.len()];
    let mut tie_correction = 0.0_f64;
    let mut index = 0;
    while index < combined.len() {
        let mut end = index + 1;
        while end < combined.len() && combined[end].0 == combined[index].0 {
            end += 1;
        }
        let tie_size = (end - index) as f64;
        let average_rank = (index + 1 + end) as f64 / 2.0;
        for rank in ranks.iter_mut().take(end).skip(index) {
            *rank = average_rank;
        }
        tie_correction += tie_size.powi(3) - tie_size;
        index = end;
    }

    let rank_sum: f64 = combined
        .iter()
        .zip(&ranks)
        .filter(|((_, first), _)| *first)
        .map(|(_, rank)| rank)
        .sum();

    let u_statistic = rank_sum - n1 * (n1 + 1.0) / 2.0;
    let mean_u = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((total + 1.0) - tie_correction / (total * (total - 1.0)));
    if variance <= 0.0 {
        bail!("mann-whitney is undefined when all values are identical");
    }

    let difference = u_statistic - mean_u;
    let z_statistic = if difference == 0.0 {
        0.0
    } else {
        (difference - 0.5 * difference.signum()) / variance.sqrt()
    };
    let p_value = (2.0 * normal_sf(z_statistic.abs())).min(1.0);

    Ok(MannWhitneyOutcome {
        u_statistic,
        z_statistic,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::dist::normal_ppf;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    fn ideal_normal_sample(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|i| normal_ppf((i as f64 - 0.375) / (n as f64 + 0.25)))
            .collect()
    }

    #[test]
    fn shapiro_accepts_normal_looking_data() {
        let sample = ideal_normal_sample(25);
        let outcome = shapiro_wilk(&sample).expect("shapiro");
        assert!(outcome.statistic > 0.95 && outcome.statistic <= 1.0);
        assert!(outcome.p_value > 0.5, "p = {}", outcome.p_value);
    }

    #[test]
    fn shapiro_rejects_heavily_skewed_data() {
        let sample: Vec<f64> = (1..=25).map(|i| (i as f64 / 2.0).exp()).collect();
        let outcome = shapiro_wilk(&sample).expect("shapiro");
        assert!(outcome.p_value < 0.001, "p = {}", outcome.p_value);
    }

    #[test]
    fn shapiro_handles_small_samples() {
        let outcome = shapiro_wilk(&[1.0, 2.0, 3.0]).expect("n = 3");
        assert!(outcome.statistic > 0.99);
        assert!(outcome.p_value > 0.5);

        let outcome = shapiro_wilk(&[1.0, 2.0, 3.0, 4.0, 8.0]).expect("n = 5");
        assert!(outcome.p_value > 0.0 && outcome.p_value < 1.0);
    }

    #[test]
    fn shapiro_rejects_degenerate_input() {
        assert!(shapiro_wilk(&[1.0, 2.0]).is_err());
        assert!(shapiro_wilk(&[3.0; 10]).is_err());
    }

    #[test]
    fn levene_flags_unequal_spread() {
        let narrow: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        let wide: Vec<f64> = (1..=12).map(|i| i as f64 * 10.0).collect();
        let outcome = levene(&narrow, &wide).expect("levene");
        assert!(outcome.p_value < 0.01, "p = {}", outcome.p_value);

        let same = levene(&narrow, &narrow).expect("levene");
        assert_close(same.statistic, 0.0, 1e-12);
        assert_close(same.p_value, 1.0, 1e-12);
    }

    #[test]
    fn welch_matches_reference_computation() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let outcome = welch_t_test(&x, &y).expect("welch");
        assert_close(outcome.t_statistic, -1.8973665961010275, 1e-12);
        assert_close(outcome.df, 5.882352941176471, 1e-9);
        assert_close(outcome.p_value, 0.1073, 5e-4);
    }

    #[test]
    fn welch_is_symmetric_in_sign() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let forward = welch_t_test(&x, &y).expect("welch");
        let reverse = welch_t_test(&y, &x).expect("welch");
        assert_close(forward.t_statistic, -reverse.t_statistic, 1e-12);
        assert_close(forward.p_value, reverse.p_value, 1e-12);
    }

    #[test]
    fn welch_rejects_zero_variance_pairs() {
        assert!(welch_t_test(&[1.0, 1.0], &[2.0, 2.0]).is_err());
    }

    #[test]
    fn mann_whitney_on_separated_groups() {
        let outcome = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).expect("mwu");
        assert_close(outcome.u_statistic, 0.0, 1e-12);
        assert_close(outcome.p_value, 0.0809, 5e-4);
    }

    #[test]
    fn mann_whitney_assigns_midranks_to_ties() {
        let outcome = mann_whitney_u(&[1.0, 2.0, 2.0], &[2.0, 3.0, 4.0]).expect("mwu");
        // ranks: 1, (2+3+4)/3 twice for the first group
        assert_close(outcome.u_statistic, 1.0, 1e-12);
    }

    #[test]
    fn mann_whitney_identical_groups_is_inconclusive() {
        let outcome = mann_whitney_u(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).expect("mwu");
        assert_close(outcome.z_statistic, 0.0, 1e-12);
        assert_close(outcome.p_value, 1.0, 1e-12);
        assert!(mann_whitney_u(&[2.0, 2.0], &[2.0, 2.0]).is_err());
    }
}
