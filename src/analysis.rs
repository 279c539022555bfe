//! Shared analysis pipeline: one `MetricReport` per metric, assembled
//! from the descriptive, diagnostic, testing, effect, interval, and power
//! stages, plus input provenance for manifests and reports.

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::data::{Dataset, MetricSeries};
use crate::model::{
    DiagnosticsBlock, EffectBlock, GroupSummaries, HypothesisBlock, InputFileSummary,
    IntervalBlock, IntervalEstimate, MetricReport, PowerBlock,
};
use crate::stats::bootstrap::bootstrap_mean_ci;
use crate::stats::dist::normal_ppf;
use crate::stats::effect::{cliffs_delta, cliffs_magnitude, cohen_d, cohen_magnitude};
use crate::stats::hypothesis::{levene, mann_whitney_u, shapiro_wilk, welch_t_test};
use crate::stats::power::{power, solve_sample_size};
use crate::stats::{describe, mean, standard_error};
use crate::util::sha256_file;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisSettings {
    pub alpha: f64,
    pub confidence: f64,
    pub seed: u64,
    pub resamples: usize,
    pub target_power: f64,
}

pub fn input_summaries(control: &Dataset, test: &Dataset) -> Result<Vec<InputFileSummary>> {
    [control, test]
        .iter()
        .map(|dataset| {
            let sha256 = sha256_file(&dataset.source)?;
            let (date_start, date_end) = match dataset.date_range() {
                Some((start, end)) => (Some(start.to_string()), Some(end.to_string())),
                None => (None, None),
            };

            let mut campaigns = Vec::new();
            for record in &dataset.records {
                if !campaigns.contains(&record.campaign) {
                    campaigns.push(record.campaign.clone());
                }
            }

            Ok(InputFileSummary {
                group: dataset.group,
                path: dataset.source.display().to_string(),
                sha256,
                rows: dataset.records.len(),
                rows_dropped: dataset.rows_dropped,
                date_start,
                date_end,
                campaigns,
            })
        })
        .collect()
}

/// Normality and variance diagnostics with the test recommendation the
/// source analysis derives: parametric only when both groups look normal.
pub fn diagnostics_for(control: &[f64], test: &[f64], alpha: f64) -> DiagnosticsBlock {
    let mut notes = Vec::new();

    let shapiro_control = match shapiro_wilk(control) {
        Ok(outcome) => Some(outcome),
        Err(error) => {
            notes.push(format!("control normality test unavailable: {error}"));
            None
        }
    };
    let shapiro_test = match shapiro_wilk(test) {
        Ok(outcome) => Some(outcome),
        Err(error) => {
            notes.push(format!("test normality test unavailable: {error}"));
            None
        }
    };
    let levene_outcome = match levene(control, test) {
        Ok(outcome) => Some(outcome),
        Err(error) => {
            notes.push(format!("variance test unavailable: {error}"));
            None
        }
    };

    let control_normal = shapiro_control.as_ref().map(|o| o.p_value > alpha);
    let test_normal = shapiro_test.as_ref().map(|o| o.p_value > alpha);
    let equal_variances = levene_outcome.as_ref().map(|o| o.p_value > alpha);

    let recommended_test =
        if control_normal.unwrap_or(false) && test_normal.unwrap_or(false) {
            "welch_t"
        } else {
            "mann_whitney"
        };
    if equal_variances == Some(false) && recommended_test == "welch_t" {
        notes.push("variances differ; Welch's correction applies".to_string());
    }

    DiagnosticsBlock {
        shapiro_control,
        shapiro_test,
        levene: levene_outcome,
        control_normal,
        test_normal,
        equal_variances,
        recommended_test: recommended_test.to_string(),
        notes,
    }
}

pub fn analyze_metric(series: &MetricSeries, settings: &AnalysisSettings) -> Result<MetricReport> {
    let metric = series.metric;
    let control = series.control.as_slice();
    let test = series.test.as_slice();

    let summary = GroupSummaries {
        control: describe(control)
            .with_context(|| format!("not enough control data for {metric}"))?,
        test: describe(test).with_context(|| format!("not enough test data for {metric}"))?,
    };

    let diagnostics = diagnostics_for(control, test, settings.alpha);

    let welch = welch_t_test(control, test)
        .with_context(|| format!("welch t-test failed for {metric}"))?;
    let mann_whitney = mann_whitney_u(control, test)
        .with_context(|| format!("mann-whitney failed for {metric}"))?;
    let tests = HypothesisBlock {
        welch_significant: welch.p_value < settings.alpha,
        mann_whitney_significant: mann_whitney.p_value < settings.alpha,
        welch,
        mann_whitney,
    };

    let d = cohen_d(control, test).with_context(|| format!("cohen's d failed for {metric}"))?;
    let delta =
        cliffs_delta(control, test).with_context(|| format!("cliff's delta failed for {metric}"))?;
    let effects = EffectBlock {
        cohen_d: d,
        cohen_magnitude: cohen_magnitude(d).to_string(),
        cliffs_delta: delta,
        cliffs_magnitude: cliffs_magnitude(delta).to_string(),
    };

    let intervals = interval_block(control, test, settings)?;
    let power_block = power_block(d.abs(), control.len(), test.len(), settings)?;
    let conclusion = conclusion_for(series, &summary, &tests, &effects, &power_block);

    Ok(MetricReport {
        metric,
        unit: metric.unit().to_string(),
        control_skipped: series.control_skipped,
        test_skipped: series.test_skipped,
        summary,
        diagnostics,
        tests,
        effects,
        intervals,
        power: power_block,
        conclusion,
    })
}

pub fn normal_ci(values: &[f64], confidence: f64) -> Result<IntervalEstimate> {
    if confidence <= 0.0 || confidence >= 1.0 {
        bail!("confidence must be in (0, 1), got {confidence}");
    }
    let sample_mean = mean(values).context("empty sample")?;
    let sem = standard_error(values).context("sample too small for a standard error")?;
    let z = normal_ppf((1.0 + confidence) / 2.0);
    Ok(IntervalEstimate {
        mean: sample_mean,
        lower: sample_mean - z * sem,
        upper: sample_mean + z * sem,
    })
}

pub fn intervals_overlap(a: &IntervalEstimate, b: &IntervalEstimate) -> bool {
    a.lower <= b.upper && b.lower <= a.upper
}

fn interval_block(
    control: &[f64],
    test: &[f64],
    settings: &AnalysisSettings,
) -> Result<IntervalBlock> {
    let analytic_control = normal_ci(control, settings.confidence)?;
    let analytic_test = normal_ci(test, settings.confidence)?;

    let boot_control =
        bootstrap_mean_ci(control, settings.resamples, settings.confidence, settings.seed)?;
    let boot_test = bootstrap_mean_ci(
        test,
        settings.resamples,
        settings.confidence,
        settings.seed.wrapping_add(1),
    )?;

    let bootstrap_control = IntervalEstimate {
        mean: mean(control).context("empty sample")?,
        lower: boot_control.lower,
        upper: boot_control.upper,
    };
    let bootstrap_test = IntervalEstimate {
        mean: mean(test).context("empty sample")?,
        lower: boot_test.lower,
        upper: boot_test.upper,
    };

    Ok(IntervalBlock {
        confidence: settings.confidence,
        analytic_overlap: intervals_overlap(&analytic_control, &analytic_test),
        control: analytic_control,
        test: analytic_test,
        bootstrap_overlap: intervals_overlap(&bootstrap_control, &bootstrap_test),
        bootstrap_control,
        bootstrap_test,
        resamples: settings.resamples,
        seed: settings.seed,
    })
}

fn power_block(
    effect_size: f64,
    n_control: usize,
    n_test: usize,
    settings: &AnalysisSettings,
) -> Result<PowerBlock> {
    let n1 = n_control as f64;
    let ratio = n_test as f64 / n_control as f64;
    let achieved = power(effect_size, n1, ratio, settings.alpha)?;

    let required_n = if effect_size > 1e-6 {
        match solve_sample_size(effect_size, settings.target_power, ratio, settings.alpha) {
            Ok(solution) => Some(solution),
            Err(error) => {
                warn!(%error, "sample size solve failed");
                None
            }
        }
    } else {
        None
    };

    Ok(PowerBlock {
        effect_size,
        effect_size_source: "observed".to_string(),
        alpha: settings.alpha,
        power: achieved,
        target_power: settings.target_power,
        adequate: achieved >= settings.target_power,
        required_n,
    })
}

fn conclusion_for(
    series: &MetricSeries,
    summary: &GroupSummaries,
    tests: &HypothesisBlock,
    effects: &EffectBlock,
    power_block: &PowerBlock,
) -> String {
    let metric = series.metric;
    let direction = if summary.test.mean > summary.control.mean {
        "higher"
    } else {
        "lower"
    };

    let verdict = if tests.welch_significant && tests.mann_whitney_significant {
        format!(
            "{metric} differs significantly between groups (Welch p = {:.4}, Mann-Whitney p = {:.4}); the test group mean is {direction}",
            tests.welch.p_value, tests.mann_whitney.p_value
        )
    } else if tests.welch_significant || tests.mann_whitney_significant {
        format!(
            "{metric} shows a difference on one test only (Welch p = {:.4}, Mann-Whitney p = {:.4}); treat as inconclusive",
            tests.welch.p_value, tests.mann_whitney.p_value
        )
    } else {
        format!(
            "no significant {metric} difference (Welch p = {:.4}, Mann-Whitney p = {:.4})",
            tests.welch.p_value, tests.mann_whitney.p_value
        )
    };

    let effect_note = format!(
        "effect sizes: Cohen's d = {:.3} ({}), Cliff's delta = {:.3} ({})",
        effects.cohen_d, effects.cohen_magnitude, effects.cliffs_delta, effects.cliffs_magnitude
    );

    let power_note = if power_block.adequate {
        format!("power {:.3} meets the {:.2} target", power_block.power, power_block.target_power)
    } else {
        match &power_block.required_n {
            Some(solution) => format!(
                "underpowered ({:.3}); about {} records per group needed for {:.2} power",
                power_block.power, solution.n_per_group, power_block.target_power
            ),
            None => format!(
                "underpowered ({:.3}) and the observed effect is too small to size a follow-up",
                power_block.power
            ),
        }
    };

    format!("{verdict}; {effect_note}; {power_note}")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;

    use super::*;
    use crate::data::{CampaignRecord, GroupLabel, MetricKind};

    fn settings() -> AnalysisSettings {
        AnalysisSettings {
            alpha: 0.05,
            confidence: 0.95,
            seed: 42,
            resamples: 500,
            target_power: 0.80,
        }
    }

    fn series(control: Vec<f64>, test: Vec<f64>) -> MetricSeries {
        MetricSeries {
            metric: MetricKind::Ctr,
            control,
            test,
            control_skipped: 0,
            test_skipped: 0,
        }
    }

    fn spread(center: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| center + step * (i as f64 - (n as f64 - 1.0) / 2.0) / (n as f64))
            .collect()
    }

    #[test]
    fn separated_groups_are_reported_significant() {
        let report = analyze_metric(&series(spread(5.0, 2.0, 25), spread(10.0, 2.0, 25)), &settings())
            .expect("analyze");

        assert!(report.tests.welch_significant);
        assert!(report.tests.mann_whitney_significant);
        assert_eq!(report.effects.cohen_magnitude, "large");
        assert!(report.power.adequate);
        assert!(!report.intervals.analytic_overlap);
        assert!(report.conclusion.contains("differs significantly"));
        assert!(report.conclusion.contains("higher"));
    }

    #[test]
    fn overlapping_groups_are_not_significant() {
        let report = analyze_metric(
            &series(spread(5.0, 4.0, 20), spread(5.05, 4.0, 20)),
            &settings(),
        )
        .expect("analyze");

        assert!(!report.tests.welch_significant);
        assert!(!report.tests.mann_whitney_significant);
        assert!(!report.power.adequate);
        assert!(report.conclusion.contains("no significant"));
    }

    #[test]
    fn intervals_are_ordered_and_bracket_the_mean() {
        let report = analyze_metric(&series(spread(5.0, 2.0, 25), spread(10.0, 2.0, 25)), &settings())
            .expect("analyze");

        for estimate in [
            &report.intervals.control,
            &report.intervals.test,
            &report.intervals.bootstrap_control,
            &report.intervals.bootstrap_test,
        ] {
            assert!(estimate.lower <= estimate.mean && estimate.mean <= estimate.upper);
        }
    }

    #[test]
    fn diagnostics_recommend_nonparametric_for_skewed_data() {
        let skewed: Vec<f64> = (1..=25).map(|i| (i as f64 / 2.0).exp()).collect();
        let normalish: Vec<f64> = (1..=25)
            .map(|i| 5.0 + crate::stats::dist::normal_ppf((i as f64 - 0.375) / 25.25))
            .collect();
        let block = diagnostics_for(&normalish, &skewed, 0.05);

        assert_eq!(block.recommended_test, "mann_whitney");
        assert_eq!(block.control_normal, Some(true));
        assert_eq!(block.test_normal, Some(false));
    }

    #[test]
    fn diagnostics_survive_untestable_input() {
        let block = diagnostics_for(&[1.0, 2.0], &[1.0, 2.0, 3.0, 4.0, 5.0], 0.05);
        assert!(block.shapiro_control.is_none());
        assert!(!block.notes.is_empty());
    }

    #[test]
    fn input_summaries_capture_provenance() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "fixture").expect("write");
        file.flush().expect("flush");

        let record = CampaignRecord {
            campaign: "Control Campaign".to_string(),
            date: NaiveDate::from_ymd_opt(2019, 8, 1).expect("date"),
            spend: 100.0,
            impressions: 1000,
            reach: 900,
            website_clicks: 50,
            searches: 10,
            view_content: 8,
            add_to_cart: 5,
            purchases: 2,
        };
        let dataset = Dataset {
            group: GroupLabel::Control,
            source: file.path().to_path_buf(),
            records: vec![record.clone(), record],
            rows_dropped: 1,
        };

        let summaries = input_summaries(&dataset, &dataset.clone()).expect("summaries");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].sha256.len(), 64);
        assert_eq!(summaries[0].rows, 2);
        assert_eq!(summaries[0].rows_dropped, 1);
        assert_eq!(summaries[0].campaigns, vec!["Control Campaign".to_string()]);
        assert_eq!(summaries[0].date_start.as_deref(), Some("2019-08-01"));
    }
}
