use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::analysis::{AnalysisSettings, analyze_metric, input_summaries};
use crate::cli::ReportArgs;
use crate::data::{GroupLabel, load_pair, resolve_metrics, series_for};
use crate::model::{AnalysisReport, MetricReport, ReportSummary};
use crate::util::{now_utc_string, write_json_pretty};

const REPORT_VERSION: u32 = 1;

pub fn run(args: ReportArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;
    let settings = AnalysisSettings {
        alpha: args.alpha,
        confidence: args.confidence,
        seed: args.seed,
        resamples: args.resamples,
        target_power: args.target_power,
    };

    let inputs = input_summaries(&control, &test)?;

    let mut metric_reports = Vec::new();
    for metric in resolve_metrics(&args.metrics) {
        let series = series_for(&control, &test, metric);
        let report = analyze_metric(&series, &settings)
            .with_context(|| format!("analysis failed for {metric}"))?;
        info!(
            metric = %metric,
            welch_p = report.tests.welch.p_value,
            mann_whitney_p = report.tests.mann_whitney.p_value,
            cohen_d = report.effects.cohen_d,
            power = report.power.power,
            "metric analyzed"
        );
        metric_reports.push(report);
    }

    let significant_metrics: Vec<String> = metric_reports
        .iter()
        .filter(|m| m.tests.welch_significant && m.tests.mann_whitney_significant)
        .map(|m| m.metric.to_string())
        .collect();
    let underpowered_metrics: Vec<String> = metric_reports
        .iter()
        .filter(|m| !m.power.adequate)
        .map(|m| m.metric.to_string())
        .collect();

    let status = if significant_metrics.is_empty() {
        "no_significant_differences"
    } else {
        "significant_differences"
    };

    let conclusions: Vec<String> = metric_reports
        .iter()
        .map(|m| m.conclusion.clone())
        .collect();
    let recommendations = build_recommendations(&metric_reports);

    let report = AnalysisReport {
        report_version: REPORT_VERSION,
        generated_at: now_utc_string(),
        alpha: settings.alpha,
        confidence: settings.confidence,
        resamples: settings.resamples,
        seed: settings.seed,
        inputs,
        status: status.to_string(),
        summary: ReportSummary {
            metrics_analyzed: metric_reports.len(),
            significant_metrics,
            underpowered_metrics,
        },
        metrics: metric_reports,
        conclusions,
        recommendations,
    };

    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| args.out_dir.join("analysis_report.json"));
    write_json_pretty(&report_path, &report)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Status: {}", report.status)?;
    writeln!(output)?;
    writeln!(output, "Conclusions:")?;
    for conclusion in &report.conclusions {
        writeln!(output, "- {conclusion}")?;
    }
    writeln!(output)?;
    writeln!(output, "Recommendations:")?;
    for recommendation in &report.recommendations {
        writeln!(output, "- {recommendation}")?;
    }
    output.flush()?;

    info!(report_path = %report_path.display(), "analysis report written");

    Ok(())
}

fn build_recommendations(metric_reports: &[MetricReport]) -> Vec<String> {
    let mut recommendations = Vec::new();

    for report in metric_reports {
        let significant = report.tests.welch_significant && report.tests.mann_whitney_significant;
        if significant {
            let test_leads = (report.summary.test.mean > report.summary.control.mean)
                == report.metric.higher_is_better();
            let leader = if test_leads {
                GroupLabel::Test
            } else {
                GroupLabel::Control
            };
            recommendations.push(format!(
                "{}: the {leader} campaign leads; weight the next iteration toward it",
                report.metric
            ));
        }

        if !report.power.adequate {
            if let Some(solution) = &report.power.required_n {
                recommendations.push(format!(
                    "{}: underpowered at the observed effect; collect about {} records per group before deciding",
                    report.metric, solution.n_per_group
                ));
            }
        }
    }

    if metric_reports
        .iter()
        .all(|m| !(m.tests.welch_significant && m.tests.mann_whitney_significant))
    {
        recommendations.push(
            "no metric separates the campaigns; extend the experiment window or increase traffic"
                .to_string(),
        );
    }

    recommendations
}
