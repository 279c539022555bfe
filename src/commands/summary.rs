use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::SummaryArgs;
use crate::data::{MetricKind, load_pair, resolve_metrics, series_for};
use crate::stats::{Describe, describe};
use crate::util::now_utc_string;

#[derive(Debug, Serialize)]
struct MetricSummary {
    metric: MetricKind,
    unit: &'static str,
    control: Describe,
    test: Describe,
    control_skipped: usize,
    test_skipped: usize,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    generated_at: String,
    metrics: Vec<MetricSummary>,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;

    let mut summaries = Vec::new();
    for metric in resolve_metrics(&args.metrics) {
        let series = series_for(&control, &test, metric);
        summaries.push(MetricSummary {
            metric,
            unit: metric.unit(),
            control: describe(&series.control)
                .with_context(|| format!("not enough control data for {metric}"))?,
            test: describe(&series.test)
                .with_context(|| format!("not enough test data for {metric}"))?,
            control_skipped: series.control_skipped,
            test_skipped: series.test_skipped,
        });
    }

    let response = SummaryResponse {
        generated_at: now_utc_string(),
        metrics: summaries,
    };

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

fn write_json_response(response: &SummaryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize summary json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &SummaryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Average metrics")?;
    writeln!(output, "{:<18} {:>12} {:>12}", "metric", "control", "test")?;
    for summary in &response.metrics {
        writeln!(
            output,
            "{:<18} {:>12.4} {:>12.4}",
            format!("{} ({})", summary.metric, summary.unit),
            summary.control.mean,
            summary.test.mean,
        )?;
    }

    writeln!(output)?;
    writeln!(output, "Summary statistics")?;
    writeln!(
        output,
        "{:<18} {:<8} {:>4} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "metric", "group", "n", "mean", "std", "min", "q1", "median", "q3", "max"
    )?;
    for summary in &response.metrics {
        for (group, stats) in [("control", &summary.control), ("test", &summary.test)] {
            writeln!(
                output,
                "{:<18} {:<8} {:>4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                format!("{} ({})", summary.metric, summary.unit),
                group,
                stats.n,
                stats.mean,
                stats.std,
                stats.min,
                stats.q1,
                stats.median,
                stats.q3,
                stats.max,
            )?;
        }
        if summary.control_skipped + summary.test_skipped > 0 {
            writeln!(
                output,
                "  ({} skipped: control {}, test {})",
                summary.metric, summary.control_skipped, summary.test_skipped
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
