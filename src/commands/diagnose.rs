use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::diagnostics_for;
use crate::cli::DiagnoseArgs;
use crate::data::{MetricKind, load_pair, resolve_metrics, series_for};
use crate::model::DiagnosticsBlock;
use crate::stats::hypothesis::TestOutcome;
use crate::util::now_utc_string;

#[derive(Debug, Serialize)]
struct MetricDiagnostics {
    metric: MetricKind,
    diagnostics: DiagnosticsBlock,
}

#[derive(Debug, Serialize)]
struct DiagnoseResponse {
    generated_at: String,
    alpha: f64,
    metrics: Vec<MetricDiagnostics>,
}

pub fn run(args: DiagnoseArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;

    let mut entries = Vec::new();
    for metric in resolve_metrics(&args.metrics) {
        let series = series_for(&control, &test, metric);
        entries.push(MetricDiagnostics {
            metric,
            diagnostics: diagnostics_for(&series.control, &series.test, args.alpha),
        });
    }

    let response = DiagnoseResponse {
        generated_at: now_utc_string(),
        alpha: args.alpha,
        metrics: entries,
    };

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize diagnose json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Distribution diagnostics (alpha = {})", response.alpha)?;
    for entry in &response.metrics {
        let block = &entry.diagnostics;
        writeln!(output)?;
        writeln!(output, "{}", entry.metric)?;
        write_check(
            &mut output,
            "shapiro control",
            block.shapiro_control.as_ref(),
            block.control_normal,
            ("normal", "non-normal"),
        )?;
        write_check(
            &mut output,
            "shapiro test",
            block.shapiro_test.as_ref(),
            block.test_normal,
            ("normal", "non-normal"),
        )?;
        write_check(
            &mut output,
            "levene",
            block.levene.as_ref(),
            block.equal_variances,
            ("equal variances", "unequal variances"),
        )?;
        writeln!(output, "  recommended test: {}", block.recommended_test)?;
        for note in &block.notes {
            writeln!(output, "  note: {note}")?;
        }
    }
    output.flush()?;

    Ok(())
}

fn write_check(
    output: &mut impl Write,
    name: &str,
    outcome: Option<&TestOutcome>,
    verdict: Option<bool>,
    labels: (&str, &str),
) -> Result<()> {
    match (outcome, verdict) {
        (Some(outcome), Some(verdict)) => {
            let label = if verdict { labels.0 } else { labels.1 };
            writeln!(
                output,
                "  {:<16} statistic = {:>8.4}  p = {:.4}  -> {label}",
                name, outcome.statistic, outcome.p_value
            )?;
        }
        _ => writeln!(output, "  {name:<16} unavailable")?,
    }
    Ok(())
}
