use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::PowerArgs;
use crate::data::{MetricKind, load_pair, resolve_metrics, series_for};
use crate::stats::effect::cohen_d;
use crate::stats::power::{SampleSizeSolution, power, solve_sample_size};
use crate::util::now_utc_string;

#[derive(Debug, Serialize)]
struct MetricPower {
    metric: MetricKind,
    effect_size: f64,
    effect_size_source: String,
    n_control: usize,
    n_test: usize,
    power: f64,
    adequate: bool,
    required_n: Option<SampleSizeSolution>,
}

#[derive(Debug, Serialize)]
struct PowerResponse {
    generated_at: String,
    alpha: f64,
    target_power: f64,
    metrics: Vec<MetricPower>,
}

pub fn run(args: PowerArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;

    let mut entries = Vec::new();
    for metric in resolve_metrics(&args.metrics) {
        let series = series_for(&control, &test, metric);

        let (effect_size, effect_size_source) = match args.effect_size {
            Some(value) => (value.abs(), "override".to_string()),
            None => {
                let d = cohen_d(&series.control, &series.test)
                    .with_context(|| format!("cohen's d failed for {metric}"))?;
                (d.abs(), "observed".to_string())
            }
        };

        let n_control = series.control.len();
        let n_test = series.test.len();
        let ratio = n_test as f64 / n_control as f64;
        let achieved = power(effect_size, n_control as f64, ratio, args.alpha)
            .with_context(|| format!("power analysis failed for {metric}"))?;

        let required_n = if effect_size > 1e-6 {
            Some(solve_sample_size(effect_size, args.target_power, ratio, args.alpha)?)
        } else {
            None
        };

        entries.push(MetricPower {
            metric,
            effect_size,
            effect_size_source,
            n_control,
            n_test,
            power: achieved,
            adequate: achieved >= args.target_power,
            required_n,
        });
    }

    let response = PowerResponse {
        generated_at: now_utc_string(),
        alpha: args.alpha,
        target_power: args.target_power,
        metrics: entries,
    };

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize power json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "Power analysis (alpha = {}, target power = {})",
        response.alpha, response.target_power
    )?;
    for entry in &response.metrics {
        writeln!(output)?;
        writeln!(
            output,
            "{}: effect size {:.4} ({}), n = {}/{}",
            entry.metric, entry.effect_size, entry.effect_size_source, entry.n_control, entry.n_test
        )?;
        writeln!(
            output,
            "  power = {:.4} ({})",
            entry.power,
            if entry.adequate {
                "adequate"
            } else {
                "below target"
            }
        )?;
        match &entry.required_n {
            Some(solution) => writeln!(
                output,
                "  required n per group for target power: {} ({:.1} fractional)",
                solution.n_per_group, solution.n_fractional
            )?,
            None => writeln!(
                output,
                "  required n per group: not solvable for a near-zero effect size"
            )?,
        }
    }
    output.flush()?;

    Ok(())
}
