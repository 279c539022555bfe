//! SVG chart rendering: overlaid metric histograms, confidence interval
//! error bars, effect size bars, the power curve, and bootstrap mean
//! distributions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use tracing::info;

use crate::analysis::normal_ci;
use crate::cli::PlotArgs;
use crate::data::{MetricSeries, load_pair, resolve_metrics, series_for};
use crate::stats::bootstrap::bootstrap_mean_ci;
use crate::stats::effect::{cliffs_delta, cohen_d};
use crate::stats::power::power;
use crate::util::ensure_directory;

const CHART_SIZE: (u32, u32) = (800, 600);

pub fn run(args: PlotArgs) -> Result<()> {
    let (control, test) = load_pair(&args.input)?;
    ensure_directory(&args.out_dir)?;

    let mut effect_entries = Vec::new();
    let mut power_entries = Vec::new();
    let mut written = Vec::new();

    for metric in resolve_metrics(&args.metrics) {
        let series = series_for(&control, &test, metric);

        written.push(render_histogram(&args.out_dir, &series)?);
        written.push(render_interval_plot(&args.out_dir, &series, args.confidence)?);
        written.push(render_bootstrap_plot(
            &args.out_dir,
            &series,
            args.resamples,
            args.confidence,
            args.seed,
        )?);

        let d = cohen_d(&series.control, &series.test)
            .with_context(|| format!("cohen's d failed for {metric}"))?;
        let delta = cliffs_delta(&series.control, &series.test)
            .with_context(|| format!("cliff's delta failed for {metric}"))?;
        effect_entries.push((metric.label().to_string(), d, delta));
        power_entries.push((
            metric.label().to_string(),
            d.abs(),
            series.control.len() as f64,
            series.test.len() as f64 / series.control.len() as f64,
        ));
    }

    written.push(render_effect_sizes(&args.out_dir, &effect_entries)?);
    written.push(render_power_curves(&args.out_dir, &power_entries, args.alpha)?);

    for path in &written {
        info!(path = %path.display(), "chart written");
    }

    Ok(())
}

fn render_histogram(out_dir: &Path, series: &MetricSeries) -> Result<PathBuf> {
    let path = out_dir.join(format!("{}_histogram.svg", series.metric.slug()));
    let (bins, max_density, range) = density_bins(&series.control, &series.test, 12);

    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} distribution, control vs test", series.metric),
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(range.0..range.1, 0.0..max_density * 1.1)?;
    chart
        .configure_mesh()
        .x_desc(format!("{} ({})", series.metric, series.metric.unit()))
        .y_desc("Density")
        .draw()?;

    chart
        .draw_series(bins.iter().map(|bin| {
            Rectangle::new([(bin.x0, 0.0), (bin.x1, bin.control_density)], BLUE.mix(0.45).filled())
        }))?
        .label("Control")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.mix(0.45).filled()));
    chart
        .draw_series(bins.iter().map(|bin| {
            Rectangle::new([(bin.x0, 0.0), (bin.x1, bin.test_density)], RED.mix(0.45).filled())
        }))?
        .label("Test")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], RED.mix(0.45).filled()));

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;
    Ok(path.clone())
}

fn render_interval_plot(out_dir: &Path, series: &MetricSeries, confidence: f64) -> Result<PathBuf> {
    let path = out_dir.join(format!("{}_confidence.svg", series.metric.slug()));
    let control_ci = normal_ci(&series.control, confidence)?;
    let test_ci = normal_ci(&series.test, confidence)?;

    let low = control_ci.lower.min(test_ci.lower);
    let high = control_ci.upper.max(test_ci.upper);
    let pad = (high - low).max(1e-9) * 0.2;

    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "{} mean with {:.0}% confidence interval",
                series.metric,
                confidence * 100.0
            ),
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..3.0, (low - pad)..(high + pad))?;
    chart
        .configure_mesh()
        .x_labels(4)
        .x_label_formatter(&|x: &f64| {
            if (x - 1.0).abs() < 0.25 {
                "Control".to_string()
            } else if (x - 2.0).abs() < 0.25 {
                "Test".to_string()
            } else {
                String::new()
            }
        })
        .y_desc(format!("{} ({})", series.metric, series.metric.unit()))
        .draw()?;

    chart.draw_series(std::iter::once(ErrorBar::new_vertical(
        1.0,
        control_ci.lower,
        control_ci.mean,
        control_ci.upper,
        BLUE.filled(),
        12,
    )))?;
    chart.draw_series(std::iter::once(ErrorBar::new_vertical(
        2.0,
        test_ci.lower,
        test_ci.mean,
        test_ci.upper,
        RED.filled(),
        12,
    )))?;

    root.present()?;
    Ok(path.clone())
}

fn render_bootstrap_plot(
    out_dir: &Path,
    series: &MetricSeries,
    resamples: usize,
    confidence: f64,
    seed: u64,
) -> Result<PathBuf> {
    let path = out_dir.join(format!("{}_bootstrap.svg", series.metric.slug()));
    let control = bootstrap_mean_ci(&series.control, resamples, confidence, seed)?;
    let test = bootstrap_mean_ci(&series.test, resamples, confidence, seed.wrapping_add(1))?;

    let (bins, max_density, range) = density_bins(&control.means, &test.means, 50);

    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} bootstrap means and interval bounds", series.metric),
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(range.0..range.1, 0.0..max_density * 1.1)?;
    chart
        .configure_mesh()
        .x_desc(format!("Bootstrap mean ({})", series.metric.unit()))
        .y_desc("Density")
        .draw()?;

    chart
        .draw_series(bins.iter().map(|bin| {
            Rectangle::new([(bin.x0, 0.0), (bin.x1, bin.control_density)], BLUE.mix(0.45).filled())
        }))?
        .label("Control")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.mix(0.45).filled()));
    chart
        .draw_series(bins.iter().map(|bin| {
            Rectangle::new([(bin.x0, 0.0), (bin.x1, bin.test_density)], RED.mix(0.45).filled())
        }))?
        .label("Test")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], RED.mix(0.45).filled()));

    let top = max_density * 1.05;
    for bound in [control.lower, control.upper] {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(bound, 0.0), (bound, top)],
            BLUE.stroke_width(2),
        )))?;
    }
    for bound in [test.lower, test.upper] {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(bound, 0.0), (bound, top)],
            RED.stroke_width(2),
        )))?;
    }

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;
    Ok(path.clone())
}

fn render_effect_sizes(out_dir: &Path, entries: &[(String, f64, f64)]) -> Result<PathBuf> {
    let path = out_dir.join("effect_sizes.svg");

    let mut low = 0.0_f64;
    let mut high = 0.0_f64;
    for (_, d, delta) in entries {
        low = low.min(*d).min(*delta);
        high = high.max(*d).max(*delta);
    }
    let pad = (high - low).max(0.5) * 0.15;

    let labels: Vec<String> = entries.iter().map(|(label, _, _)| label.clone()).collect();
    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Effect sizes by metric", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            -0.5..entries.len() as f64 - 0.5,
            (low - pad)..(high + pad),
        )?;
    chart
        .configure_mesh()
        .x_labels(entries.len().max(1))
        .x_label_formatter(&move |x: &f64| {
            if *x < -0.25 {
                return String::new();
            }
            let index = x.round() as usize;
            if (x - index as f64).abs() > 0.25 {
                return String::new();
            }
            labels.get(index).cloned().unwrap_or_default()
        })
        .y_desc("Effect size")
        .draw()?;

    chart
        .draw_series(entries.iter().enumerate().map(|(i, (_, d, _))| {
            let x = i as f64;
            Rectangle::new([(x - 0.35, 0.0), (x - 0.05, *d)], BLUE.filled())
        }))?
        .label("Cohen's d")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], BLUE.filled()));
    chart
        .draw_series(entries.iter().enumerate().map(|(i, (_, _, delta))| {
            let x = i as f64;
            Rectangle::new([(x + 0.05, 0.0), (x + 0.35, *delta)], GREEN.filled())
        }))?
        .label("Cliff's delta")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], GREEN.filled()));

    chart.draw_series(std::iter::once(PathElement::new(
        vec![(-0.5, 0.0), (entries.len() as f64 - 0.5, 0.0)],
        BLACK.stroke_width(1),
    )))?;

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;
    Ok(path.clone())
}

fn render_power_curves(
    out_dir: &Path,
    entries: &[(String, f64, f64, f64)],
    alpha: f64,
) -> Result<PathBuf> {
    let path = out_dir.join("power_curve.svg");

    let root = SVGBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Power by effect size at the observed sample sizes", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..1.5_f64, 0.0..1.05_f64)?;
    chart
        .configure_mesh()
        .x_desc("Effect size (Cohen's d)")
        .y_desc("Power")
        .draw()?;

    for (index, (label, observed, n1, ratio)) in entries.iter().enumerate() {
        let mut points = Vec::with_capacity(100);
        for step in 1..=100 {
            let effect = step as f64 * 0.015;
            points.push((effect, power(effect, *n1, *ratio, alpha)?));
        }
        let color = Palette99::pick(index);
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(label.clone())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], Palette99::pick(index).stroke_width(2))
            });

        let clamped = observed.min(1.5);
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(clamped, 0.0), (clamped, 1.0)],
            color.stroke_width(1),
        )))?;
    }

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(0.0, 0.8), (1.5, 0.8)],
            RED.stroke_width(1),
        )))?
        .label("80% power")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(1)));

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;
    Ok(path.clone())
}

struct DensityBin {
    x0: f64,
    x1: f64,
    control_density: f64,
    test_density: f64,
}

fn density_bins(control: &[f64], test: &[f64], count: usize) -> (Vec<DensityBin>, f64, (f64, f64)) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in control.iter().chain(test) {
        min = min.min(*value);
        max = max.max(*value);
    }
    if !min.is_finite() || max - min <= 0.0 {
        let center = if min.is_finite() { min } else { 0.0 };
        min = center - 0.5;
        max = center + 0.5;
    }

    let width = (max - min) / count as f64;
    let mut control_counts = vec![0_usize; count];
    let mut test_counts = vec![0_usize; count];
    for (values, counts) in [(control, &mut control_counts), (test, &mut test_counts)] {
        for value in values {
            let index = (((value - min) / width) as usize).min(count - 1);
            counts[index] += 1;
        }
    }

    let mut bins = Vec::with_capacity(count);
    let mut max_density = 0.0_f64;
    for index in 0..count {
        let control_density = if control.is_empty() {
            0.0
        } else {
            control_counts[index] as f64 / (control.len() as f64 * width)
        };
        let test_density = if test.is_empty() {
            0.0
        } else {
            test_counts[index] as f64 / (test.len() as f64 * width)
        };
        max_density = max_density.max(control_density).max(test_density);
        bins.push(DensityBin {
            x0: min + index as f64 * width,
            x1: min + (index + 1) as f64 * width,
            control_density,
            test_density,
        });
    }

    (bins, max_density.max(1e-9), (min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetricKind;

    fn series() -> MetricSeries {
        MetricSeries {
            metric: MetricKind::Ctr,
            control: (0..30).map(|i| 5.0 + (i as f64 * 0.73).sin()).collect(),
            test: (0..30).map(|i| 9.0 + (i as f64 * 0.41).cos() * 2.0).collect(),
            control_skipped: 0,
            test_skipped: 0,
        }
    }

    fn assert_svg(path: &Path) {
        let contents = std::fs::read_to_string(path).expect("chart file");
        assert!(contents.contains("<svg"), "not an svg: {}", path.display());
    }

    #[test]
    fn histogram_and_interval_charts_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let series = series();

        assert_svg(&render_histogram(dir.path(), &series).expect("histogram"));
        assert_svg(&render_interval_plot(dir.path(), &series, 0.95).expect("intervals"));
        assert_svg(
            &render_bootstrap_plot(dir.path(), &series, 200, 0.95, 42).expect("bootstrap"),
        );
    }

    #[test]
    fn overview_charts_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");

        let effects = vec![
            ("CTR".to_string(), -1.02, -0.6),
            ("CR".to_string(), 0.3, 0.156),
        ];
        assert_svg(&render_effect_sizes(dir.path(), &effects).expect("effects"));

        let powers = vec![
            ("CTR".to_string(), 1.02, 29.0, 30.0 / 29.0),
            ("CR".to_string(), 0.2, 29.0, 30.0 / 29.0),
        ];
        assert_svg(&render_power_curves(dir.path(), &powers, 0.05).expect("power"));
    }

    #[test]
    fn density_bins_cover_the_range_and_normalize() {
        let control = vec![1.0, 2.0, 3.0, 4.0];
        let test = vec![2.0, 3.0];
        let (bins, max_density, range) = density_bins(&control, &test, 4);

        assert_eq!(bins.len(), 4);
        assert_eq!(range, (1.0, 4.0));
        assert!(max_density > 0.0);

        let control_mass: f64 = bins
            .iter()
            .map(|bin| bin.control_density * (bin.x1 - bin.x0))
            .sum();
        assert!((control_mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn density_bins_handle_constant_data() {
        let (bins, _, range) = density_bins(&[3.0, 3.0], &[3.0], 5);
        assert_eq!(bins.len(), 5);
        assert!(range.0 < 3.0 && range.1 > 3.0);
    }
}
