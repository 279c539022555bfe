use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::MetricKind;

#[derive(Parser, Debug)]
#[command(
    name = "ablab",
    version,
    about = "Local A/B campaign analysis: metrics, diagnostics, tests, power, plots"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inspect(InspectArgs),
    Summary(SummaryArgs),
    Diagnose(DiagnoseArgs),
    Test(TestArgs),
    Power(PowerArgs),
    Report(ReportArgs),
    Plot(PlotArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    #[arg(long, default_value = "control_group.csv")]
    pub control: PathBuf,

    #[arg(long = "test-file", default_value = "test_group.csv")]
    pub test_file: PathBuf,

    #[arg(long, default_value = ";")]
    pub delimiter: String,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, default_value = ".ablab")]
    pub out_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 10_000)]
    pub resamples: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PowerArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    #[arg(long, default_value_t = 0.80)]
    pub target_power: f64,

    #[arg(long)]
    pub effect_size: Option<f64>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, default_value = ".ablab")]
    pub out_dir: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 10_000)]
    pub resamples: usize,

    #[arg(long, default_value_t = 0.80)]
    pub target_power: f64,
}

#[derive(Args, Debug, Clone)]
pub struct PlotArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, default_value = ".ablab/plots")]
    pub out_dir: PathBuf,

    #[arg(long = "metric")]
    pub metrics: Vec<MetricKind>,

    #[arg(long, default_value_t = 0.05)]
    pub alpha: f64,

    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 10_000)]
    pub resamples: usize,
}
