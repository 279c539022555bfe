use serde::{Deserialize, Serialize};

use crate::data::{GroupLabel, MetricKind};
use crate::stats::Describe;
use crate::stats::hypothesis::{MannWhitneyOutcome, TestOutcome, WelchOutcome};
use crate::stats::power::SampleSizeSolution;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFileSummary {
    pub group: GroupLabel,
    pub path: String,
    pub sha256: String,
    pub rows: usize,
    pub rows_dropped: usize,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub campaigns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub delimiter: String,
    pub inputs: Vec<InputFileSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummaries {
    pub control: Describe,
    pub test: Describe,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsBlock {
    pub shapiro_control: Option<TestOutcome>,
    pub shapiro_test: Option<TestOutcome>,
    pub levene: Option<TestOutcome>,
    pub control_normal: Option<bool>,
    pub test_normal: Option<bool>,
    pub equal_variances: Option<bool>,
    pub recommended_test: String,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HypothesisBlock {
    pub welch: WelchOutcome,
    pub welch_significant: bool,
    pub mann_whitney: MannWhitneyOutcome,
    pub mann_whitney_significant: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectBlock {
    pub cohen_d: f64,
    pub cohen_magnitude: String,
    pub cliffs_delta: f64,
    pub cliffs_magnitude: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IntervalEstimate {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntervalBlock {
    pub confidence: f64,
    pub control: IntervalEstimate,
    pub test: IntervalEstimate,
    pub analytic_overlap: bool,
    pub bootstrap_control: IntervalEstimate,
    pub bootstrap_test: IntervalEstimate,
    pub bootstrap_overlap: bool,
    pub resamples: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerBlock {
    pub effect_size: f64,
    pub effect_size_source: String,
    pub alpha: f64,
    pub power: f64,
    pub target_power: f64,
    pub adequate: bool,
    pub required_n: Option<SampleSizeSolution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub metric: MetricKind,
    pub unit: String,
    pub control_skipped: usize,
    pub test_skipped: usize,
    pub summary: GroupSummaries,
    pub diagnostics: DiagnosticsBlock,
    pub tests: HypothesisBlock,
    pub effects: EffectBlock,
    pub intervals: IntervalBlock,
    pub power: PowerBlock,
    pub conclusion: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub metrics_analyzed: usize,
    pub significant_metrics: Vec<String>,
    pub underpowered_metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub report_version: u32,
    pub generated_at: String,
    pub alpha: f64,
    pub confidence: f64,
    pub resamples: usize,
    pub seed: u64,
    pub inputs: Vec<InputFileSummary>,
    pub status: String,
    pub summary: ReportSummary,
    pub metrics: Vec<MetricReport>,
    pub conclusions: Vec<String>,
    pub recommendations: Vec<String>,
}
