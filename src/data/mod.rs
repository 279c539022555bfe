use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cli::InputArgs;

mod metrics;

pub use self::metrics::{MetricSeries, metric_value, series_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLabel {
    Control,
    Test,
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => write!(f, "control"),
            Self::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Ctr,
    Cr,
    BounceRate,
    Arpu,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Ctr,
        MetricKind::Cr,
        MetricKind::BounceRate,
        MetricKind::Arpu,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Ctr => "CTR",
            Self::Cr => "CR",
            Self::BounceRate => "Bounce Rate",
            Self::Arpu => "ARPU",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Ctr | Self::Cr | Self::BounceRate => "%",
            Self::Arpu => "USD/user",
        }
    }

    /// Whether a larger value is the desirable direction (bounce rate is
    /// the one inverted metric).
    pub fn higher_is_better(self) -> bool {
        !matches!(self, Self::BounceRate)
    }

    /// Stable lowercase name for artifact file names.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Ctr => "ctr",
            Self::Cr => "cr",
            Self::BounceRate => "bounce_rate",
            Self::Arpu => "arpu",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Expands an empty `--metric` selection to every metric.
pub fn resolve_metrics(selection: &[MetricKind]) -> Vec<MetricKind> {
    if selection.is_empty() {
        MetricKind::ALL.to_vec()
    } else {
        let mut seen = Vec::new();
        for metric in selection {
            if !seen.contains(metric) {
                seen.push(*metric);
            }
        }
        seen
    }
}

#[derive(Debug, Clone)]
pub struct CampaignRecord {
    pub campaign: String,
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: u64,
    pub reach: u64,
    pub website_clicks: u64,
    pub searches: u64,
    pub view_content: u64,
    pub add_to_cart: u64,
    pub purchases: u64,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub group: GroupLabel,
    pub source: PathBuf,
    pub records: Vec<CampaignRecord>,
    pub rows_dropped: usize,
}

impl Dataset {
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|r| r.date).min()?;
        let last = self.records.iter().map(|r| r.date).max()?;
        Some((first, last))
    }
}

struct ColumnIndex {
    campaign: usize,
    date: usize,
    spend: usize,
    impressions: usize,
    reach: usize,
    website_clicks: usize,
    searches: usize,
    view_content: usize,
    add_to_cart: usize,
    purchases: usize,
}

pub fn delimiter_byte(raw: &str) -> Result<u8> {
    let bytes = raw.as_bytes();
    if bytes.len() != 1 {
        bail!("delimiter must be a single byte, got {raw:?}");
    }
    Ok(bytes[0])
}

pub fn load_pair(input: &InputArgs) -> Result<(Dataset, Dataset)> {
    let delimiter = delimiter_byte(&input.delimiter)?;
    let control = load_dataset(&input.control, delimiter, GroupLabel::Control)?;
    let test = load_dataset(&input.test_file, delimiter, GroupLabel::Test)?;
    Ok((control, test))
}

pub fn load_dataset(path: &Path, delimiter: u8, group: GroupLabel) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open csv file: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read csv headers: {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<String>>();

    let columns = resolve_columns(&headers)
        .with_context(|| format!("unrecognized csv schema: {}", path.display()))?;

    let mut records = Vec::new();
    let mut rows_dropped = 0_usize;

    for (index, row) in reader.records().enumerate() {
        let line = index + 2;
        let row = row.with_context(|| format!("failed to read {} line {line}", path.display()))?;

        match parse_record(&row, &columns)
            .with_context(|| format!("malformed record at {} line {line}", path.display()))?
        {
            Some(record) => records.push(record),
            None => {
                rows_dropped += 1;
                warn!(group = %group, line, "dropping row with missing fields");
            }
        }
    }

    if records.is_empty() {
        bail!(
            "no usable records in {} ({} rows dropped)",
            path.display(),
            rows_dropped
        );
    }

    info!(
        group = %group,
        path = %path.display(),
        rows = records.len(),
        dropped = rows_dropped,
        "loaded dataset"
    );

    Ok(Dataset {
        group,
        source: path.to_path_buf(),
        records,
        rows_dropped,
    })
}

/// Lowercases a header and strips everything outside `[a-z0-9]`, so
/// `# of Impressions` and `impressions` resolve to the same column.
fn canonical_header(raw: &str, strip: &Regex) -> String {
    strip.replace_all(&raw.to_lowercase(), "").into_owned()
}

fn resolve_columns(headers: &[String]) -> Result<ColumnIndex> {
    let strip = Regex::new("[^a-z0-9]").expect("static pattern");
    let canonical = headers
        .iter()
        .map(|h| canonical_header(h, &strip))
        .collect::<Vec<String>>();

    let find = |keyword: &str| -> Result<usize> {
        canonical
            .iter()
            .position(|h| h.contains(keyword))
            .with_context(|| format!("no column matching {keyword:?} in {headers:?}"))
    };

    Ok(ColumnIndex {
        campaign: find("campaign")?,
        date: find("date")?,
        spend: find("spend")?,
        impressions: find("impression")?,
        reach: find("reach")?,
        website_clicks: find("click")?,
        searches: find("search")?,
        view_content: find("viewcontent")?,
        add_to_cart: find("addtocart")?,
        purchases: find("purchase")?,
    })
}

fn parse_record(row: &csv::StringRecord, columns: &ColumnIndex) -> Result<Option<CampaignRecord>> {
    let field = |index: usize| row.get(index).unwrap_or("").trim();

    let required = [
        columns.campaign,
        columns.date,
        columns.spend,
        columns.impressions,
        columns.reach,
        columns.website_clicks,
        columns.searches,
        columns.view_content,
        columns.add_to_cart,
        columns.purchases,
    ];
    if required.iter().any(|&index| field(index).is_empty()) {
        return Ok(None);
    }

    Ok(Some(CampaignRecord {
        campaign: field(columns.campaign).to_string(),
        date: parse_date(field(columns.date))?,
        spend: parse_f64(field(columns.spend), "spend")?,
        impressions: parse_u64(field(columns.impressions), "impressions")?,
        reach: parse_u64(field(columns.reach), "reach")?,
        website_clicks: parse_u64(field(columns.website_clicks), "website clicks")?,
        searches: parse_u64(field(columns.searches), "searches")?,
        view_content: parse_u64(field(columns.view_content), "view content")?,
        add_to_cart: parse_u64(field(columns.add_to_cart), "add to cart")?,
        purchases: parse_u64(field(columns.purchases), "purchases")?,
    }))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%d.%m.%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .with_context(|| format!("unparseable date {raw:?}"))
}

fn parse_f64(raw: &str, name: &str) -> Result<f64> {
    let value = raw
        .parse::<f64>()
        .with_context(|| format!("unparseable {name} value {raw:?}"))?;
    if !value.is_finite() {
        bail!("non-finite {name} value {raw:?}");
    }
    Ok(value)
}

fn parse_u64(raw: &str, name: &str) -> Result<u64> {
    raw.parse::<u64>()
        .with_context(|| format!("unparseable {name} value {raw:?}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    pub(crate) const HEADER: &str = "Campaign Name;Date;Spend [USD];# of Impressions;Reach;# of Website Clicks;# of Searches;# of View Content;# of Add to Cart;# of Purchase";

    pub(crate) fn write_csv(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "{HEADER}").expect("header");
        for row in rows {
            writeln!(file, "{row}").expect("row");
        }
        file.flush().expect("flush");
        file
    }

    #[test]
    fn loads_semicolon_csv_with_decorated_headers() {
        let file = write_csv(&[
            "Control Campaign;1.08.2019;2280;82702;56930;7016;2290;2159;1819;618",
            "Control Campaign;2.08.2019;1757;121040;102513;8110;2033;1841;1219;511",
        ]);

        let dataset = load_dataset(file.path(), b';', GroupLabel::Control).expect("load");
        assert_eq!(dataset.records.len(), 2);
        assert_eq!(dataset.rows_dropped, 0);
        assert_eq!(dataset.records[0].impressions, 82702);
        assert_eq!(dataset.records[0].purchases, 618);
        assert_eq!(
            dataset.records[0].date,
            NaiveDate::from_ymd_opt(2019, 8, 1).expect("date")
        );
    }

    #[test]
    fn drops_rows_with_missing_fields() {
        let file = write_csv(&[
            "Control Campaign;1.08.2019;2280;82702;56930;7016;2290;2159;1819;618",
            "Control Campaign;5.08.2019;;;;;;;;",
        ]);

        let dataset = load_dataset(file.path(), b';', GroupLabel::Control).expect("load");
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.rows_dropped, 1);
    }

    #[test]
    fn rejects_file_with_no_usable_records() {
        let file = write_csv(&["Control Campaign;5.08.2019;;;;;;;;"]);
        let error = load_dataset(file.path(), b';', GroupLabel::Control).unwrap_err();
        assert!(error.to_string().contains("no usable records"));
    }

    #[test]
    fn rejects_unknown_schema() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "a;b;c").expect("header");
        writeln!(file, "1;2;3").expect("row");
        file.flush().expect("flush");

        let error = load_dataset(file.path(), b';', GroupLabel::Test).unwrap_err();
        assert!(format!("{error:#}").contains("unrecognized csv schema"));
    }

    #[test]
    fn malformed_numbers_are_errors_not_drops() {
        let file = write_csv(&[
            "Control Campaign;1.08.2019;2280;not-a-number;56930;7016;2290;2159;1819;618",
        ]);
        let error = load_dataset(file.path(), b';', GroupLabel::Control).unwrap_err();
        assert!(format!("{error:#}").contains("impressions"));
    }

    #[test]
    fn accepts_iso_dates_and_plain_headers() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "campaign;date;spend;impressions;reach;website clicks;searches;view content;add to cart;purchases"
        )
        .expect("header");
        writeln!(file, "Test Campaign;2019-08-01;1500;50000;40000;6000;1500;1200;900;300")
            .expect("row");
        file.flush().expect("flush");

        let dataset = load_dataset(file.path(), b';', GroupLabel::Test).expect("load");
        assert_eq!(dataset.records[0].spend, 1500.0);
    }

    #[test]
    fn delimiter_must_be_single_byte() {
        assert!(delimiter_byte(";;").is_err());
        assert_eq!(delimiter_byte(",").expect("byte"), b',');
    }

    #[test]
    fn resolve_metrics_defaults_to_all_and_deduplicates() {
        assert_eq!(resolve_metrics(&[]), MetricKind::ALL.to_vec());
        assert_eq!(
            resolve_metrics(&[MetricKind::Cr, MetricKind::Cr, MetricKind::Ctr]),
            vec![MetricKind::Cr, MetricKind::Ctr]
        );
    }
}
