//! Derived per-record engagement metrics.
//!
//! CTR and CR come straight from the campaign counters; Bounce Rate and
//! ARPU are the placeholder definitions the source analysis uses (bounce
//! as the CTR complement, ARPU as spend over reach).

use tracing::warn;

use super::{CampaignRecord, Dataset, MetricKind};

#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub metric: MetricKind,
    pub control: Vec<f64>,
    pub test: Vec<f64>,
    pub control_skipped: usize,
    pub test_skipped: usize,
}

/// Metric value for one record, `None` when the denominator is zero.
pub fn metric_value(record: &CampaignRecord, metric: MetricKind) -> Option<f64> {
    match metric {
        MetricKind::Ctr => ratio(record.website_clicks, record.impressions).map(|r| r * 100.0),
        MetricKind::Cr => ratio(record.purchases, record.website_clicks).map(|r| r * 100.0),
        MetricKind::BounceRate => metric_value(record, MetricKind::Ctr).map(|ctr| 100.0 - ctr),
        MetricKind::Arpu => {
            if record.reach == 0 {
                None
            } else {
                Some(record.spend / record.reach as f64)
            }
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

pub fn series_for(control: &Dataset, test: &Dataset, metric: MetricKind) -> MetricSeries {
    let (control_values, control_skipped) = extract(control, metric);
    let (test_values, test_skipped) = extract(test, metric);

    if control_skipped + test_skipped > 0 {
        warn!(
            metric = %metric,
            control_skipped,
            test_skipped,
            "skipped records with zero denominators"
        );
    }

    MetricSeries {
        metric,
        control: control_values,
        test: test_values,
        control_skipped,
        test_skipped,
    }
}

fn extract(dataset: &Dataset, metric: MetricKind) -> (Vec<f64>, usize) {
    let mut values = Vec::with_capacity(dataset.records.len());
    let mut skipped = 0_usize;
    for record in &dataset.records {
        match metric_value(record, metric) {
            Some(value) => values.push(value),
            None => skipped += 1,
        }
    }
    (values, skipped)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::GroupLabel;

    fn record(spend: f64, impressions: u64, reach: u64, clicks: u64, purchases: u64) -> CampaignRecord {
        CampaignRecord {
            campaign: "Test Campaign".to_string(),
            date: NaiveDate::from_ymd_opt(2019, 8, 1).expect("date"),
            spend,
            impressions,
            reach,
            website_clicks: clicks,
            searches: 0,
            view_content: 0,
            add_to_cart: 0,
            purchases,
        }
    }

    #[test]
    fn ctr_and_cr_are_percentages() {
        let r = record(100.0, 10_000, 8_000, 500, 50);
        assert_eq!(metric_value(&r, MetricKind::Ctr), Some(5.0));
        assert_eq!(metric_value(&r, MetricKind::Cr), Some(10.0));
    }

    #[test]
    fn bounce_rate_complements_ctr() {
        let r = record(100.0, 10_000, 8_000, 500, 50);
        assert_eq!(metric_value(&r, MetricKind::BounceRate), Some(95.0));
    }

    #[test]
    fn arpu_divides_spend_by_reach() {
        let r = record(200.0, 10_000, 8_000, 500, 50);
        assert_eq!(metric_value(&r, MetricKind::Arpu), Some(0.025));
    }

    #[test]
    fn zero_denominators_yield_none() {
        let no_impressions = record(100.0, 0, 8_000, 500, 50);
        assert_eq!(metric_value(&no_impressions, MetricKind::Ctr), None);
        assert_eq!(metric_value(&no_impressions, MetricKind::BounceRate), None);

        let no_clicks = record(100.0, 10_000, 8_000, 0, 0);
        assert_eq!(metric_value(&no_clicks, MetricKind::Cr), None);

        let no_reach = record(100.0, 10_000, 0, 500, 50);
        assert_eq!(metric_value(&no_reach, MetricKind::Arpu), None);
    }

    #[test]
    fn series_counts_skipped_records_per_group() {
        let control = Dataset {
            group: GroupLabel::Control,
            source: "control.csv".into(),
            records: vec![
                record(100.0, 10_000, 8_000, 500, 50),
                record(100.0, 10_000, 8_000, 0, 0),
            ],
            rows_dropped: 0,
        };
        let test = Dataset {
            group: GroupLabel::Test,
            source: "test.csv".into(),
            records: vec![record(150.0, 12_000, 9_000, 900, 60)],
            rows_dropped: 0,
        };

        let series = series_for(&control, &test, MetricKind::Cr);
        assert_eq!(series.control.len(), 1);
        assert_eq!(series.control_skipped, 1);
        assert_eq!(series.test.len(), 1);
        assert_eq!(series.test_skipped, 0);
    }
}
