//! Per-path response-time summaries built from HDR histograms.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::event::{EventKind, EventRecord, Values};
use crate::listener::ValueListener;

/// Directory name used for report files.
pub const REPORT_DIRECTORY_NAME: &str = "load-generator-reports";

/// Per-path report file name.
pub const SUMMARY_REPORT_FILE: &str = "summaryReport.json";

/// Global report file name.
pub const GLOBAL_SUMMARY_REPORT_FILE: &str = "globalSummaryReport.json";

// 1 hour in nanoseconds; slower responses saturate.
const HIGHEST_TRACKABLE_NANOS: u64 = 3_600_000_000_000;
const SIGNIFICANT_DIGITS: u8 = 3;

/// Distribution statistics of elapsed times, in nanoseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectorInformation {
    pub total_count: u64,
    pub min_value: u64,
    pub max_value: u64,
    pub mean: f64,
    pub std_deviation: f64,
    pub value_50: u64,
    pub value_90: u64,
    /// Earliest event timestamp (epoch millis).
    pub start_timestamp: u64,
    /// Latest event timestamp (epoch millis).
    pub end_timestamp: u64,
}

struct Collector {
    histogram: Histogram<u64>,
    start_timestamp: u64,
    end_timestamp: u64,
}

impl Collector {
    fn new() -> CoreResult<Self> {
        let histogram =
            Histogram::new_with_bounds(1, HIGHEST_TRACKABLE_NANOS, SIGNIFICANT_DIGITS)
                .map_err(|e| CoreError::internal(format!("cannot create histogram: {e}")))?;
        Ok(Self {
            histogram,
            start_timestamp: u64::MAX,
            end_timestamp: 0,
        })
    }

    fn record(&mut self, record: &EventRecord) {
        self.histogram.saturating_record(record.time());
        self.start_timestamp = self.start_timestamp.min(record.event_timestamp());
        self.end_timestamp = self.end_timestamp.max(record.event_timestamp());
    }

    fn information(&self) -> CollectorInformation {
        let h = &self.histogram;
        CollectorInformation {
            total_count: h.len(),
            min_value: h.min(),
            max_value: h.max(),
            mean: h.mean(),
            std_deviation: h.stdev(),
            value_50: h.value_at_quantile(0.5),
            value_90: h.value_at_quantile(0.9),
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

/// Summary of a run: one entry per request path plus the global figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Utc>,
    pub per_path: BTreeMap<String, CollectorInformation>,
    pub global: Option<CollectorInformation>,
}

impl SummaryReport {
    /// Writes the per-path and global reports as JSON into `dir`, creating it
    /// if needed. Returns the two file paths.
    pub fn write_json(&self, dir: impl AsRef<Path>) -> CoreResult<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let summary_path = dir.join(SUMMARY_REPORT_FILE);
        fs::write(&summary_path, serde_json::to_vec_pretty(&self.per_path)?)?;

        let global_path = dir.join(GLOBAL_SUMMARY_REPORT_FILE);
        fs::write(&global_path, serde_json::to_vec_pretty(&self.global)?)?;

        tracing::info!(
            paths = self.per_path.len(),
            dir = %dir.display(),
            "Wrote summary reports"
        );
        Ok((summary_path, global_path))
    }
}

/// Listener aggregating elapsed times per request path.
pub struct SummaryListener {
    per_path: BTreeMap<String, Collector>,
    global: Collector,
    stopped: bool,
}

impl SummaryListener {
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            per_path: BTreeMap::new(),
            global: Collector::new()?,
            stopped: false,
        })
    }

    /// Adds one already validated record.
    pub fn record(&mut self, record: &EventRecord) -> CoreResult<()> {
        if !self.per_path.contains_key(record.path()) {
            self.per_path
                .insert(record.path().to_string(), Collector::new()?);
        }
        if let Some(collector) = self.per_path.get_mut(record.path()) {
            collector.record(record);
        }
        self.global.record(record);
        Ok(())
    }

    /// Number of responses seen for `path`.
    #[must_use]
    pub fn response_count(&self, path: &str) -> u64 {
        self.per_path.get(path).map_or(0, |c| c.histogram.len())
    }

    #[must_use]
    pub fn report(&self) -> SummaryReport {
        SummaryReport {
            generated_at: Utc::now(),
            per_path: self
                .per_path
                .iter()
                .map(|(path, c)| (path.clone(), c.information()))
                .collect(),
            global: (!self.global.histogram.is_empty()).then(|| self.global.information()),
        }
    }
}

impl ValueListener for SummaryListener {
    fn on_value(&mut self, _kind: EventKind, values: &Values) -> CoreResult<()> {
        if self.stopped {
            return Err(CoreError::invalid_state(
                "summary listener received a value after stop",
            ));
        }
        let record = EventRecord::try_from(values)?;
        self.record(&record)
    }

    fn on_stop(&mut self) -> CoreResult<()> {
        self.stopped = true;
        tracing::debug!(paths = self.per_path.len(), "summary listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn feed(listener: &mut SummaryListener) {
        let values = [
            Values::new(1000, "GET", "/a", 500_000, 200, 10),
            Values::new(1001, "POST", "/b", 750_000, 201, 0),
            Values::new(1002, "GET", "/a", 300_000, 500, 42),
        ];
        for v in &values {
            listener.on_value(EventKind::ResponseTime, v).unwrap();
        }
    }

    #[test]
    fn test_per_path_counts() {
        let mut listener = SummaryListener::new().unwrap();
        feed(&mut listener);

        assert_eq!(listener.response_count("/a"), 2);
        assert_eq!(listener.response_count("/b"), 1);
        assert_eq!(listener.response_count("/c"), 0);
    }

    #[test]
    fn test_report_figures() {
        let mut listener = SummaryListener::new().unwrap();
        feed(&mut listener);
        let report = listener.report();

        let a = &report.per_path["/a"];
        assert_eq!(a.total_count, 2);
        assert_eq!(a.start_timestamp, 1000);
        assert_eq!(a.end_timestamp, 1002);
        // 3 significant digits: values are within 0.1%.
        assert!(a.min_value <= 300_000 && a.min_value >= 299_700);
        assert!(a.max_value >= 500_000 && a.max_value <= 500_500);

        let global = report.global.unwrap();
        assert_eq!(global.total_count, 3);
    }

    #[test]
    fn test_empty_report_has_no_global() {
        let listener = SummaryListener::new().unwrap();
        let report = listener.report();
        assert!(report.per_path.is_empty());
        assert!(report.global.is_none());
    }

    #[test]
    fn test_values_after_stop_rejected() {
        let mut listener = SummaryListener::new().unwrap();
        listener.on_stop().unwrap();
        let err = listener
            .on_value(EventKind::ResponseTime, &Values::new(1, "GET", "/a", 1, 200, 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[test]
    fn test_write_json_reports() {
        let dir = TempDir::new().unwrap();
        let mut listener = SummaryListener::new().unwrap();
        feed(&mut listener);

        let report_dir = dir.path().join(REPORT_DIRECTORY_NAME);
        let (summary, global) = listener.report().write_json(&report_dir).unwrap();

        let per_path: BTreeMap<String, CollectorInformation> =
            serde_json::from_slice(&std::fs::read(summary).unwrap()).unwrap();
        assert_eq!(per_path.len(), 2);

        let global: Option<CollectorInformation> =
            serde_json::from_slice(&std::fs::read(global).unwrap()).unwrap();
        assert_eq!(global.unwrap().total_count, 3);
    }
}
