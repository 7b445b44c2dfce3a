//! File-Tree Statistics
//!
//! Error and timing statistics computed straight from the downloaded
//! `{date}/{appVersion}/{function}/{deviceId}/{batchId}.json` tree, without
//! loading anything into the store first. Simulator records are excluded with
//! the same predicate ingestion uses.

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use crate::aggregate::TimingVerdict;
use crate::ingest::{json_files_under, read_records};
use crate::models::ResultType;
use crate::normalize::is_simulator;
use crate::path_meta::PathMetadata;

/// Trailing run of calendar days ending at `end` (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub end: NaiveDate,
    pub days: u32,
}

impl DayWindow {
    pub fn new(end: NaiveDate, days: u32) -> Self {
        Self { end, days }
    }

    /// Window ending on today's local date
    pub fn ending_today(days: u32) -> Self {
        Self::new(Local::now().date_naive(), days)
    }

    /// Days newest first
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.days as i64).map(move |i| self.end - Duration::days(i))
    }
}

#[derive(Debug, Clone, Default)]
struct TimingSamples {
    js_sum: f64,
    swift_sum: f64,
    count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileTiming {
    pub function: String,
    pub avg_js: f64,
    pub avg_swift: f64,
    pub avg_diff: f64,
    pub samples: u64,
    pub verdict: TimingVerdict,
}

#[derive(Debug, Clone, Default)]
pub struct FileStats {
    pub total_comparisons: u64,
    pub total_errors: u64,
    pub errors_by_day: BTreeMap<String, u64>,
    pub errors_by_function: HashMap<String, u64>,
    pub errors_by_device: HashMap<String, u64>,
    /// App version; the Swift build ships inside it, so this doubles as errors by Swift version
    pub errors_by_version: HashMap<String, u64>,
    pub files_skipped: u64,
    timing: BTreeMap<String, TimingSamples>,
}

impl FileStats {
    /// Fold one raw record into the totals
    pub fn record(&mut self, record: &Value, day: &str, meta: &PathMetadata) {
        if !record.is_object() {
            warn!("Skipping malformed record in batch {}: not an object", meta.batch_id);
            return;
        }
        if is_simulator(record) {
            return;
        }

        self.total_comparisons += 1;

        let js = record.get("jsDuration").and_then(Value::as_f64);
        let swift = record.get("swiftDuration").and_then(Value::as_f64);
        if let (Some(js), Some(swift)) = (js, swift) {
            let t = self.timing.entry(meta.function.clone()).or_default();
            t.js_sum += js;
            t.swift_sum += swift;
            t.count += 1;
        }

        // Absent resultType counts as an error too
        let matching = record
            .get("resultType")
            .and_then(Value::as_str)
            .is_some_and(|r| ResultType::from(r).is_matching());
        if !matching {
            self.total_errors += 1;
            *self.errors_by_day.entry(day.to_string()).or_insert(0) += 1;
            *self.errors_by_function.entry(meta.function.clone()).or_insert(0) += 1;
            *self.errors_by_device.entry(meta.device_id.clone()).or_insert(0) += 1;
            *self.errors_by_version.entry(meta.app_version.clone()).or_insert(0) += 1;
        }
    }

    /// Per-function averages, sorted by function name
    pub fn timing(&self) -> Vec<FileTiming> {
        self.timing
            .iter()
            .filter(|(_, t)| t.count > 0)
            .map(|(function, t)| {
                let avg_js = t.js_sum / t.count as f64;
                let avg_swift = t.swift_sum / t.count as f64;
                let avg_diff = avg_swift - avg_js;
                FileTiming {
                    function: function.clone(),
                    avg_js,
                    avg_swift,
                    avg_diff,
                    samples: t.count,
                    verdict: TimingVerdict::from_diff(avg_diff),
                }
            })
            .collect()
    }
}

/// Counter entries by count descending, ties by key
pub fn most_common(counts: &HashMap<String, u64>) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Walk every day directory of `window` under `comparisons_dir`.
///
/// Missing day directories are skipped; unreadable or malformed files are
/// logged and skipped.
pub fn collect_file_stats(comparisons_dir: &Path, window: &DayWindow) -> FileStats {
    let mut stats = FileStats::default();

    for date in window.dates() {
        let day = date.format("%Y-%m-%d").to_string();
        let day_dir = comparisons_dir.join(&day);
        if !day_dir.is_dir() {
            debug!("No data for {}", day);
            continue;
        }

        for path in json_files_under(&day_dir) {
            let meta = match PathMetadata::from_path_under(comparisons_dir, &path) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Could not extract metadata: {}", e);
                    stats.files_skipped += 1;
                    continue;
                }
            };
            let records = match read_records(&path) {
                Ok(r) => r,
                Err(e) => {
                    warn!("{}", e);
                    stats.files_skipped += 1;
                    continue;
                }
            };
            for record in &records {
                stats.record(record, &day, &meta);
            }
        }
    }

    stats
}
