//! Batch Ingestion Driver
//!
//! Walks a tree of uploaded batch files and feeds each record through
//! normalization into the [`ComparisonStore`]. Failures are scoped to the
//! smallest unit: a bad file skips that file, a bad record skips that record.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::StoreReport;
use crate::config::PipelineConfig;
use crate::error::FileError;
use crate::file_stats::DayWindow;
use crate::normalize::{is_simulator, normalize, RawRecord};
use crate::path_meta::PathMetadata;
use crate::store::ComparisonStore;

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files_seen: u64,
    pub files_ingested: u64,
    pub files_skipped: u64,
    pub records_stored: u64,
    /// Old schema generation, skipped silently
    pub records_legacy: u64,
    pub records_simulator: u64,
    /// Current-format records that failed normalization or storage
    pub records_rejected: u64,
    /// Differences/exceptions dropped from otherwise stored records
    pub normalization_warnings: u64,
}

impl IngestSummary {
    pub fn merge(mut self, other: Self) -> Self {
        self.files_seen += other.files_seen;
        self.files_ingested += other.files_ingested;
        self.files_skipped += other.files_skipped;
        self.records_stored += other.records_stored;
        self.records_legacy += other.records_legacy;
        self.records_simulator += other.records_simulator;
        self.records_rejected += other.records_rejected;
        self.normalization_warnings += other.normalization_warnings;
        self
    }
}

/// All `*.json` files below `root`, sorted for a deterministic walk.
///
/// Unreadable directories are logged and skipped.
pub fn json_files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

/// Parse a batch file holding either one record or an array of records
pub fn read_records(path: &Path) -> Result<Vec<Value>, FileError> {
    let content = fs::read_to_string(path).map_err(|source| FileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| FileError::MalformedJson {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(match value {
        Value::Array(records) => records,
        single => vec![single],
    })
}

pub struct Ingestor {
    store: ComparisonStore,
    workers: usize,
    top_differences: usize,
}

impl Ingestor {
    pub fn new(store: ComparisonStore, config: &PipelineConfig) -> Self {
        Self {
            store,
            workers: config.workers.max(1),
            top_differences: config.top_differences,
        }
    }

    pub fn store(&self) -> &ComparisonStore {
        &self.store
    }

    /// Ingest every JSON file under `root`
    pub fn ingest_tree(&self, root: &Path) -> Result<IngestSummary> {
        let files = json_files_under(root);
        info!("Found {} JSON files under {}", files.len(), root.display());
        self.ingest_files(root, &files)
    }

    /// Ingest only the day directories of `window` under `comparisons_dir`
    pub fn ingest_window(&self, comparisons_dir: &Path, window: &DayWindow) -> Result<IngestSummary> {
        let mut files = Vec::new();
        for date in window.dates() {
            let day_dir = comparisons_dir.join(date.format("%Y-%m-%d").to_string());
            if day_dir.is_dir() {
                files.extend(json_files_under(&day_dir));
            }
        }
        info!(
            "Found {} JSON files in the last {} days under {}",
            files.len(),
            window.days,
            comparisons_dir.display()
        );
        self.ingest_files(comparisons_dir, &files)
    }

    /// Ingest the window, then aggregate the store
    pub fn run(&self, comparisons_dir: &Path, window: &DayWindow) -> Result<(IngestSummary, StoreReport)> {
        let summary = self.ingest_window(comparisons_dir, window)?;
        let report = StoreReport::collect(&self.store, self.top_differences)
            .context("Failed to aggregate comparison store")?;
        Ok((summary, report))
    }

    fn ingest_files(&self, root: &Path, files: &[PathBuf]) -> Result<IngestSummary> {
        let started = Instant::now();

        let summary = if self.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .context("Failed to build ingestion thread pool")?;
            pool.install(|| {
                files
                    .par_iter()
                    .map(|f| self.ingest_file(root, f))
                    .reduce(IngestSummary::default, IngestSummary::merge)
            })
        } else {
            files
                .iter()
                .map(|f| self.ingest_file(root, f))
                .fold(IngestSummary::default(), IngestSummary::merge)
        };

        info!(
            "Ingested {} records from {}/{} files in {:.2?} ({} legacy, {} simulator, {} rejected, {} files skipped)",
            summary.records_stored,
            summary.files_ingested,
            summary.files_seen,
            started.elapsed(),
            summary.records_legacy,
            summary.records_simulator,
            summary.records_rejected,
            summary.files_skipped
        );
        Ok(summary)
    }

    /// Ingest one batch file found under `root`; never fails the batch.
    ///
    /// Path metadata is read from the components below `root` only.
    pub fn ingest_file(&self, root: &Path, path: &Path) -> IngestSummary {
        let mut summary = IngestSummary {
            files_seen: 1,
            ..Default::default()
        };

        let loaded = PathMetadata::from_path_under(root, path)
            .map_err(FileError::from)
            .and_then(|meta| read_records(path).map(|records| (meta, records)));
        let (meta, records) = match loaded {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping file: {}", e);
                summary.files_skipped = 1;
                return summary;
            }
        };

        debug!("Processing {} ({} records)", path.display(), records.len());

        for record in records {
            if is_simulator(&record) {
                summary.records_simulator += 1;
                continue;
            }
            let fields = match RawRecord::classify(record) {
                RawRecord::Current(fields) => fields,
                RawRecord::Legacy(_) => {
                    summary.records_legacy += 1;
                    continue;
                }
            };

            let normalized = match normalize(&fields, &meta) {
                Ok(n) => n,
                Err(e) => {
                    warn!("Rejected record in {}: {}", path.display(), e);
                    summary.records_rejected += 1;
                    continue;
                }
            };
            for issue in &normalized.issues {
                warn!(
                    "Comparison {} in {}: {}",
                    normalized.comparison.id,
                    path.display(),
                    issue
                );
            }
            summary.normalization_warnings += normalized.issues.len() as u64;

            match self.store.upsert(&normalized) {
                Ok(()) => summary.records_stored += 1,
                Err(e) => {
                    warn!("Failed to store comparison {}: {:#}", normalized.comparison.id, e);
                    summary.records_rejected += 1;
                }
            }
        }

        summary.files_ingested = 1;
        summary
    }
}
