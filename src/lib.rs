//! Algorithm Comparison Backend Library
//!
//! Ingests JS-vs-Swift algorithm comparison batches into SQLite and computes
//! divergence and timing statistics, either from the store or straight from
//! the downloaded file tree.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extract;
pub mod file_stats;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod path_meta;
pub mod report;
pub mod store;

pub use aggregate::StoreReport;
pub use config::PipelineConfig;
pub use file_stats::{collect_file_stats, DayWindow, FileStats};
pub use ingest::{IngestSummary, Ingestor};
pub use store::ComparisonStore;
