//! Pipeline Configuration
//!
//! Defaults, then an optional TOML file, then `ALGOCMP_*` environment
//! variables. Binaries apply CLI flags last.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::aggregate::DEFAULT_TOP_DIFFERENCES;

/// Directory under `{data_root}/{project}` holding the dated batch tree
pub const COMPARISONS_SUBDIR: &str = "algorithm-comparisons";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Where the downloader mirrors the bucket
    pub data_root: PathBuf,
    /// Project prefix inside the bucket
    pub project: String,
    /// Trailing day window for `run` and file statistics
    pub days: u32,
    /// Ingestion threads (1 = sequential)
    pub workers: usize,
    pub top_differences: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("comparisons.db"),
            data_root: PathBuf::from("downloaded_files"),
            project: "trio-oref-validation".to_string(),
            days: 7,
            workers: 1,
            top_differences: DEFAULT_TOP_DIFFERENCES,
        }
    }
}

impl PipelineConfig {
    /// `{data_root}/{project}/algorithm-comparisons`
    pub fn comparisons_dir(&self) -> PathBuf {
        self.data_root.join(&self.project).join(COMPARISONS_SUBDIR)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse pipeline config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Defaults (or the given file) overlaid with the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(base.with_env())
    }

    /// Apply `ALGOCMP_*` overrides; unparsable values are ignored
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = get("ALGOCMP_DB_PATH") {
            if !v.trim().is_empty() {
                self.db_path = PathBuf::from(v);
            }
        }
        if let Some(v) = get("ALGOCMP_DATA_ROOT") {
            if !v.trim().is_empty() {
                self.data_root = PathBuf::from(v);
            }
        }
        if let Some(v) = get("ALGOCMP_PROJECT") {
            if !v.trim().is_empty() {
                self.project = v;
            }
        }
        if let Some(v) = get("ALGOCMP_DAYS") {
            if let Ok(d) = v.parse::<u32>() {
                if d > 0 {
                    self.days = d;
                }
            }
        }
        if let Some(v) = get("ALGOCMP_WORKERS") {
            if let Ok(w) = v.parse::<usize>() {
                if w > 0 {
                    self.workers = w;
                }
            }
        }
        if let Some(v) = get("ALGOCMP_TOP_DIFFERENCES") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    self.top_differences = n;
                }
            }
        }
        self
    }
}
