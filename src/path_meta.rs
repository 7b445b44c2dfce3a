//! Path Metadata Extraction
//!
//! Uploaded batches land under
//! `.../{appVersion}/{function}/{deviceId}/{batchId}.json`. The directory
//! names are the only place the app version, device and batch are recorded,
//! so they are parsed once per file into a [`PathMetadata`] descriptor that
//! the normalizer receives as an argument.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::PathFormatError;

/// Typed descriptor derived from a batch file's location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMetadata {
    pub app_version: String,
    /// Function directory between app version and device
    pub function: String,
    pub device_id: String,
    /// File name without extension
    pub batch_id: String,
}

impl PathMetadata {
    /// Parse the descriptor out of a batch file path.
    ///
    /// The app version is the first component with at least two `.`
    /// characters; the device id sits two components after it. Every
    /// component is scanned, so pass a path relative to the batch tree (or
    /// use [`PathMetadata::from_path_under`]) when ancestors may be dotted.
    pub fn from_path(path: &Path) -> Result<Self, PathFormatError> {
        Self::parse(path, path)
    }

    /// Like [`PathMetadata::from_path`], scanning only the components below `root`.
    ///
    /// Directories above the walk root (`com.apple.CloudDocs`, `v1.2.3-backup`)
    /// never take part in the version search. A path outside `root` is
    /// scanned whole. Errors carry the full path.
    pub fn from_path_under(root: &Path, path: &Path) -> Result<Self, PathFormatError> {
        let relative = path.strip_prefix(root).unwrap_or(path);
        Self::parse(relative, path)
    }

    fn parse(relative: &Path, path: &Path) -> Result<Self, PathFormatError> {
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        let version_idx = parts
            .iter()
            .position(|p| looks_like_version(p))
            .ok_or_else(|| PathFormatError::NoVersionSegment(path.to_path_buf()))?;

        let device_idx = version_idx + 2;
        // The last component is the file itself, so the device directory must precede it
        if device_idx + 1 >= parts.len() {
            return Err(PathFormatError::DeviceOutOfRange {
                path: path.to_path_buf(),
                index: device_idx,
            });
        }

        let batch_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PathFormatError::NoFileStem(path.to_path_buf()))?;

        Ok(Self {
            app_version: parts[version_idx].to_string(),
            function: parts[version_idx + 1].to_string(),
            device_id: parts[device_idx].to_string(),
            batch_id: batch_id.to_string(),
        })
    }
}

#[inline]
fn looks_like_version(segment: &str) -> bool {
    segment.matches('.').count() >= 2
}
