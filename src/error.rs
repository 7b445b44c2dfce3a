//! Error taxonomy for the ingestion pipeline
//!
//! Every error here is scoped to one file or one record. None of them is
//! fatal to a batch: callers log and move on to the next unit.

use std::path::PathBuf;

use crate::models::ExceptionKind;

/// Path does not follow the `{appVersion}/{function}/{deviceId}/{batchId}.json` layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFormatError {
    /// No component looks like a semantic version (two or more dots)
    NoVersionSegment(PathBuf),
    /// The device id would sit past the end of the path
    DeviceOutOfRange { path: PathBuf, index: usize },
    /// File name has no usable stem
    NoFileStem(PathBuf),
}

impl std::fmt::Display for PathFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoVersionSegment(p) => {
                write!(f, "no app version segment in path: {}", p.display())
            }
            Self::DeviceOutOfRange { path, index } => write!(
                f,
                "device id index {} out of range for path: {}",
                index,
                path.display()
            ),
            Self::NoFileStem(p) => write!(f, "no batch id (file stem) in path: {}", p.display()),
        }
    }
}

impl std::error::Error for PathFormatError {}

/// A current-format record (or part of one) could not be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// Exception payload without a string `message`; only that exception is dropped
    MissingExceptionMessage { kind: ExceptionKind },
    /// Difference entry that is not a well-formed object; only that entry is dropped
    InvalidDifference { key: String },
    /// Required fields present but unusable (wrong JSON type, bad timestamp); the record is dropped
    InvalidRecord { id: Option<String>, detail: String },
}

impl std::fmt::Display for NormalizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingExceptionMessage { kind } => {
                write!(f, "{} exception has no message", kind.as_str())
            }
            Self::InvalidDifference { key } => {
                write!(f, "difference entry '{}' is malformed", key)
            }
            Self::InvalidRecord { id: Some(id), detail } => {
                write!(f, "invalid record '{}': {}", id, detail)
            }
            Self::InvalidRecord { id: None, detail } => write!(f, "invalid record: {}", detail),
        }
    }
}

impl std::error::Error for NormalizationError {}

/// A whole input file had to be skipped
#[derive(Debug)]
pub enum FileError {
    Io { path: PathBuf, source: std::io::Error },
    MalformedJson { path: PathBuf, source: serde_json::Error },
    PathFormat(PathFormatError),
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {}", path.display(), source),
            Self::MalformedJson { path, source } => {
                write!(f, "malformed JSON in {}: {}", path.display(), source)
            }
            Self::PathFormat(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::MalformedJson { source, .. } => Some(source),
            Self::PathFormat(e) => Some(e),
        }
    }
}

impl From<PathFormatError> for FileError {
    fn from(e: PathFormatError) -> Self {
        Self::PathFormat(e)
    }
}
