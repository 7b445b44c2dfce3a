//! Domain Models
//!
//! Normalized comparison rows as they are stored and reported: one
//! [`Comparison`] per execution with its [`Difference`] and
//! [`ExceptionRecord`] children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NormalizationError;

/// Outcome classification of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultType {
    Matching,
    ValueDifference,
    /// Exception-bearing or otherwise divergent outcomes, kept verbatim
    Other(String),
}

impl ResultType {
    pub fn as_str(&self) -> &str {
        match self {
            ResultType::Matching => "matching",
            ResultType::ValueDifference => "valueDifference",
            ResultType::Other(s) => s.as_str(),
        }
    }

    pub fn is_matching(&self) -> bool {
        matches!(self, ResultType::Matching)
    }
}

impl From<String> for ResultType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "matching" | "valueDifference" => ResultType::from(s.as_str()),
            _ => ResultType::Other(s),
        }
    }
}

impl From<&str> for ResultType {
    fn from(s: &str) -> Self {
        match s {
            "matching" => ResultType::Matching,
            "valueDifference" => ResultType::ValueDifference,
            other => ResultType::Other(other.to_string()),
        }
    }
}

impl From<ResultType> for String {
    fn from(r: ResultType) -> Self {
        match r {
            ResultType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// Which side or stage of a comparison failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionKind {
    Js,
    Swift,
    Comparison,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 3] = [ExceptionKind::Js, ExceptionKind::Swift, ExceptionKind::Comparison];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::Js => "js",
            ExceptionKind::Swift => "swift",
            ExceptionKind::Comparison => "comparison",
        }
    }

    /// Record field carrying this exception
    pub fn payload_field(&self) -> &'static str {
        match self {
            ExceptionKind::Js => "jsException",
            ExceptionKind::Swift => "swiftException",
            ExceptionKind::Comparison => "comparisonError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "js" => Some(ExceptionKind::Js),
            "swift" => Some(ExceptionKind::Swift),
            "comparison" => Some(ExceptionKind::Comparison),
            _ => None,
        }
    }
}

/// One side-by-side execution of both implementations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub function: String,
    pub result_type: ResultType,
    pub js_duration: Option<f64>,
    pub swift_duration: Option<f64>,
    pub app_version: String,
    pub device_id: String,
    pub batch_id: String,
}

/// One field-level mismatch; values are kept as JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    pub comparison_id: String,
    pub key: String,
    pub js_value: String,
    pub swift_value: String,
    pub js_key_missing: bool,
    pub native_key_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub comparison_id: String,
    pub kind: ExceptionKind,
    pub message: String,
    pub stack_trace: Option<String>,
    pub error_type: Option<String>,
}

/// Canonical output of normalization, ready for the store
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub comparison: Comparison,
    pub differences: Vec<Difference>,
    pub exceptions: Vec<ExceptionRecord>,
    /// Sub-records dropped during normalization
    pub issues: Vec<NormalizationError>,
}

/// Timestamp format used for `created_at` in the store
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_store_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(STORE_TIMESTAMP_FORMAT).to_string()
}
