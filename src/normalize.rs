//! Record Normalization
//!
//! Turns one raw JSON comparison into a [`NormalizedRecord`]. Two schema
//! generations exist in the upload history: records carrying `id`,
//! `createdAt`, `function` and `resultType` are the current format, anything
//! else is legacy and is skipped without error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::NormalizationError;
use crate::models::{
    Comparison, Difference, ExceptionKind, ExceptionRecord, NormalizedRecord, ResultType,
};
use crate::path_meta::PathMetadata;

/// Keys whose joint presence marks the current record format
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "createdAt", "function", "resultType"];

/// Raw record, tagged by schema generation
#[derive(Debug, Clone)]
pub enum RawRecord {
    Current(Map<String, Value>),
    Legacy(Value),
}

impl RawRecord {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(map) if REQUIRED_FIELDS.iter().all(|f| map.contains_key(*f)) => {
                RawRecord::Current(map)
            }
            other => RawRecord::Legacy(other),
        }
    }
}

/// True for synthetic traffic from simulator builds.
///
/// Shared by ingestion and the file-tree statistics so both agree on what
/// gets excluded.
pub fn is_simulator(record: &Value) -> bool {
    record
        .get("isSimulator")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentRecord {
    id: String,
    created_at: f64,
    function: String,
    result_type: String,
    #[serde(default)]
    js_duration: Option<f64>,
    #[serde(default)]
    swift_duration: Option<f64>,
    #[serde(default)]
    differences: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DifferencePayload {
    #[serde(default)]
    js: Value,
    #[serde(default)]
    swift: Value,
    #[serde(default)]
    js_key_missing: bool,
    #[serde(default)]
    native_key_missing: bool,
}

/// Normalize one current-format record.
///
/// Whole-record failures return `Err`; dropped differences or exceptions are
/// collected in [`NormalizedRecord::issues`] and the rest of the record is kept.
pub fn normalize(
    fields: &Map<String, Value>,
    meta: &PathMetadata,
) -> Result<NormalizedRecord, NormalizationError> {
    let id_hint = fields.get("id").and_then(Value::as_str).map(str::to_string);

    let raw: CurrentRecord = serde_json::from_value(Value::Object(fields.clone())).map_err(|e| {
        NormalizationError::InvalidRecord {
            id: id_hint.clone(),
            detail: e.to_string(),
        }
    })?;

    let created_at = epoch_seconds_to_utc(raw.created_at).ok_or_else(|| {
        NormalizationError::InvalidRecord {
            id: id_hint.clone(),
            detail: format!("createdAt {} is not a valid epoch timestamp", raw.created_at),
        }
    })?;

    let mut issues = Vec::new();

    let mut differences = Vec::new();
    if let Some(entries) = &raw.differences {
        for (key, entry) in entries {
            match difference_row(&raw.id, key, entry) {
                Some(row) => differences.push(row),
                None => issues.push(NormalizationError::InvalidDifference { key: key.clone() }),
            }
        }
    }

    let mut exceptions = Vec::new();
    for kind in ExceptionKind::ALL {
        match exception_row(&raw.id, kind, fields.get(kind.payload_field())) {
            Ok(Some(row)) => exceptions.push(row),
            Ok(None) => {}
            Err(e) => issues.push(e),
        }
    }

    Ok(NormalizedRecord {
        comparison: Comparison {
            id: raw.id,
            created_at,
            function: raw.function,
            result_type: ResultType::from(raw.result_type),
            js_duration: raw.js_duration,
            swift_duration: raw.swift_duration,
            app_version: meta.app_version.clone(),
            device_id: meta.device_id.clone(),
            batch_id: meta.batch_id.clone(),
        },
        differences,
        exceptions,
        issues,
    })
}

fn epoch_seconds_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn difference_row(comparison_id: &str, key: &str, entry: &Value) -> Option<Difference> {
    if !entry.is_object() {
        return None;
    }
    let payload: DifferencePayload = serde_json::from_value(entry.clone()).ok()?;
    Some(Difference {
        comparison_id: comparison_id.to_string(),
        key: key.to_string(),
        js_value: serde_json::to_string(&payload.js).ok()?,
        swift_value: serde_json::to_string(&payload.swift).ok()?,
        js_key_missing: payload.js_key_missing,
        native_key_missing: payload.native_key_missing,
    })
}

fn exception_row(
    comparison_id: &str,
    kind: ExceptionKind,
    payload: Option<&Value>,
) -> Result<Option<ExceptionRecord>, NormalizationError> {
    let payload = match payload {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) if map.is_empty() => return Ok(None),
        Some(p) => p,
    };

    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .ok_or(NormalizationError::MissingExceptionMessage { kind })?;

    Ok(Some(ExceptionRecord {
        comparison_id: comparison_id.to_string(),
        kind,
        message: message.to_string(),
        stack_trace: payload.get("stackTrace").and_then(Value::as_str).map(str::to_string),
        error_type: payload.get("errorType").and_then(Value::as_str).map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> PathMetadata {
        PathMetadata {
            app_version: "0.2.3".to_string(),
            function: "iob".to_string(),
            device_id: "dev-1".to_string(),
            batch_id: "batch-1".to_string(),
        }
    }

    fn current(value: Value) -> Map<String, Value> {
        match RawRecord::classify(value) {
            RawRecord::Current(map) => map,
            RawRecord::Legacy(v) => panic!("expected current format, got {}", v),
        }
    }

    #[test]
    fn test_classify_requires_all_fields() {
        let legacy = json!({"id": "x", "createdAt": 1, "function": "iob"});
        assert!(matches!(RawRecord::classify(legacy), RawRecord::Legacy(_)));
        assert!(matches!(RawRecord::classify(json!([1, 2])), RawRecord::Legacy(_)));

        let full = json!({"id": "x", "createdAt": 1, "function": "iob", "resultType": "matching"});
        assert!(matches!(RawRecord::classify(full), RawRecord::Current(_)));
    }

    #[test]
    fn test_simulator_flag() {
        assert!(is_simulator(&json!({"isSimulator": true})));
        assert!(!is_simulator(&json!({"isSimulator": false})));
        assert!(!is_simulator(&json!({"isSimulator": "true"})));
        assert!(!is_simulator(&json!({})));
    }

    #[test]
    fn test_normalize_matching_record() {
        let fields = current(json!({
            "id": "a",
            "createdAt": 1700000000,
            "function": "iob",
            "resultType": "matching",
            "jsDuration": 1.0,
            "swiftDuration": 1.2
        }));
        let rec = normalize(&fields, &meta()).unwrap();
        assert_eq!(rec.comparison.id, "a");
        assert_eq!(rec.comparison.result_type, ResultType::Matching);
        assert_eq!(rec.comparison.created_at.timestamp(), 1_700_000_000);
        assert_eq!(rec.comparison.app_version, "0.2.3");
        assert_eq!(rec.comparison.device_id, "dev-1");
        assert_eq!(rec.comparison.batch_id, "batch-1");
        assert_eq!(rec.comparison.js_duration, Some(1.0));
        assert!(rec.differences.is_empty());
        assert!(rec.exceptions.is_empty());
        assert!(rec.issues.is_empty());
    }

    #[test]
    fn test_differences_serialize_each_side() {
        let fields = current(json!({
            "id": "b",
            "createdAt": 1700000100.5,
            "function": "iob",
            "resultType": "valueDifference",
            "differences": {
                "iob": {"js": 1.0, "swift": 1.5},
                "reason": {"js": null, "swift": {"a": [1, 2]}, "jsKeyMissing": true}
            }
        }));
        let rec = normalize(&fields, &meta()).unwrap();
        assert_eq!(rec.differences.len(), 2);

        let iob = rec.differences.iter().find(|d| d.key == "iob").unwrap();
        assert_eq!(iob.js_value, "1.0");
        assert_eq!(iob.swift_value, "1.5");
        assert!(!iob.js_key_missing);

        let reason = rec.differences.iter().find(|d| d.key == "reason").unwrap();
        assert_eq!(reason.js_value, "null");
        assert_eq!(reason.swift_value, r#"{"a":[1,2]}"#);
        assert!(reason.js_key_missing);
        assert!(!reason.native_key_missing);
    }

    #[test]
    fn test_exception_without_message_is_dropped_alone() {
        let fields = current(json!({
            "id": "c",
            "createdAt": 1700000200,
            "function": "meal",
            "resultType": "swiftException",
            "jsException": {"stackTrace": "at foo"},
            "swiftException": {"message": "boom", "errorType": "DecodingError"},
            "comparisonError": {}
        }));
        let rec = normalize(&fields, &meta()).unwrap();
        assert_eq!(rec.exceptions.len(), 1);
        assert_eq!(rec.exceptions[0].kind, ExceptionKind::Swift);
        assert_eq!(rec.exceptions[0].message, "boom");
        assert_eq!(rec.exceptions[0].error_type.as_deref(), Some("DecodingError"));
        assert_eq!(rec.exceptions[0].stack_trace, None);
        assert_eq!(
            rec.issues,
            vec![NormalizationError::MissingExceptionMessage {
                kind: ExceptionKind::Js
            }]
        );
    }

    #[test]
    fn test_wrong_field_type_rejects_record() {
        let fields = current(json!({
            "id": "d",
            "createdAt": "yesterday",
            "function": "iob",
            "resultType": "matching"
        }));
        let err = normalize(&fields, &meta()).unwrap_err();
        assert!(matches!(
            err,
            NormalizationError::InvalidRecord { id: Some(ref id), .. } if id == "d"
        ));
    }

    #[test]
    fn test_malformed_difference_entry_is_reported() {
        let fields = current(json!({
            "id": "e",
            "createdAt": 1700000300,
            "function": "iob",
            "resultType": "valueDifference",
            "differences": {"iob": 3, "cob": {"js": 1, "swift": 2}}
        }));
        let rec = normalize(&fields, &meta()).unwrap();
        assert_eq!(rec.differences.len(), 1);
        assert_eq!(rec.differences[0].key, "cob");
        assert_eq!(
            rec.issues,
            vec![NormalizationError::InvalidDifference {
                key: "iob".to_string()
            }]
        );
    }
}
