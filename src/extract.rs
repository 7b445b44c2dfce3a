//! Error File Extraction
//!
//! Splits the non-matching records of one batch file into individual
//! pretty-printed files, `{batch}.{index}.json`, which the native test
//! harness replays.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::ingest::read_records;
use crate::models::ResultType;

/// Write every non-matching record of `file` into `out_dir`; returns how many were written
pub fn extract_errors(file: &Path, out_dir: &Path) -> Result<usize> {
    let records = read_records(file)?;
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("No file stem in {}", file.display()))?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut written = 0;
    for (index, record) in records.iter().enumerate() {
        let result_type = record.get("resultType").and_then(Value::as_str);
        if result_type.is_some_and(|r| ResultType::from(r).is_matching()) {
            continue;
        }
        let target = out_dir.join(format!("{}.{}.json", stem, index));
        // serde_json maps keep keys sorted
        let body = serde_json::to_string_pretty(record)?;
        fs::write(&target, body).with_context(|| format!("Failed to write {}", target.display()))?;
        written += 1;
    }

    info!(
        "Extracted {} of {} records from {} into {}",
        written,
        records.len(),
        file.display(),
        out_dir.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_only_non_matching_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("batch-9.json");
        fs::write(
            &input,
            r#"[{"resultType":"matching"},{"resultType":"valueDifference","b":1,"a":2},{"resultType":"jsException"}]"#,
        )
        .unwrap();
        let out = dir.path().join("errors");

        let n = extract_errors(&input, &out).unwrap();
        assert_eq!(n, 2);
        assert!(!out.join("batch-9.0.json").exists());
        let body = fs::read_to_string(out.join("batch-9.1.json")).unwrap();
        let a = body.find("\"a\"").unwrap();
        let b = body.find("\"b\"").unwrap();
        assert!(a < b);
        assert!(out.join("batch-9.2.json").exists());
    }

    #[test]
    fn test_records_without_result_type_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("batch-3.json");
        fs::write(&input, r#"[{"id":"x"},{"resultType":"Matching"},{"resultType":"matching"}]"#).unwrap();
        let out = dir.path().join("errors");

        assert_eq!(extract_errors(&input, &out).unwrap(), 2);
        assert!(out.join("batch-3.0.json").exists());
        assert!(out.join("batch-3.1.json").exists());
        assert!(!out.join("batch-3.2.json").exists());
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.json");
        fs::write(&input, "[").unwrap();
        assert!(extract_errors(&input, &dir.path().join("out")).is_err());
    }
}
