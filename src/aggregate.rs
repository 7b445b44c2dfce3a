//! Store Analytics
//!
//! Read-only queries over the comparison store. Every function takes a
//! shared connection reference and never writes; an empty store yields
//! zero counts and empty lists.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::store::ComparisonStore;

/// Default size of the most-divergent-keys list
pub const DEFAULT_TOP_DIFFERENCES: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OverallStats {
    pub total_comparisons: i64,
    pub unique_devices: i64,
    pub unique_versions: i64,
    pub unique_functions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultShare {
    pub result_type: String,
    pub count: i64,
    /// Percentage of all comparisons, one decimal place
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionStats {
    pub function: String,
    pub total: i64,
    pub matching: i64,
    pub value_differences: i64,
    pub devices: i64,
}

/// Sign of `swift - js`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimingVerdict {
    SwiftSlower,
    SwiftFaster,
    Same,
}

impl TimingVerdict {
    pub fn from_diff(diff: f64) -> Self {
        if diff > 0.0 {
            TimingVerdict::SwiftSlower
        } else if diff < 0.0 {
            TimingVerdict::SwiftFaster
        } else {
            TimingVerdict::Same
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimingVerdict::SwiftSlower => "Swift slower",
            TimingVerdict::SwiftFaster => "Swift faster",
            TimingVerdict::Same => "Same",
        }
    }
}

/// Average durations of one function, over records carrying both timings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationStats {
    pub function: String,
    pub avg_js: f64,
    pub avg_swift: f64,
    /// `avg_swift - avg_js`
    pub avg_diff: f64,
    pub samples: i64,
    pub verdict: TimingVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergentKey {
    pub key: String,
    pub occurrences: i64,
    pub comparisons: i64,
}

/// Non-matching comparisons grouped along each reporting dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorBreakdown {
    pub total_errors: i64,
    /// Ascending by day
    pub by_day: Vec<(String, i64)>,
    /// The rest are descending by count
    pub by_function: Vec<(String, i64)>,
    pub by_device: Vec<(String, i64)>,
    pub by_version: Vec<(String, i64)>,
}

pub fn overall_stats(conn: &Connection) -> Result<OverallStats> {
    Ok(conn.query_row(
        "SELECT
            COUNT(*),
            COUNT(DISTINCT device_id),
            COUNT(DISTINCT app_version),
            COUNT(DISTINCT function)
         FROM comparisons",
        [],
        |row| {
            Ok(OverallStats {
                total_comparisons: row.get(0)?,
                unique_devices: row.get(1)?,
                unique_versions: row.get(2)?,
                unique_functions: row.get(3)?,
            })
        },
    )?)
}

pub fn result_distribution(conn: &Connection) -> Result<Vec<ResultShare>> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            result_type,
            COUNT(*) AS count,
            ROUND(COUNT(*) * 100.0 / (SELECT COUNT(*) FROM comparisons), 1) AS percentage
         FROM comparisons
         GROUP BY result_type
         ORDER BY count DESC, result_type ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ResultShare {
                result_type: row.get(0)?,
                count: row.get(1)?,
                percentage: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn function_stats(conn: &Connection) -> Result<Vec<FunctionStats>> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            function,
            COUNT(*) AS total,
            SUM(CASE WHEN result_type = 'matching' THEN 1 ELSE 0 END),
            SUM(CASE WHEN result_type = 'valueDifference' THEN 1 ELSE 0 END),
            COUNT(DISTINCT device_id)
         FROM comparisons
         GROUP BY function
         ORDER BY total DESC, function ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FunctionStats {
                function: row.get(0)?,
                total: row.get(1)?,
                matching: row.get(2)?,
                value_differences: row.get(3)?,
                devices: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Timing comparison per function, largest Swift regression first.
///
/// Only rows where both durations are present contribute, whatever their
/// result type. Averages are rounded to four decimals.
pub fn duration_stats(conn: &Connection) -> Result<Vec<DurationStats>> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            function,
            ROUND(AVG(js_duration), 4),
            ROUND(AVG(swift_duration), 4),
            ROUND(AVG(swift_duration - js_duration), 4) AS avg_diff,
            COUNT(*)
         FROM comparisons
         WHERE js_duration IS NOT NULL
           AND swift_duration IS NOT NULL
         GROUP BY function
         ORDER BY avg_diff DESC, function ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let avg_diff: f64 = row.get(3)?;
            Ok(DurationStats {
                function: row.get(0)?,
                avg_js: row.get(1)?,
                avg_swift: row.get(2)?,
                avg_diff,
                samples: row.get(4)?,
                verdict: TimingVerdict::from_diff(avg_diff),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Most frequently diverging keys across all differences
pub fn top_differences(conn: &Connection, limit: usize) -> Result<Vec<DivergentKey>> {
    let mut stmt = conn.prepare_cached(
        "SELECT
            key,
            COUNT(*) AS occurrences,
            COUNT(DISTINCT comparison_id)
         FROM differences
         GROUP BY key
         ORDER BY occurrences DESC, key ASC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(DivergentKey {
                key: row.get(0)?,
                occurrences: row.get(1)?,
                comparisons: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn grouped_errors(conn: &Connection, column_expr: &str, order: &str) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT {col} AS bucket, COUNT(*) AS errors
         FROM comparisons
         WHERE result_type != 'matching'
         GROUP BY bucket
         ORDER BY {order}",
        col = column_expr,
        order = order
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Non-matching comparisons by day of `created_at`, function, device and app version
pub fn error_breakdown(conn: &Connection) -> Result<ErrorBreakdown> {
    let total_errors: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comparisons WHERE result_type != 'matching'",
        [],
        |row| row.get(0),
    )?;
    let by_count = "errors DESC, bucket ASC";
    Ok(ErrorBreakdown {
        total_errors,
        by_day: grouped_errors(conn, "date(created_at)", "bucket ASC")?,
        by_function: grouped_errors(conn, "function", by_count)?,
        by_device: grouped_errors(conn, "device_id", by_count)?,
        by_version: grouped_errors(conn, "app_version", by_count)?,
    })
}

/// Exception rows per side, descending
pub fn exception_breakdown(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT exception_type, COUNT(*) AS n
         FROM exceptions
         GROUP BY exception_type
         ORDER BY n DESC, exception_type ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Everything the store report prints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreReport {
    pub overall: OverallStats,
    pub results: Vec<ResultShare>,
    pub functions: Vec<FunctionStats>,
    pub durations: Vec<DurationStats>,
    pub top_differences: Vec<DivergentKey>,
    pub errors: ErrorBreakdown,
    pub exceptions: Vec<(String, i64)>,
}

impl StoreReport {
    pub fn collect(store: &ComparisonStore, top_n: usize) -> Result<Self> {
        store.read(|conn| {
            Ok(Self {
                overall: overall_stats(conn)?,
                results: result_distribution(conn)?,
                functions: function_stats(conn)?,
                durations: duration_stats(conn)?,
                top_differences: top_differences(conn, top_n)?,
                errors: error_breakdown(conn)?,
                exceptions: exception_breakdown(conn)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Comparison, Difference, ExceptionKind, ExceptionRecord, NormalizedRecord, ResultType,
    };
    use chrono::{TimeZone, Utc};

    fn seed(
        store: &ComparisonStore,
        id: &str,
        function: &str,
        result: &str,
        device: &str,
        durations: (Option<f64>, Option<f64>),
        keys: &[&str],
    ) {
        let rec = NormalizedRecord {
            comparison: Comparison {
                id: id.to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 11, 2, 10, 0, 0).unwrap(),
                function: function.to_string(),
                result_type: ResultType::from(result.to_string()),
                js_duration: durations.0,
                swift_duration: durations.1,
                app_version: "0.2.3".to_string(),
                device_id: device.to_string(),
                batch_id: "b".to_string(),
            },
            differences: keys
                .iter()
                .map(|k| Difference {
                    comparison_id: id.to_string(),
                    key: k.to_string(),
                    js_value: "1".to_string(),
                    swift_value: "2".to_string(),
                    js_key_missing: false,
                    native_key_missing: false,
                })
                .collect(),
            exceptions: vec![],
            issues: vec![],
        };
        store.upsert(&rec).unwrap();
    }

    #[test]
    fn test_empty_store_yields_zeros() {
        let store = ComparisonStore::in_memory().unwrap();
        let report = StoreReport::collect(&store, DEFAULT_TOP_DIFFERENCES).unwrap();
        assert_eq!(report.overall, OverallStats::default());
        assert!(report.results.is_empty());
        assert!(report.functions.is_empty());
        assert!(report.durations.is_empty());
        assert!(report.top_differences.is_empty());
        assert_eq!(report.errors, ErrorBreakdown::default());
        assert!(report.exceptions.is_empty());
    }

    #[test]
    fn test_result_distribution_percentages() {
        let store = ComparisonStore::in_memory().unwrap();
        seed(&store, "1", "iob", "matching", "d1", (None, None), &[]);
        seed(&store, "2", "iob", "matching", "d1", (None, None), &[]);
        seed(&store, "3", "meal", "valueDifference", "d2", (None, None), &["x"]);

        let dist = store.read(result_distribution).unwrap();
        assert_eq!(dist.len(), 2);
        assert_eq!(dist[0].result_type, "matching");
        assert_eq!(dist[0].count, 2);
        assert!((dist[0].percentage - 66.7).abs() < 1e-9);
        assert!((dist[1].percentage - 33.3).abs() < 1e-9);

        let sum: f64 = dist.iter().map(|d| d.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.1 * dist.len() as f64);
    }

    #[test]
    fn test_duration_ordering_and_verdicts() {
        let store = ComparisonStore::in_memory().unwrap();
        seed(&store, "1", "iob", "matching", "d1", (Some(1.0), Some(1.5)), &[]);
        seed(&store, "2", "meal", "matching", "d1", (Some(2.0), Some(1.0)), &[]);
        seed(&store, "3", "autosens", "matching", "d1", (Some(3.0), Some(3.0)), &[]);
        // Missing one side: excluded
        seed(&store, "4", "iob", "matching", "d1", (Some(100.0), None), &[]);

        let durations = store.read(duration_stats).unwrap();
        let names: Vec<_> = durations.iter().map(|d| d.function.as_str()).collect();
        assert_eq!(names, vec!["iob", "autosens", "meal"]);
        assert_eq!(durations[0].verdict, TimingVerdict::SwiftSlower);
        assert_eq!(durations[0].samples, 1);
        assert_eq!(durations[1].verdict, TimingVerdict::Same);
        assert_eq!(durations[2].verdict, TimingVerdict::SwiftFaster);
        assert!((durations[2].avg_diff + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_differences_limit_and_order() {
        let store = ComparisonStore::in_memory().unwrap();
        seed(&store, "1", "iob", "valueDifference", "d1", (None, None), &["iob", "cob"]);
        seed(&store, "2", "iob", "valueDifference", "d1", (None, None), &["iob"]);
        seed(&store, "3", "iob", "valueDifference", "d2", (None, None), &["iob", "isf"]);

        let top = store.read(|c| top_differences(c, 2)).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key, "iob");
        assert_eq!(top[0].occurrences, 3);
        assert_eq!(top[0].comparisons, 3);
        assert_eq!(top[1].key, "cob");
    }

    #[test]
    fn test_error_breakdown() {
        let store = ComparisonStore::in_memory().unwrap();
        seed(&store, "1", "iob", "matching", "d1", (None, None), &[]);
        seed(&store, "2", "iob", "valueDifference", "d1", (None, None), &[]);
        seed(&store, "3", "meal", "jsException", "d2", (None, None), &[]);
        seed(&store, "4", "meal", "valueDifference", "d2", (None, None), &[]);

        let errors = store.read(error_breakdown).unwrap();
        assert_eq!(errors.total_errors, 3);
        assert_eq!(errors.by_day, vec![("2024-11-02".to_string(), 3)]);
        assert_eq!(
            errors.by_function,
            vec![("meal".to_string(), 2), ("iob".to_string(), 1)]
        );
        assert_eq!(errors.by_version, vec![("0.2.3".to_string(), 3)]);
        assert_eq!(
            errors.by_device,
            vec![("d2".to_string(), 2), ("d1".to_string(), 1)]
        );
    }

    #[test]
    fn test_exception_breakdown_counts_sides() {
        let store = ComparisonStore::in_memory().unwrap();
        seed(&store, "1", "iob", "jsException", "d1", (None, None), &[]);
        seed(&store, "2", "iob", "swiftException", "d1", (None, None), &[]);

        let exception = |id: &str, kind: ExceptionKind| ExceptionRecord {
            comparison_id: id.to_string(),
            kind,
            message: "boom".to_string(),
            stack_trace: None,
            error_type: None,
        };
        for (id, kinds) in [
            ("1", vec![ExceptionKind::Js, ExceptionKind::Comparison]),
            ("2", vec![ExceptionKind::Swift, ExceptionKind::Js]),
        ] {
            let comparison = store.comparison(id).unwrap().unwrap();
            let rec = NormalizedRecord {
                comparison,
                differences: vec![],
                exceptions: kinds.into_iter().map(|k| exception(id, k)).collect(),
                issues: vec![],
            };
            store.upsert(&rec).unwrap();
        }

        let sides = store.read(exception_breakdown).unwrap();
        assert_eq!(
            sides,
            vec![
                ("js".to_string(), 2),
                ("comparison".to_string(), 1),
                ("swift".to_string(), 1),
            ]
        );
    }
}
