//! Comparison Store
//!
//! SQLite-backed relational store for normalized comparisons:
//! - `comparisons`: one row per execution, keyed by upstream id
//! - `differences`: field-level mismatches, keyed by (comparison_id, key)
//! - `exceptions`: per-side failures, keyed by (comparison_id, exception_type)
//!
//! All writes go through [`ComparisonStore::upsert`], a single IMMEDIATE
//! transaction per comparison. The connection sits behind a mutex, so two
//! upserts never interleave their child-row writes.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{
    format_store_timestamp, Comparison, Difference, ExceptionKind, ExceptionRecord,
    NormalizedRecord, ResultType, STORE_TIMESTAMP_FORMAT,
};

const PRAGMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS comparisons (
    id TEXT PRIMARY KEY,
    created_at TIMESTAMP NOT NULL,
    function TEXT NOT NULL,
    result_type TEXT NOT NULL,
    js_duration REAL,
    swift_duration REAL,
    app_version TEXT NOT NULL,
    device_id TEXT NOT NULL,
    batch_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS differences (
    comparison_id TEXT NOT NULL,
    key TEXT NOT NULL,
    js_value TEXT,
    swift_value TEXT,
    js_key_missing BOOLEAN NOT NULL DEFAULT 0,
    native_key_missing BOOLEAN NOT NULL DEFAULT 0,
    FOREIGN KEY (comparison_id) REFERENCES comparisons(id),
    PRIMARY KEY (comparison_id, key)
);

CREATE TABLE IF NOT EXISTS exceptions (
    comparison_id TEXT NOT NULL,
    exception_type TEXT NOT NULL CHECK (exception_type IN ('js', 'swift', 'comparison')),
    message TEXT NOT NULL,
    stack_trace TEXT,
    error_type TEXT,
    FOREIGN KEY (comparison_id) REFERENCES comparisons(id),
    PRIMARY KEY (comparison_id, exception_type)
);

CREATE INDEX IF NOT EXISTS idx_comparisons_function ON comparisons(function, result_type);
CREATE INDEX IF NOT EXISTS idx_comparisons_created_at ON comparisons(created_at);
CREATE INDEX IF NOT EXISTS idx_comparisons_device ON comparisons(device_id);
CREATE INDEX IF NOT EXISTS idx_differences_key ON differences(key);
"#;

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub comparisons: i64,
    pub differences: i64,
    pub exceptions: i64,
}

#[derive(Clone)]
pub struct ComparisonStore {
    conn: Arc<Mutex<Connection>>,
}

impl ComparisonStore {
    /// Open (or create) the store at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let store = Self::init(conn)?;

        let journal_mode: String = store
            .read(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let counts = store.counts()?;
        info!(
            "📊 Comparison store at {} ({} comparisons, {} differences, {} exceptions)",
            db_path.display(),
            counts.comparisons,
            counts.differences,
            counts.exceptions
        );

        Ok(store)
    }

    /// Private in-memory store, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(PRAGMA_SQL)
            .context("Failed to apply database pragmas")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace everything stored under the record's comparison id.
    ///
    /// Child rows for the id are cleared, the comparison row is upserted,
    /// then differences and exceptions are inserted, all in one transaction.
    pub fn upsert(&self, record: &NormalizedRecord) -> Result<()> {
        let c = &record.comparison;
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin upsert transaction")?;

        tx.execute("DELETE FROM differences WHERE comparison_id = ?1", [&c.id])?;
        tx.execute("DELETE FROM exceptions WHERE comparison_id = ?1", [&c.id])?;

        tx.execute(
            "INSERT INTO comparisons
                (id, created_at, function, result_type, js_duration, swift_duration,
                 app_version, device_id, batch_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                function = excluded.function,
                result_type = excluded.result_type,
                js_duration = excluded.js_duration,
                swift_duration = excluded.swift_duration,
                app_version = excluded.app_version,
                device_id = excluded.device_id,
                batch_id = excluded.batch_id",
            params![
                &c.id,
                format_store_timestamp(&c.created_at),
                &c.function,
                c.result_type.as_str(),
                c.js_duration,
                c.swift_duration,
                &c.app_version,
                &c.device_id,
                &c.batch_id,
            ],
        )
        .with_context(|| format!("Failed to upsert comparison {}", c.id))?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO differences
                    (comparison_id, key, js_value, swift_value, js_key_missing, native_key_missing)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for d in &record.differences {
                stmt.execute(params![
                    &c.id,
                    &d.key,
                    &d.js_value,
                    &d.swift_value,
                    d.js_key_missing,
                    d.native_key_missing,
                ])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO exceptions
                    (comparison_id, exception_type, message, stack_trace, error_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for e in &record.exceptions {
                stmt.execute(params![
                    &c.id,
                    e.kind.as_str(),
                    &e.message,
                    &e.stack_trace,
                    &e.error_type,
                ])?;
            }
        }

        tx.commit()
            .with_context(|| format!("Failed to commit comparison {}", c.id))?;

        debug!(
            "stored comparison {} ({} differences, {} exceptions)",
            c.id,
            record.differences.len(),
            record.exceptions.len()
        );
        Ok(())
    }

    /// Run a read-only closure against the connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn counts(&self) -> Result<TableCounts> {
        self.read(|conn| {
            let count = |table: &str| -> Result<i64> {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
            };
            Ok(TableCounts {
                comparisons: count("comparisons")?,
                differences: count("differences")?,
                exceptions: count("exceptions")?,
            })
        })
    }

    /// Child rows whose comparison does not exist
    pub fn orphan_count(&self) -> Result<i64> {
        self.read(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM differences d
                      WHERE NOT EXISTS (SELECT 1 FROM comparisons c WHERE c.id = d.comparison_id))
                  + (SELECT COUNT(*) FROM exceptions e
                      WHERE NOT EXISTS (SELECT 1 FROM comparisons c WHERE c.id = e.comparison_id))",
                [],
                |row| row.get(0),
            )?)
        })
    }

    pub fn comparison(&self, id: &str) -> Result<Option<Comparison>> {
        self.read(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, created_at, function, result_type, js_duration, swift_duration,
                            app_version, device_id, batch_id
                     FROM comparisons WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<f64>>(4)?,
                            row.get::<_, Option<f64>>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, String>(8)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, created_at, function, result_type, js, swift, app_version, device_id, batch_id)) = row
            else {
                return Ok(None);
            };

            let created_at = NaiveDateTime::parse_from_str(&created_at, STORE_TIMESTAMP_FORMAT)
                .with_context(|| format!("Bad created_at '{}' for comparison {}", created_at, id))?;

            Ok(Some(Comparison {
                id,
                created_at: Utc.from_utc_datetime(&created_at),
                function,
                result_type: ResultType::from(result_type),
                js_duration: js,
                swift_duration: swift,
                app_version,
                device_id,
                batch_id,
            }))
        })
    }

    pub fn differences_for(&self, comparison_id: &str) -> Result<Vec<Difference>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT comparison_id, key, js_value, swift_value, js_key_missing, native_key_missing
                 FROM differences WHERE comparison_id = ?1 ORDER BY key",
            )?;
            let rows = stmt
                .query_map([comparison_id], |row| {
                    Ok(Difference {
                        comparison_id: row.get(0)?,
                        key: row.get(1)?,
                        js_value: row.get(2)?,
                        swift_value: row.get(3)?,
                        js_key_missing: row.get(4)?,
                        native_key_missing: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn exceptions_for(&self, comparison_id: &str) -> Result<Vec<ExceptionRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT comparison_id, exception_type, message, stack_trace, error_type
                 FROM exceptions WHERE comparison_id = ?1 ORDER BY exception_type",
            )?;
            let rows = stmt
                .query_map([comparison_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(comparison_id, kind, message, stack_trace, error_type)| -> Result<ExceptionRecord> {
                    let kind = ExceptionKind::parse(&kind)
                        .with_context(|| format!("Unknown exception_type '{}'", kind))?;
                    Ok(ExceptionRecord {
                        comparison_id,
                        kind,
                        message,
                        stack_trace,
                        error_type,
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(id: &str, result_type: ResultType, diff_keys: &[&str]) -> NormalizedRecord {
        NormalizedRecord {
            comparison: Comparison {
                id: id.to_string(),
                created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                function: "iob".to_string(),
                result_type,
                js_duration: Some(1.0),
                swift_duration: None,
                app_version: "0.2.3".to_string(),
                device_id: "dev-1".to_string(),
                batch_id: "batch-1".to_string(),
            },
            differences: diff_keys
                .iter()
                .map(|k| Difference {
                    comparison_id: id.to_string(),
                    key: k.to_string(),
                    js_value: "1".to_string(),
                    swift_value: "2".to_string(),
                    js_key_missing: false,
                    native_key_missing: true,
                })
                .collect(),
            exceptions: vec![],
            issues: vec![],
        }
    }

    #[test]
    fn test_store_create_empty() {
        let store = ComparisonStore::in_memory().expect("Failed to create database");
        assert_eq!(store.counts().unwrap(), TableCounts::default());
        assert!(store.comparison("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_and_read_back() {
        let store = ComparisonStore::in_memory().unwrap();
        let mut rec = record("a", ResultType::ValueDifference, &["iob", "cob"]);
        rec.exceptions.push(ExceptionRecord {
            comparison_id: "a".to_string(),
            kind: ExceptionKind::Comparison,
            message: "mismatched shapes".to_string(),
            stack_trace: None,
            error_type: Some("TypeError".to_string()),
        });
        store.upsert(&rec).unwrap();

        let stored = store.comparison("a").unwrap().unwrap();
        assert_eq!(stored, rec.comparison);

        let diffs = store.differences_for("a").unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].key, "cob");
        assert!(diffs[0].native_key_missing);

        let exceptions = store.exceptions_for("a").unwrap();
        assert_eq!(exceptions, rec.exceptions);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = ComparisonStore::in_memory().unwrap();
        let rec = record("a", ResultType::ValueDifference, &["iob"]);
        store.upsert(&rec).unwrap();
        let first = store.counts().unwrap();
        store.upsert(&rec).unwrap();
        assert_eq!(store.counts().unwrap(), first);
        assert_eq!(
            first,
            TableCounts {
                comparisons: 1,
                differences: 1,
                exceptions: 0
            }
        );
    }

    #[test]
    fn test_reingest_replaces_children() {
        let store = ComparisonStore::in_memory().unwrap();
        store
            .upsert(&record("a", ResultType::ValueDifference, &["iob", "cob", "isf"]))
            .unwrap();
        store
            .upsert(&record("a", ResultType::Matching, &[]))
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.comparisons, 1);
        assert_eq!(counts.differences, 0);
        assert_eq!(
            store.comparison("a").unwrap().unwrap().result_type,
            ResultType::Matching
        );
        assert_eq!(store.orphan_count().unwrap(), 0);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = ComparisonStore::in_memory().unwrap();
        let result = store.read(|conn| {
            Ok(conn.execute(
                "INSERT INTO differences (comparison_id, key, js_value, swift_value)
                 VALUES ('ghost', 'iob', '1', '2')",
                [],
            )?)
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let store = ComparisonStore::open(temp_file.path()).unwrap();
            store
                .upsert(&record("persisted", ResultType::Matching, &[]))
                .unwrap();
        }
        let store = ComparisonStore::open(temp_file.path()).unwrap();
        assert_eq!(store.counts().unwrap().comparisons, 1);
    }

    #[test]
    fn test_concurrent_upserts_do_not_interleave() {
        let store = ComparisonStore::in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        let keys: Vec<String> = (0..=(round % 4)).map(|k| format!("k{}", k)).collect();
                        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                        // Half the threads fight over one id
                        let id = if i % 2 == 0 { "shared".to_string() } else { format!("own-{}", i) };
                        store
                            .upsert(&record(&id, ResultType::ValueDifference, &key_refs))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let counts = store.counts().unwrap();
        assert_eq!(counts.comparisons, 5);
        // Last round is 19, 19 % 4 == 3, so every id ends with four keys
        assert_eq!(store.differences_for("shared").unwrap().len(), 4);
        assert_eq!(counts.differences, 20);
        assert_eq!(store.orphan_count().unwrap(), 0);
    }
}
