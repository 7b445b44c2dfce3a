//! Report Rendering
//!
//! Plain-text summaries of store analytics and file-tree statistics.

use std::fmt::Write;

use crate::aggregate::StoreReport;
use crate::file_stats::{most_common, FileStats};
use crate::ingest::IngestSummary;

/// `1234567` -> `1,234,567`
pub fn thousands<T: Into<i128>>(n: T) -> String {
    let n: i128 = n.into();
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn render_ingest_summary(summary: &IngestSummary) -> String {
    format!(
        "=== Ingestion ===\n\
         Files: {} seen, {} ingested, {} skipped\n\
         Records: {} stored, {} legacy, {} simulator, {} rejected\n\
         Normalization warnings: {}\n",
        summary.files_seen,
        summary.files_ingested,
        summary.files_skipped,
        thousands(summary.records_stored),
        summary.records_legacy,
        summary.records_simulator,
        summary.records_rejected,
        summary.normalization_warnings,
    )
}

pub fn render_store_report(report: &StoreReport) -> String {
    let mut out = String::new();
    let o = &report.overall;

    let _ = write!(
        out,
        "\n=== Overall Statistics ===\n\
         Total Comparisons: {}\n\
         Unique Devices: {}\n\
         App Versions: {}\n\
         Functions: {}\n",
        thousands(o.total_comparisons),
        o.unique_devices,
        o.unique_versions,
        o.unique_functions,
    );

    out.push_str("\n=== Result Type Distribution ===\n");
    for r in &report.results {
        let _ = writeln!(out, "{}: {} ({:.1}%)", r.result_type, thousands(r.count), r.percentage);
    }

    out.push_str("\n=== Function Statistics ===\n");
    for f in &report.functions {
        let _ = write!(
            out,
            "\n{}:\n  Total: {}\n  Matching: {}\n  Differences: {}\n  Devices: {}\n",
            f.function,
            thousands(f.total),
            thousands(f.matching),
            thousands(f.value_differences),
            f.devices,
        );
    }

    out.push_str("\n=== Duration Statistics ===\n");
    for d in &report.durations {
        let _ = write!(
            out,
            "\n{}:\n  Avg JS Duration: {:.4}\n  Avg Swift Duration: {:.4}\n  Avg Difference: {:.4}\n  ({})\n",
            d.function,
            d.avg_js,
            d.avg_swift,
            d.avg_diff,
            d.verdict.label(),
        );
    }

    let e = &report.errors;
    let _ = writeln!(out, "\n=== Errors (non-matching): {} ===", thousands(e.total_errors));
    push_counts(&mut out, "By Day", &e.by_day);
    push_counts(&mut out, "By Function", &e.by_function);
    push_counts(&mut out, "By App Version", &e.by_version);
    push_counts(&mut out, "By Device", &e.by_device);

    if !report.exceptions.is_empty() {
        push_counts(&mut out, "Exceptions by Side", &report.exceptions);
    }

    out.push_str("\n=== Most Common Value Differences ===\n");
    for k in &report.top_differences {
        let _ = writeln!(
            out,
            "{}: {} occurrences in {} comparisons",
            k.key,
            thousands(k.occurrences),
            thousands(k.comparisons),
        );
    }

    out
}

pub fn render_file_stats(stats: &FileStats) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "\n--- Statistics Report ---\n\
         Total Comparisons (excluding simulators): {}\n\
         Total Errors (excluding simulators): {}\n",
        thousands(stats.total_comparisons),
        thousands(stats.total_errors),
    );
    if stats.files_skipped > 0 {
        let _ = writeln!(out, "Files skipped: {}", stats.files_skipped);
    }

    let by_day: Vec<(String, u64)> = stats
        .errors_by_day
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    push_counts(&mut out, "Errors by Day", &by_day);
    push_counts(&mut out, "Errors by Function", &most_common(&stats.errors_by_function));
    push_counts(&mut out, "Errors by App Version", &most_common(&stats.errors_by_version));
    push_counts(&mut out, "Errors by Device", &most_common(&stats.errors_by_device));

    out.push_str("\n--- Timing Statistics by Function ---\n");
    for t in stats.timing() {
        let _ = write!(
            out,
            "\n{}:\n  Avg JS Duration: {:.4}\n  Avg Swift Duration: {:.4}\n  Avg Difference (Swift - JS): {:.4}\n  ({})\n",
            t.function,
            t.avg_js,
            t.avg_swift,
            t.avg_diff,
            t.verdict.label(),
        );
    }
    out.push_str("------------------------\n");

    out
}

fn push_counts<N: std::fmt::Display>(out: &mut String, title: &str, rows: &[(String, N)]) {
    let _ = writeln!(out, "\n{}:", title);
    for (name, n) in rows {
        let _ = writeln!(out, "  {}: {}", name, n);
    }
}
