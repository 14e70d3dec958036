//! CLI output formatting for catalog operations.
//!
//! Each operation has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure — no I/O, no side effects.

use crate::ops::InfoReport;
use crate::scheduler::IngestReport;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `add`'s ingestion summary.
pub fn format_add_report(report: &IngestReport) -> Vec<String> {
    let mut lines = vec![format!("Scanned {} files", report.scanned)];
    lines.push(format!("{}Imported: {}", indent(1), report.imported));
    if report.skipped > 0 {
        lines.push(format!("{}Skipped (already imported): {}", indent(1), report.skipped));
    }
    if report.failed > 0 {
        lines.push(format!("{}Failed: {}", indent(1), report.failed));
    }
    lines
}

pub fn print_add_report(report: &IngestReport) {
    for line in format_add_report(report) {
        println!("{line}");
    }
}

/// `info`'s archive summary.
pub fn format_info_report(report: &InfoReport) -> Vec<String> {
    let mut lines = vec![format!("{} records, {} bytes", report.record_count, report.total_bytes)];
    if let Some((first, last)) = &report.date_range {
        lines.push(format!("{}Date range: {} .. {}", indent(1), first, last));
    }
    if !report.maker_models.is_empty() {
        lines.push("Cameras".to_string());
        for (maker_model, count) in &report.maker_models {
            lines.push(format!("{}{} ({})", indent(1), maker_model, count));
        }
    }
    lines
}

pub fn print_info_report(report: &InfoReport) {
    for line in format_info_report(report) {
        println!("{line}");
    }
}

/// `del`/`rename`/`links`/`gallery`'s one-line count summaries.
pub fn format_count_report(verb: &str, count: usize) -> String {
    format!("{verb}: {count}")
}

pub fn print_count_report(verb: &str, count: usize) {
    println!("{}", format_count_report(verb, count));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_report_shows_imported_count() {
        let report = IngestReport {
            scanned: 10,
            imported: 8,
            skipped: 2,
            failed: 0,
            cancelled: false,
        };
        let lines = format_add_report(&report);
        assert!(lines[0].contains("Scanned 10"));
        assert!(lines.iter().any(|l| l.contains("Imported: 8")));
        assert!(lines.iter().any(|l| l.contains("Skipped")));
    }

    #[test]
    fn add_report_omits_zero_skipped_and_failed() {
        let report = IngestReport {
            scanned: 3,
            imported: 3,
            skipped: 0,
            failed: 0,
            cancelled: false,
        };
        let lines = format_add_report(&report);
        assert!(!lines.iter().any(|l| l.contains("Skipped")));
        assert!(!lines.iter().any(|l| l.contains("Failed")));
    }

    #[test]
    fn info_report_lists_cameras_by_frequency() {
        let report = InfoReport {
            record_count: 5,
            total_bytes: 1024,
            date_range: Some(("2020-01-01".to_string(), "2024-01-01".to_string())),
            maker_models: vec![("Nikon-D90".to_string(), 3), ("Canon-5D".to_string(), 2)],
        };
        let lines = format_info_report(&report);
        assert!(lines[0].contains("5 records"));
        assert!(lines.iter().any(|l| l.contains("Nikon-D90 (3)")));
    }

    #[test]
    fn count_report_formats_verb_and_number() {
        assert_eq!(format_count_report("Deleted", 4), "Deleted: 4");
    }
}
