//! # Formatting and Console Helpers
//!
//! Small helpers used by the command-line front end to print verdicts and
//! report summaries in a readable way.
//!
//! - **Formatting**: elapsed times in milliseconds, byte counts, byte and
//!   request rates, percentages
//! - **Tables**: fixed-width rows and separators for console output
//! - **System**: worker thread count resolution
//!
//! ```rust
//! use loadtest_report::utils::*;
//!
//! assert_eq!(format_millis(250.0), "250ms");
//! assert_eq!(format_rate(1536.0), "1.50 KB/s");
//! assert_eq!(format_request_rate(15_500.0), "15.50K req/s");
//! ```

/// Format an elapsed time given in milliseconds.
///
/// ## Unit Selection
///
/// - **Milliseconds**: < 1 s, whole numbers (e.g., "250ms")
/// - **Seconds**: < 1 min, 2 decimal places (e.g., "1.50s")
/// - **Minutes and Hours**: compound form (e.g., "2m 5s", "1h 0m 0s")
///
/// Negative values are shown as zero.
///
/// ```rust
/// # use loadtest_report::utils::format_millis;
/// assert_eq!(format_millis(999.4), "999ms");
/// assert_eq!(format_millis(1500.0), "1.50s");
/// assert_eq!(format_millis(125_000.0), "2m 5s");
/// ```
pub fn format_millis(ms: f64) -> String {
    let ms = ms.max(0.0);
    if ms < 1_000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else {
        let seconds = (ms / 1_000.0) as u64;
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;
        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            format!("{}h {}m {}s", minutes / 60, minutes % 60, remaining_seconds)
        }
    }
}

/// Format a byte count with binary (1024-based) units.
///
/// ```rust
/// # use loadtest_report::utils::format_bytes;
/// assert_eq!(format_bytes(512.0), "512 B");
/// assert_eq!(format_bytes(2_621_440.0), "2.50 MB");
/// ```
pub fn format_bytes(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a byte rate, same scaling as [`format_bytes`].
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format a request rate with decimal (1000-based) scaling. Rates below
/// 10 req/s keep two decimals.
pub fn format_request_rate(requests_per_second: f64) -> String {
    if requests_per_second < 10.0 {
        format!("{:.2} req/s", requests_per_second)
    } else if requests_per_second < 1000.0 {
        format!("{:.0} req/s", requests_per_second)
    } else if requests_per_second < 1_000_000.0 {
        format!("{:.2}K req/s", requests_per_second / 1000.0)
    } else {
        format!("{:.2}M req/s", requests_per_second / 1_000_000.0)
    }
}

pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// One table row, each column left-aligned and padded to its width.
///
/// Columns without a width entry use 10 characters. Longer values are
/// not truncated.
///
/// ```rust
/// # use loadtest_report::utils::{table_row, table_separator};
/// let widths = [6, 5];
/// assert_eq!(table_separator(&widths), "+--------+-------+");
/// assert_eq!(table_row(&["login", "PASS"], &widths), "| login  | PASS  |");
/// ```
pub fn table_row(columns: &[&str], widths: &[usize]) -> String {
    let mut row = String::from("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        row.push_str(&format!(" {:width$} |", column, width = width));
    }
    row
}

pub fn table_separator(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for &width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }
    line
}

/// Resolve a requested worker count; 0 means one worker per logical CPU.
pub fn worker_count(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}
