//! Cell formatting for report tables.

use chrono::{DateTime, TimeDelta, Utc};

const DATA_UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Format with at most two decimals, dropping trailing zeros (`1.5`, `2`, `66.67`).
pub fn format_decimal(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Human readable data size in decimal units (`1.5 MB`).
pub fn format_data_size(bytes: f64) -> String {
    let mut size = bytes;
    let mut unit = 0;
    while size >= 1000.0 && unit < DATA_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{} {}", format_decimal(size), DATA_UNITS[unit])
}

/// Data size in whole kilobytes, rounded down (`1234KB`).
pub fn format_kb_floor(bytes: f64) -> String {
    format!("{}KB", (bytes / 1000.0).floor() as i64)
}

/// `hh:mm:ss`, where hours may exceed 24.
pub fn format_duration(duration: TimeDelta) -> String {
    let sign = if duration < TimeDelta::zero() { "-" } else { "" };
    let secs = duration.num_seconds().unsigned_abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// `yyyy.MM.dd, HH:mm:ss`
pub fn format_datetime(time: DateTime<Utc>) -> String {
    time.format("%Y.%m.%d, %H:%M:%S").to_string()
}

/// Percentage with up to two decimals (`66.67 %`).
pub fn format_percent(value: f64) -> String {
    format!("{} %", format_decimal(value))
}
