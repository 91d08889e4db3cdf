//! Predicate matching of log entries against (partial) criteria.

use chrono::{DateTime, Utc};

use crate::api::models::LogEntry;

/// Criteria a log entry must satisfy. Blank or omitted fields are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCriteria<'a> {
    pub module: Option<&'a str>,
    pub message_code: Option<&'a str>,
    pub source_ip: Option<&'a str>,
    pub message: Option<&'a str>,
    pub time: Option<DateTime<Utc>>,
}

impl<'a> LogCriteria<'a> {
    /// Criteria selecting one message code emitted by one module.
    pub const fn code(module: &'a str, message_code: &'a str) -> Self {
        Self {
            module: Some(module),
            message_code: Some(message_code),
            source_ip: None,
            message: None,
            time: None,
        }
    }
}

fn field_matches(value: &str, wanted: Option<&str>) -> bool {
    match wanted {
        Some(wanted) if !wanted.trim().is_empty() => value.eq_ignore_ascii_case(wanted),
        _ => true,
    }
}

/// Whether `entry` satisfies every non-blank criterion.
///
/// Strings compare case-insensitively but exactly; the time must be equal.
pub fn matches(entry: &LogEntry, criteria: &LogCriteria<'_>) -> bool {
    field_matches(&entry.module, criteria.module)
        && field_matches(&entry.message_code, criteria.message_code)
        && field_matches(&entry.source_ip, criteria.source_ip)
        && field_matches(&entry.message, criteria.message)
        && criteria.time.is_none_or(|time| entry.time == time)
}
