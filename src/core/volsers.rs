//! Tape volume serials (volsers) used by a job, read from its log.

use std::sync::LazyLock;

use regex::Regex;

use super::matcher::{LogCriteria, matches};
use crate::api::models::{JobInstance, JobStatus, LogEntry};

const VOLSER_USED: LogCriteria<'static> = LogCriteria::code("ssjobhnd", "SNBJH_3332J");

static VOLSER_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4}L[0-9]").expect("volser regex is valid"));

/// Volsers mentioned in `logs`, in log order and with duplicates.
pub fn extract_volsers(logs: &[LogEntry]) -> Vec<String> {
    logs.iter()
        .filter(|entry| matches(entry, &VOLSER_USED))
        .filter(|entry| VOLSER_SHAPE.is_match(&entry.message))
        .map(|entry| entry.message.clone())
        .collect()
}

/// Volsers of `job`, or `None` when completion is required and the job did not complete.
pub fn job_volsers(job: &JobInstance, logs: &[LogEntry], only_completed: bool) -> Option<Vec<String>> {
    if only_completed && job.status() != JobStatus::Completed {
        return None;
    }
    Some(extract_volsers(logs))
}
