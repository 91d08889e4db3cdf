//! Backup size of a job, read from its log.
//!
//! Each rule pairs a log code with a parser for the line text. A line whose
//! code matches but whose text does not parse is skipped. When several lines
//! feed the same field the last one wins.

use std::sync::LazyLock;

use regex::Regex;

use super::matcher::{LogCriteria, matches};
use crate::api::models::{JobInstance, JobStatus, LogEntry};

/// Data volume of a job, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSizeInfo {
    pub total_data_backed_up: i64,
    pub total_data_on_media: i64,
}

#[derive(Debug, Clone, Copy)]
enum SizeField {
    BackedUp,
    OnMedia,
}

struct SizeRule {
    criteria: LogCriteria<'static>,
    field: SizeField,
    parse: fn(&str) -> Option<i64>,
}

static BACKED_UP_KB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)total data backed up: (\d+) kb").expect("size regex is valid")
});
static ON_MEDIA_KB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)total data on media: (\d+) kb").expect("size regex is valid")
});
static DATA_VOLUME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)total data volume : (\d+) (kb|mb|gb|tb|pb)").expect("size regex is valid")
});

fn kilobytes(re: &Regex, text: &str) -> Option<i64> {
    let kb: i64 = re.captures(text)?.get(1)?.as_str().parse().ok()?;
    kb.checked_mul(1000)
}

fn backed_up_kb(text: &str) -> Option<i64> {
    kilobytes(&BACKED_UP_KB, text)
}

fn on_media_kb(text: &str) -> Option<i64> {
    kilobytes(&ON_MEDIA_KB, text)
}

/// The magnitude is divided by the unit, not multiplied. Existing reports
/// depend on this, so "5000 KB" reads as 5.
fn data_volume(text: &str) -> Option<i64> {
    let caps = DATA_VOLUME.captures(text)?;
    let magnitude: i64 = caps.get(1)?.as_str().parse().ok()?;
    let divisor: i64 = match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "tb" => 1_000_000_000_000,
        "pb" => 1_000_000_000_000_000,
        _ => return None,
    };
    Some(magnitude / divisor)
}

const SIZE_RULES: &[SizeRule] = &[
    SizeRule {
        criteria: LogCriteria::code("ssjobhnd", "SNBJH_3311J"),
        field: SizeField::BackedUp,
        parse: backed_up_kb,
    },
    SizeRule {
        criteria: LogCriteria::code("ssjobhnd", "SNBJH_3313J"),
        field: SizeField::OnMedia,
        parse: on_media_kb,
    },
    SizeRule {
        criteria: LogCriteria::code("sssvh", "SNBSVH_253J"),
        field: SizeField::BackedUp,
        parse: data_volume,
    },
];

/// Size information found in `logs`, or `None` when no line matched.
pub fn extract_job_size(logs: &[LogEntry]) -> Option<JobSizeInfo> {
    let mut info = JobSizeInfo::default();
    let mut found = false;

    for entry in logs {
        // First rule whose criteria match decides the line
        let Some(rule) = SIZE_RULES.iter().find(|r| matches(entry, &r.criteria)) else {
            continue;
        };
        let Some(bytes) = (rule.parse)(&entry.message) else {
            continue;
        };

        match rule.field {
            SizeField::BackedUp => info.total_data_backed_up = bytes,
            SizeField::OnMedia => info.total_data_on_media = bytes,
        }
        found = true;
    }

    found.then_some(info)
}

/// Size of `job`, or `None` when completion is required and the job did not complete.
pub fn job_size(job: &JobInstance, logs: &[LogEntry], only_completed: bool) -> Option<JobSizeInfo> {
    if only_completed && job.status() != JobStatus::Completed {
        return None;
    }
    extract_job_size(logs)
}
