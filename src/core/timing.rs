//! Time a completed job spent in each of its phases, read from its log.
//!
//! ## Phases
//!
//! ```text
//! start ─ initializing ─ waiting ─ preprocessing ─ transferring ─ end
//! ```
//!
//! Every phase boundary is the first log line carrying one of the phase's
//! marker codes. Phases whose boundaries were not found count as zero. Start
//! and end fall back to the times recorded on the job itself.

use chrono::{DateTime, TimeDelta, Utc};

use super::matcher::{LogCriteria, matches};
use crate::api::models::{JobInstance, JobStatus, LogEntry};

/// Time spent in each phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeInfo {
    pub total: TimeDelta,
    pub initializing: TimeDelta,
    pub waiting: TimeDelta,
    pub preprocessing: TimeDelta,
    pub transferring: TimeDelta,
}

impl Default for JobTimeInfo {
    fn default() -> Self {
        Self {
            total: TimeDelta::zero(),
            initializing: TimeDelta::zero(),
            waiting: TimeDelta::zero(),
            preprocessing: TimeDelta::zero(),
            transferring: TimeDelta::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start,
    End,
    Waiting,
    Preprocessing,
    Transfer,
}

const PHASE_MARKERS: &[(LogCriteria<'static>, Marker)] = &[
    (LogCriteria::code("sssched", "SNBSCH5607J"), Marker::Start),
    (LogCriteria::code("sssched", "SNBSCH5674J"), Marker::End),
    // held by the job limit, or no drive available
    (LogCriteria::code("ssjobhnd", "SNBJH_3845J"), Marker::Waiting),
    (LogCriteria::code("ssjobhnd", "SNBJH_3439J"), Marker::Waiting),
    (LogCriteria::code("sssvh", "SNBSVH_278J"), Marker::Preprocessing),
    (LogCriteria::code("ssjobhnd", "SNBJH_3257J"), Marker::Transfer),
    (LogCriteria::code("sssvh", "SNBSVH_234J"), Marker::Transfer),
];

#[derive(Debug, Default)]
struct PhaseMarks {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    waiting: Option<DateTime<Utc>>,
    preprocessing: Option<DateTime<Utc>>,
    transfer: Option<DateTime<Utc>>,
}

impl PhaseMarks {
    fn scan(logs: &[LogEntry]) -> Self {
        let mut marks = Self::default();
        for entry in logs {
            let Some((_, marker)) = PHASE_MARKERS.iter().find(|(c, _)| matches(entry, c)) else {
                continue;
            };
            let slot = match marker {
                Marker::Start => &mut marks.start,
                Marker::End => &mut marks.end,
                Marker::Waiting => &mut marks.waiting,
                Marker::Preprocessing => &mut marks.preprocessing,
                Marker::Transfer => &mut marks.transfer,
            };
            slot.get_or_insert(entry.time);
        }
        marks
    }
}

/// Phase times found in `logs`, falling back to the job's own start and end.
pub fn extract_job_timings(job: &JobInstance, logs: &[LogEntry]) -> JobTimeInfo {
    let marks = PhaseMarks::scan(logs);
    let start = marks.start.unwrap_or(job.start_time);
    let end = marks.end.unwrap_or(job.end_time);
    let zero = TimeDelta::zero();

    let initializing = marks
        .waiting
        .or(marks.preprocessing)
        .or(marks.transfer)
        .map_or(zero, |next| next - start);

    let waiting = match (marks.waiting, marks.preprocessing.or(marks.transfer)) {
        (Some(begin), Some(next)) => next - begin,
        _ => zero,
    };

    let preprocessing = match (marks.preprocessing, marks.transfer) {
        (Some(begin), Some(next)) => next - begin,
        _ => zero,
    };

    let transferring = marks.transfer.map_or(zero, |begin| end - begin);

    JobTimeInfo {
        total: end - start,
        initializing,
        waiting,
        preprocessing,
        transferring,
    }
}

/// Phase times of `job`. Only completed jobs have them.
pub fn job_timings(job: &JobInstance, logs: &[LogEntry]) -> Option<JobTimeInfo> {
    (job.status() == JobStatus::Completed).then(|| extract_job_timings(job, logs))
}
