//! Job query with log-derived metadata.
//!
//! ## Flow
//!
//! 1. Ask the server for job instances matching the report window, job names
//!    and statuses
//! 2. Filter run types and retention locally (the server cannot)
//! 3. For each remaining job, in server order, fetch its log once and run the
//!    requested extractors over it
//!
//! Metadata may be absent even when requested, e.g. when a log was truncated
//! by the query timeout.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::fetcher::{FetchOptions, LogSource, fetch_all_logs};
use super::size::{JobSizeInfo, job_size};
use super::timing::{JobTimeInfo, job_timings};
use super::volsers::job_volsers;
use crate::api::models::{FilterItem, JobInstance, JobRunType, JobStatus};
use crate::api::{ApiError, Connection};

/// Server side of a job query: job listings plus their logs.
#[async_trait]
pub trait JobSource: LogSource {
    async fn job_instances(&mut self, filters: &[FilterItem]) -> Result<Vec<JobInstance>, ApiError>;
}

#[async_trait]
impl JobSource for Connection {
    async fn job_instances(&mut self, filters: &[FilterItem]) -> Result<Vec<JobInstance>, ApiError> {
        Connection::job_instances(self, filters).await
    }
}

/// Which jobs to report on.
#[derive(Debug, Clone)]
pub struct JobQuery {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub names: Vec<String>,
    pub run_types: Vec<JobRunType>,
    pub statuses: Vec<JobStatus>,
    pub fetch: FetchOptions,
}

impl JobQuery {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            names: Vec::new(),
            run_types: Vec::new(),
            statuses: Vec::new(),
            fetch: FetchOptions::default(),
        }
    }

    /// Filters sent to the server. Run types are filtered locally.
    pub fn filters(&self) -> Vec<FilterItem> {
        let mut filters = vec![FilterItem::report_start(self.start)];
        if let Some(end) = self.end {
            filters.push(FilterItem::report_end(end));
        }
        if !self.names.is_empty() {
            filters.push(FilterItem::job_name_is(&self.names));
        }
        if !self.statuses.is_empty() {
            filters.push(FilterItem::job_status(&self.statuses));
        }
        filters
    }

    fn keeps_run_type(&self, run_type: JobRunType) -> bool {
        self.run_types.is_empty() || self.run_types.contains(&run_type)
    }
}

/// Metadata to attach to each job.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataRequest {
    pub volsers: bool,
    pub size: bool,
    pub timings: bool,
    /// Drop jobs whose retention has expired
    pub only_in_retention: bool,
}

impl MetadataRequest {
    fn needs_logs(&self) -> bool {
        self.volsers || self.size || self.timings
    }
}

/// A job with the metadata derived from its log.
#[derive(Debug, Clone)]
pub struct JobWithMeta {
    pub job: JobInstance,
    pub volsers: Option<Vec<String>>,
    pub size: Option<JobSizeInfo>,
    pub timings: Option<JobTimeInfo>,
}

/// Whether the server seems to lack records going back to `report_start`.
pub fn records_may_be_incomplete(jobs: &[JobInstance], report_start: DateTime<Utc>) -> bool {
    jobs.iter()
        .map(|job| job.start_time)
        .min()
        .is_some_and(|oldest| oldest - TimeDelta::days(1) >= report_start)
}

/// Query jobs and attach the requested metadata.
///
/// An empty result means no job matched.
pub async fn query_jobs_with_meta<S>(
    source: &mut S,
    query: &JobQuery,
    request: MetadataRequest,
    now: DateTime<Utc>,
) -> Result<Vec<JobWithMeta>, ApiError>
where
    S: JobSource + ?Sized,
{
    info!("Querying jobs");
    let mut jobs = source.job_instances(&query.filters()).await?;
    if jobs.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(oldest) = jobs.iter().min_by_key(|job| job.start_time) {
        info!(job = %oldest.name, started = %oldest.start_time, "Oldest job found");
    }
    if records_may_be_incomplete(&jobs, query.start) {
        warn!(
            report_start = %query.start,
            "Oldest job is newer than the report start, the server may not keep records that far back"
        );
    }

    jobs.retain(|job| query.keeps_run_type(job.run_type));
    if request.only_in_retention {
        jobs.retain(|job| {
            let keep = job.is_in_retention(now);
            if !keep {
                info!(job_id = job.id, "Job is out of retention");
            }
            keep
        });
    }

    let total = jobs.len();
    let mut results = Vec::with_capacity(total);
    for (index, job) in jobs.into_iter().enumerate() {
        info!(job_id = job.id, progress = %format!("{}/{}", index + 1, total), "Processing job");

        let logs = if request.needs_logs() {
            fetch_all_logs(source, job.id, query.fetch).await?
        } else {
            Vec::new()
        };

        let volsers = request
            .volsers
            .then(|| job_volsers(&job, &logs, false))
            .flatten();
        let size = request.size.then(|| job_size(&job, &logs, false)).flatten();
        let timings = request.timings.then(|| job_timings(&job, &logs)).flatten();
        debug!(
            job_id = job.id,
            volsers = volsers.as_ref().map_or(0, Vec::len),
            has_size = size.is_some(),
            has_timings = timings.is_some(),
            "Extracted job metadata"
        );

        results.push(JobWithMeta {
            job,
            volsers,
            size,
            timings,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job_at(day: u32) -> JobInstance {
        serde_json::from_value(serde_json::json!({
            "job_instance_id": day,
            "job_name": "NIGHTLY",
            "start_time": Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap().to_rfc3339(),
        }))
        .unwrap()
    }

    #[test]
    fn test_filters_skip_empty_criteria() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let query = JobQuery::new(start);
        let filters = query.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].target, "report_start_time");
    }

    #[test]
    fn test_filters_include_names_and_statuses() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let query = JobQuery {
            end: Some(Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap()),
            names: vec!["A".into(), "B".into()],
            run_types: vec![JobRunType::Base],
            statuses: vec![JobStatus::Failed],
            ..JobQuery::new(start)
        };

        let targets: Vec<_> = query.filters().into_iter().map(|f| f.target).collect();
        assert_eq!(
            targets,
            vec![
                "report_start_time",
                "report_end_time",
                "job_name",
                "job_instance_status_name"
            ]
        );
    }

    #[test]
    fn test_run_type_filter() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut query = JobQuery::new(start);
        assert!(query.keeps_run_type(JobRunType::Incr));

        query.run_types = vec![JobRunType::Base, JobRunType::Diff];
        assert!(query.keeps_run_type(JobRunType::Diff));
        assert!(!query.keeps_run_type(JobRunType::Incr));
        assert!(!query.keeps_run_type(JobRunType::None));
    }

    #[test]
    fn test_records_may_be_incomplete() {
        let jobs = vec![job_at(10), job_at(5)];

        let early_start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(records_may_be_incomplete(&jobs, early_start));

        let close_start = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        assert!(!records_may_be_incomplete(&jobs, close_start));

        assert!(!records_may_be_incomplete(&[], early_start));
    }
}
