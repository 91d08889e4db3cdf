//! Per-job statistics over many runs.
//!
//! Runs are grouped by job name and run type (`{name}_{RunType}`), so the full
//! and incremental runs of one job are reported separately. Groups keep the
//! order in which they were first seen.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use super::query::JobWithMeta;
use super::timing::JobTimeInfo;

/// Plain arithmetic mean, zero when empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningAverage {
    sum: f64,
    count: u64,
}

impl RunningAverage {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Aggregate of all runs of one job and run type.
#[derive(Debug, Clone)]
pub struct JobStatsInfo {
    pub name: String,
    /// Bytes backed up per run, over runs with size information
    pub total_data: RunningAverage,
    /// Bytes written to media per run, over runs with size information
    pub data_on_media: RunningAverage,
    pub successful_runs: u64,
    pub failed_runs: u64,
    run_times: Vec<DateTime<Utc>>,
    phase_times: Vec<JobTimeInfo>,
}

impl JobStatsInfo {
    fn new(name: String) -> Self {
        Self {
            name,
            total_data: RunningAverage::default(),
            data_on_media: RunningAverage::default(),
            successful_runs: 0,
            failed_runs: 0,
            run_times: Vec::new(),
            phase_times: Vec::new(),
        }
    }

    /// Percentage of successful runs. Zero when there were no runs.
    pub fn success_rate(&self) -> f64 {
        let runs = self.successful_runs + self.failed_runs;
        if runs == 0 {
            return 0.0;
        }
        100.0 * self.successful_runs as f64 / runs as f64
    }

    /// Mean gap between consecutive run starts. Zero with fewer than two runs.
    pub fn average_time_between_runs(&self) -> TimeDelta {
        if self.run_times.len() < 2 {
            return TimeDelta::zero();
        }

        let mut sorted = self.run_times.clone();
        sorted.sort();

        let mut gaps = RunningAverage::default();
        for pair in sorted.windows(2) {
            gaps.add((pair[1] - pair[0]).num_milliseconds() as f64);
        }
        TimeDelta::milliseconds(gaps.average().round() as i64)
    }

    /// Mean time per phase over runs that have phase times.
    pub fn average_phase_times(&self) -> JobTimeInfo {
        if self.phase_times.is_empty() {
            return JobTimeInfo::default();
        }

        let mean = |phase: fn(&JobTimeInfo) -> TimeDelta| {
            let mut avg = RunningAverage::default();
            for times in &self.phase_times {
                avg.add(phase(times).num_milliseconds() as f64);
            }
            TimeDelta::milliseconds(avg.average().round() as i64)
        };

        JobTimeInfo {
            total: mean(|t| t.total),
            initializing: mean(|t| t.initializing),
            waiting: mean(|t| t.waiting),
            preprocessing: mean(|t| t.preprocessing),
            transferring: mean(|t| t.transferring),
        }
    }
}

/// Key grouping the runs of one job and run type.
pub fn group_key(job: &JobWithMeta) -> String {
    format!("{}_{}", job.job.name, job.job.run_type)
}

/// Folds jobs into per-group statistics.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    groups: Vec<JobStatsInfo>,
    jobs: usize,
    jobs_without_size: usize,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: &JobWithMeta) {
        let key = group_key(job);
        let index = match self.groups.iter().position(|g| g.name == key) {
            Some(index) => index,
            None => {
                self.groups.push(JobStatsInfo::new(key));
                self.groups.len() - 1
            }
        };
        let stats = &mut self.groups[index];
        self.jobs += 1;

        match &job.size {
            Some(size) => {
                stats.total_data.add(size.total_data_backed_up as f64);
                stats.data_on_media.add(size.total_data_on_media as f64);
            }
            None => {
                info!(job = %stats.name, job_id = job.job.id, "Job has no size information");
                self.jobs_without_size += 1;
            }
        }

        stats.run_times.push(job.job.start_time);
        if let Some(times) = job.timings {
            stats.phase_times.push(times);
        }

        if job.job.status().is_failed() {
            stats.failed_runs += 1;
        } else {
            stats.successful_runs += 1;
        }
    }

    /// Number of jobs seen without size information.
    pub fn jobs_without_size(&self) -> usize {
        self.jobs_without_size
    }

    /// Whether more than 10% of the jobs lack size information.
    pub fn size_info_mostly_missing(&self) -> bool {
        self.jobs > 0 && self.jobs_without_size * 10 > self.jobs
    }

    /// Warning to show when size information is mostly missing.
    pub fn missing_size_warning(&self) -> Option<String> {
        self.size_info_mostly_missing().then(|| {
            format!(
                "{} of {} jobs (> 10%) have no size information. Try increasing \
                 --query-timeout, a low timeout or a slow network can cause this",
                self.jobs_without_size, self.jobs
            )
        })
    }

    /// Finish aggregation, returning groups in first-seen order.
    ///
    /// Logs a warning when more than 10% of the jobs lack size information.
    pub fn finish(self) -> Vec<JobStatsInfo> {
        if let Some(message) = self.missing_size_warning() {
            warn!(
                jobs = self.jobs,
                without_size = self.jobs_without_size,
                "{message}"
            );
        }
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::size::JobSizeInfo;
    use chrono::TimeZone;

    fn job(name: &str, run_type: &str, status: &str, day: u32, size: Option<i64>) -> JobWithMeta {
        let job = serde_json::from_value(serde_json::json!({
            "job_instance_id": day,
            "job_name": name,
            "job_instance_run_type": run_type,
            "start_time": Utc.with_ymd_and_hms(2024, 3, day, 22, 0, 0).unwrap().to_rfc3339(),
            "end_time": Utc.with_ymd_and_hms(2024, 3, day, 23, 0, 0).unwrap().to_rfc3339(),
            "status": format!("http://dpx/app/api/job_instance_statuses/{status}"),
        }))
        .unwrap();

        JobWithMeta {
            job,
            volsers: None,
            size: size.map(|bytes| JobSizeInfo {
                total_data_backed_up: bytes,
                total_data_on_media: bytes / 2,
            }),
            timings: None,
        }
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::default();
        assert_eq!(avg.average(), 0.0);
        avg.add(2.0);
        avg.add(4.0);
        assert_eq!(avg.average(), 3.0);
        assert_eq!(avg.count(), 2);
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let mut agg = StatsAggregator::new();
        agg.add(&job("A", "BASE", "COMPLETED", 1, Some(1000)));
        agg.add(&job("B", "BASE", "COMPLETED", 2, Some(1000)));
        agg.add(&job("A", "BASE", "FAILED", 3, Some(3000)));
        agg.add(&job("A", "INCR", "COMPLETED", 4, Some(10)));

        let groups = agg.finish();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["A_BASE", "B_BASE", "A_INCR"]);
    }

    #[test]
    fn test_success_rate_and_gap() {
        let mut agg = StatsAggregator::new();
        agg.add(&job("A", "BASE", "COMPLETED", 1, Some(1000)));
        agg.add(&job("B", "BASE", "COMPLETED", 2, Some(1000)));
        agg.add(&job("A", "BASE", "COMPLETED", 5, Some(3000)));
        agg.add(&job("A", "BASE", "FAILED", 3, None));

        let groups = agg.finish();
        let a = &groups[0];
        assert_eq!(a.successful_runs, 2);
        assert_eq!(a.failed_runs, 1);
        assert!((a.success_rate() - 66.67).abs() < 0.01);

        // Runs on days 1, 3 and 5: two gaps of two days each
        assert_eq!(a.average_time_between_runs(), TimeDelta::days(2));

        // Size averages only cover runs with size information
        assert_eq!(a.total_data.average(), 2000.0);
        assert_eq!(a.data_on_media.average(), 1000.0);
    }

    #[test]
    fn test_single_run_has_no_gap() {
        let mut agg = StatsAggregator::new();
        agg.add(&job("A", "BASE", "COMPLETED", 1, Some(1)));
        let groups = agg.finish();
        assert_eq!(groups[0].average_time_between_runs(), TimeDelta::zero());
    }

    #[test]
    fn test_missing_size_threshold() {
        let mut agg = StatsAggregator::new();
        for day in 1..=10 {
            agg.add(&job("A", "BASE", "COMPLETED", day, Some(1)));
        }
        agg.add(&job("A", "BASE", "COMPLETED", 11, None));
        // 1 of 11 is below 10%
        assert!(!agg.size_info_mostly_missing());

        agg.add(&job("A", "BASE", "COMPLETED", 12, None));
        // 2 of 12 is above
        assert!(agg.size_info_mostly_missing());
        assert_eq!(agg.jobs_without_size(), 2);
    }

    #[test]
    fn test_missing_size_warning_text() {
        let mut agg = StatsAggregator::new();
        agg.add(&job("A", "BASE", "COMPLETED", 1, Some(1)));
        assert_eq!(agg.missing_size_warning(), None);

        agg.add(&job("A", "BASE", "FAILED", 2, None));
        let message = agg.missing_size_warning().unwrap();
        assert!(message.starts_with("1 of 2 jobs (> 10%)"));
        assert!(message.contains("--query-timeout"));

        assert_eq!(agg.finish().len(), 1);
    }

    #[test]
    fn test_average_phase_times() {
        let mut with_times = job("A", "BASE", "COMPLETED", 1, Some(1));
        with_times.timings = Some(JobTimeInfo {
            total: TimeDelta::minutes(10),
            transferring: TimeDelta::minutes(6),
            ..Default::default()
        });
        let mut other = job("A", "BASE", "COMPLETED", 2, Some(1));
        other.timings = Some(JobTimeInfo {
            total: TimeDelta::minutes(20),
            transferring: TimeDelta::minutes(10),
            ..Default::default()
        });

        let mut agg = StatsAggregator::new();
        agg.add(&with_times);
        agg.add(&other);
        agg.add(&job("A", "BASE", "FAILED", 3, Some(1)));

        let avg = agg.finish()[0].average_phase_times();
        assert_eq!(avg.total, TimeDelta::minutes(15));
        assert_eq!(avg.transferring, TimeDelta::minutes(8));
        assert_eq!(avg.waiting, TimeDelta::zero());
    }
}
