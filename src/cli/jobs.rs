use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::args::GetJobsArgs;
use super::emit_table;
use crate::api::models::{JobInstance, JobRunType};
use crate::context::AppContext;
use crate::core::query::{JobWithMeta, MetadataRequest, query_jobs_with_meta};
use crate::report::Table;
use crate::report::format::{format_data_size, format_datetime, format_duration};

pub async fn run(ctx: &mut AppContext, args: &GetJobsArgs) -> Result<()> {
    let query = args.query.to_query(&ctx.config);
    let request = MetadataRequest {
        volsers: args.include_volsers || args.only_volsers,
        // sizes are not shown in the volser listing
        size: args.include_size && !args.only_volsers,
        timings: false,
        only_in_retention: args.only_in_retention,
    };
    let now = Utc::now();

    let jobs = query_jobs_with_meta(&mut ctx.conn, &query, request, now)
        .await
        .context("Failed to query jobs")?;
    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    let table = if args.only_volsers {
        volser_usage_table(&jobs)?
    } else {
        jobs_table(&jobs, now)?
    };
    emit_table(&table, &args.output).await;

    print_last_runs(&jobs, args.only_in_retention, now);
    Ok(())
}

fn jobs_table(jobs: &[JobWithMeta], now: DateTime<Utc>) -> Result<Table> {
    let mut table = Table::with_header([
        "Start Time",
        "End Time",
        "Duration",
        "ID",
        "Name",
        "Protocol",
        "Type",
        "Retention (days)",
        "Days since run",
        "RC",
        "Status",
        "Data Backed up",
        "Data on Tape",
        "Volsers Used",
    ]);

    for m in jobs {
        let job = &m.job;
        let (backed_up, on_media) = match &m.size {
            Some(size) => (
                format_data_size(size.total_data_backed_up as f64),
                format_data_size(size.total_data_on_media as f64),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        let volsers = m
            .volsers
            .as_ref()
            .filter(|v| !v.is_empty())
            .map_or_else(|| "-".to_string(), |v| v.join(", "));

        table.push_row([
            format_datetime(job.start_time),
            format_datetime(job.end_time),
            format_duration(job.run_duration()),
            job.id.to_string(),
            job.display_name.clone(),
            job.job_type.to_string(),
            job.run_type.to_string(),
            job.retention_days.to_string(),
            job.days_since_end(now).to_string(),
            job.return_code.to_string(),
            job.status().to_string(),
            backed_up,
            on_media,
            volsers,
        ])?;
    }
    Ok(table)
}

/// Each volser with the number of jobs that wrote to it, in first-seen order.
fn volser_usage(jobs: &[JobWithMeta]) -> Vec<(String, usize)> {
    let mut usage: Vec<(String, usize)> = Vec::new();
    for volser in jobs.iter().filter_map(|m| m.volsers.as_ref()).flatten() {
        match usage.iter_mut().find(|(v, _)| v == volser) {
            Some((_, count)) => *count += 1,
            None => usage.push((volser.clone(), 1)),
        }
    }
    usage
}

fn volser_usage_table(jobs: &[JobWithMeta]) -> Result<Table> {
    let mut table = Table::with_header(["Volser", "Used by Jobs"]);
    for (volser, count) in volser_usage(jobs) {
        table.push_row([volser, count.to_string()])?;
    }
    Ok(table)
}

/// Latest run (by end time) of each run type.
#[derive(Debug, Default)]
struct LastRuns<'a> {
    base: Option<&'a JobInstance>,
    diff: Option<&'a JobInstance>,
    incr: Option<&'a JobInstance>,
}

/// Latest runs, or `None` when the jobs belong to more than one job name.
fn last_runs(jobs: &[JobWithMeta]) -> Option<LastRuns<'_>> {
    let name = &jobs.first()?.job.name;
    if jobs.iter().any(|m| &m.job.name != name) {
        return None;
    }

    let mut last = LastRuns::default();
    for job in jobs.iter().map(|m| &m.job) {
        let slot = match job.run_type {
            JobRunType::Base => &mut last.base,
            JobRunType::Diff => &mut last.diff,
            JobRunType::Incr => &mut last.incr,
            JobRunType::None => continue,
        };
        if slot.is_none_or(|current| job.end_time > current.end_time) {
            *slot = Some(job);
        }
    }
    Some(last)
}

fn print_last_runs(jobs: &[JobWithMeta], only_in_retention: bool, now: DateTime<Utc>) {
    let Some(last) = last_runs(jobs) else {
        println!("Instances of more than one job were found, last run statistics not available.");
        return;
    };

    println!(
        "Last backup runs{}:",
        if only_in_retention {
            " still in retention"
        } else {
            ""
        }
    );
    for (label, job) in [("BASE", last.base), ("DIFF", last.diff), ("INCR", last.incr)] {
        match job {
            Some(job) => println!(
                " {}: {} finished {} days ago on {}",
                label,
                job.id,
                job.days_since_end(now),
                format_datetime(job.end_time)
            ),
            None => println!(" No {} backup found!", label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::size::JobSizeInfo;

    fn meta(id: i64, name: &str, run_type: &str, end: &str, volsers: &[&str]) -> JobWithMeta {
        let job = serde_json::from_value(serde_json::json!({
            "job_instance_id": id,
            "job_name": name,
            "job_display_name": name,
            "job_instance_run_type": run_type,
            "job_instance_type_grouping": "file",
            "retention_days": 30,
            "rc": 0,
            "start_time": "2024-03-01T22:00:00Z",
            "end_time": end,
            "duration": 3_725_000,
            "status": "http://dpx/app/api/job_instance_statuses/COMPLETED",
        }))
        .unwrap();

        JobWithMeta {
            job,
            volsers: Some(volsers.iter().map(|v| v.to_string()).collect()),
            size: None,
            timings: None,
        }
    }

    #[test]
    fn test_volser_usage_counts_in_first_seen_order() {
        let jobs = vec![
            meta(1, "A", "BASE", "2024-03-02T00:00:00Z", &["0002L6", "0001L6"]),
            meta(2, "A", "INCR", "2024-03-03T00:00:00Z", &["0001L6"]),
            meta(3, "A", "INCR", "2024-03-04T00:00:00Z", &[]),
        ];

        assert_eq!(
            volser_usage(&jobs),
            vec![("0002L6".to_string(), 1), ("0001L6".to_string(), 2)]
        );
    }

    #[test]
    fn test_last_runs_picks_latest_end_per_type() {
        let jobs = vec![
            meta(1, "A", "BASE", "2024-03-02T00:00:00Z", &[]),
            meta(2, "A", "INCR", "2024-03-05T00:00:00Z", &[]),
            meta(3, "A", "INCR", "2024-03-03T00:00:00Z", &[]),
        ];

        let last = last_runs(&jobs).unwrap();
        assert_eq!(last.base.map(|j| j.id), Some(1));
        assert_eq!(last.incr.map(|j| j.id), Some(2));
        assert!(last.diff.is_none());
    }

    #[test]
    fn test_last_runs_needs_a_single_job_name() {
        let jobs = vec![
            meta(1, "A", "BASE", "2024-03-02T00:00:00Z", &[]),
            meta(2, "B", "BASE", "2024-03-02T00:00:00Z", &[]),
        ];
        assert!(last_runs(&jobs).is_none());
    }

    #[test]
    fn test_jobs_table_row() {
        let mut job = meta(7, "NIGHTLY", "BASE", "2024-03-01T23:02:05Z", &["0001L6", "0002L6"]);
        job.size = Some(JobSizeInfo {
            total_data_backed_up: 1_500_000,
            total_data_on_media: 0,
        });
        let now = DateTime::parse_from_rfc3339("2024-03-11T23:02:05Z")
            .unwrap()
            .with_timezone(&Utc);

        let csv = jobs_table(&[job], now).unwrap().to_csv();
        assert_eq!(
            csv.lines().nth(1),
            Some(
                "2024.03.01, 22:00:00;2024.03.01, 23:02:05;01:02:05;7;NIGHTLY;File;BASE;30;10;0;Completed;1.5 MB;0 B;0001L6, 0002L6;"
            )
        );
    }
}
