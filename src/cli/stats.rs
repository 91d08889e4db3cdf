use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use super::args::JobStatsArgs;
use super::emit_table;
use crate::context::AppContext;
use crate::core::query::{MetadataRequest, query_jobs_with_meta};
use crate::core::stats::{JobStatsInfo, StatsAggregator};
use crate::report::Table;
use crate::report::format::{format_data_size, format_duration, format_kb_floor, format_percent};

pub async fn run(ctx: &mut AppContext, args: &JobStatsArgs) -> Result<()> {
    let query = args.query.to_query(&ctx.config);
    let request = MetadataRequest {
        size: true,
        timings: true,
        ..Default::default()
    };

    let jobs = query_jobs_with_meta(&mut ctx.conn, &query, request, Utc::now())
        .await
        .context("Failed to query jobs")?;
    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    let mut aggregator = StatsAggregator::new();
    for job in &jobs {
        aggregator.add(job);
    }

    let groups = aggregator.finish();
    emit_table(&stats_table(&groups, args.no_data_units)?, &args.output).await;
    Ok(())
}

fn stats_table(groups: &[JobStatsInfo], no_data_units: bool) -> Result<Table> {
    let data = |bytes: f64| {
        if no_data_units {
            format_kb_floor(bytes)
        } else {
            format_data_size(bytes)
        }
    };

    let mut table = Table::with_header([
        "Job",
        "Total Data (Average)",
        "Data on Tape (Average)",
        "Time Between Runs (Average)",
        "Job Duration (Average)",
        "Initializing (Average)",
        "Waiting (Average)",
        "Preprocessing (Average)",
        "Transferring (Average)",
        "Successful Runs",
        "Failed Runs",
        "Success Rate",
    ]);

    for stats in groups {
        if stats.total_data.count() == 0 {
            warn!(job = %stats.name, "No run of this job has size information");
        }
        let phases = stats.average_phase_times();
        table.push_row([
            stats.name.clone(),
            data(stats.total_data.average()),
            data(stats.data_on_media.average()),
            format_duration(stats.average_time_between_runs()),
            format_duration(phases.total),
            format_duration(phases.initializing),
            format_duration(phases.waiting),
            format_duration(phases.preprocessing),
            format_duration(phases.transferring),
            stats.successful_runs.to_string(),
            stats.failed_runs.to_string(),
            format_percent(stats.success_rate()),
        ])?;
    }
    Ok(table)
}
