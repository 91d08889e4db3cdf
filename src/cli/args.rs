//! Command line arguments.
//!
//! Options that are also configuration keys serialize into the config layer
//! (see `AppConfig::new`). Unset options are skipped so they never mask the
//! config file or environment.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Args;
use serde::Serialize;

use crate::api::models::{JobRunType, JobStatus};
use crate::config::AppConfig;
use crate::core::query::JobQuery;

#[derive(Debug, Args, Serialize)]
pub struct ConnectionArgs {
    /// DPX master server to connect to (e.g. http://dpx-master.local)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// User to log in with
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password to log in with. Prompted for when not set
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(short, long)]
    pub password: Option<String>,

    /// Trace requests to and responses from the server
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    pub debug_requests: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    pub verbose: bool,

    /// Log as JSON
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// File to write the report to (.csv, .html or .htm)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not print the report to the console
    #[arg(long)]
    pub no_console: bool,
}

#[derive(Debug, Args, Serialize)]
pub struct JobQueryArgs {
    /// Report start: mm.dd.yyyy, mm.dd.yyyy,hh:mm:ss or RFC 3339
    #[serde(skip)]
    #[arg(short, long, value_parser = parse_report_date)]
    pub start: DateTime<Utc>,

    /// Report end, same formats as --start
    #[serde(skip)]
    #[arg(short, long, value_parser = parse_report_date)]
    pub end: Option<DateTime<Utc>>,

    /// Only jobs with this name (repeatable)
    #[serde(skip)]
    #[arg(long = "job-name")]
    pub job_names: Vec<String>,

    /// Only runs of this type: BASE, DIFF or INCR (repeatable)
    #[serde(skip)]
    #[arg(long = "job-type", value_parser = parse_run_type)]
    pub run_types: Vec<JobRunType>,

    /// Only jobs in this status, e.g. Completed or Failed (repeatable)
    #[serde(skip)]
    #[arg(long = "job-status", value_parser = parse_job_status)]
    pub statuses: Vec<JobStatus>,

    /// Timeout for fetching the log of one job, in milliseconds
    #[serde(rename = "query_timeout_ms", skip_serializing_if = "Option::is_none")]
    #[arg(long = "query-timeout", allow_negative_numbers = true)]
    pub query_timeout: Option<i64>,
}

impl JobQueryArgs {
    pub fn to_query(&self, config: &AppConfig) -> JobQuery {
        JobQuery {
            start: self.start,
            end: self.end,
            names: self.job_names.clone(),
            run_types: self.run_types.clone(),
            statuses: self.statuses.clone(),
            fetch: config.fetch_options(),
        }
    }
}

#[derive(Debug, Args, Serialize)]
pub struct LicenseArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Serialize)]
pub struct GetJobsArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,

    #[serde(flatten)]
    #[command(flatten)]
    pub query: JobQueryArgs,

    /// Include the volsers each job wrote to
    #[serde(skip)]
    #[arg(long)]
    pub include_volsers: bool,

    /// Only list volsers and how many jobs used them
    #[serde(skip)]
    #[arg(long)]
    pub only_volsers: bool,

    /// Include data sizes
    #[serde(skip)]
    #[arg(long)]
    pub include_size: bool,

    /// Only jobs whose retention has not expired
    #[serde(skip)]
    #[arg(long)]
    pub only_in_retention: bool,
}

#[derive(Debug, Args, Serialize)]
pub struct JobStatsArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,

    #[serde(flatten)]
    #[command(flatten)]
    pub query: JobQueryArgs,

    /// Always show data sizes in KB
    #[serde(skip)]
    #[arg(long)]
    pub no_data_units: bool,
}

#[derive(Debug, Args, Serialize)]
pub struct GetLogsArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,

    /// Job instance to get the log of
    #[serde(skip)]
    #[arg(short, long)]
    pub job_id: i64,

    /// Index of the first entry
    #[serde(skip)]
    #[arg(short, long, default_value_t = 0)]
    pub start: usize,

    /// Number of entries
    #[serde(skip)]
    #[arg(short, long, default_value_t = 500)]
    pub count: usize,

    /// Get the whole log, ignoring --start and --count
    #[serde(skip)]
    #[arg(short, long)]
    pub all_logs: bool,
}

#[derive(Debug, Args, Serialize)]
pub struct NodeGroupsArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Serialize)]
pub struct GetNodesArgs {
    #[serde(flatten)]
    #[command(flatten)]
    pub conn: ConnectionArgs,

    #[serde(skip)]
    #[command(flatten)]
    pub output: OutputArgs,

    /// Only the node with this name; --node-group and --node-type are ignored
    #[serde(skip)]
    #[arg(short, long)]
    pub name: Option<String>,

    /// Only nodes of this node group
    #[serde(skip)]
    #[arg(short = 'g', long)]
    pub node_group: Option<String>,

    /// Only nodes of this type
    #[serde(skip)]
    #[arg(short = 't', long)]
    pub node_type: Option<String>,
}

/// Parse a report date given in local time.
pub fn parse_report_date(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(s) {
        return Ok(time.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%m.%d.%Y,%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%m.%d.%Y")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid date `{s}`, expected mm.dd.yyyy or mm.dd.yyyy,hh:mm:ss"))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| format!("`{s}` does not exist in the local time zone"))
}

fn parse_run_type(s: &str) -> Result<JobRunType, String> {
    match JobRunType::parse(s) {
        JobRunType::None => Err(format!("unknown run type `{s}`, expected BASE, DIFF or INCR")),
        run_type => Ok(run_type),
    }
}

fn parse_job_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::from_name(s).ok_or_else(|| format!("unknown job status `{s}`"))
}
