//! Wire types of the DPX master server REST API.
//!
//! The server is not under our control and is loose with its JSON: strings and
//! numbers show up as `null`, enum-like fields carry values we do not know, and
//! timestamps sometimes omit the offset. Decoding here is lenient so a single odd
//! record never fails a whole response.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Backup mode of a job instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobRunType {
    #[default]
    None,
    Base,
    Diff,
    Incr,
}

impl JobRunType {
    /// Parse a run type case-insensitively. Unknown values map to `None`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "BASE" => Self::Base,
            // Older servers spell differential runs DIFR
            "DIFF" | "DIFR" => Self::Diff,
            "INCR" => Self::Incr,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Base => "BASE",
            Self::Diff => "DIFF",
            Self::Incr => "INCR",
        }
    }
}

/// Job type grouping as reported by the server (the common ones).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobType {
    #[default]
    None,
    File,
    Block,
    Agentless,
    Ndmp,
    Catalog,
}

impl JobType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "block" => Self::Block,
            "agentless" => Self::Agentless,
            "ndmp" => Self::Ndmp,
            "catalog" => Self::Catalog,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::File => "File",
            Self::Block => "Block",
            Self::Agentless => "Agentless",
            Self::Ndmp => "NDMP",
            Self::Catalog => "Catalog",
        }
    }
}

/// Run status of a job instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[default]
    None,
    Aborted,
    Cancelled,
    Cancelling,
    Completed,
    Failed,
    Held,
    Resuming,
    Running,
    Suspended,
    Suspending,
}

impl JobStatus {
    pub const ALL: [JobStatus; 11] = [
        Self::None,
        Self::Aborted,
        Self::Cancelled,
        Self::Cancelling,
        Self::Completed,
        Self::Failed,
        Self::Held,
        Self::Resuming,
        Self::Running,
        Self::Suspended,
        Self::Suspending,
    ];

    /// Parse a status name case-insensitively (e.g. `COMPLETED`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(name))
    }

    /// Resolve the status from a status URL, whose last path segment names it.
    ///
    /// Anything that is not an absolute URL ending in a known status name
    /// resolves to `JobStatus::None`.
    pub fn from_status_url(url: &str) -> Self {
        status_url_segment(url)
            .as_deref()
            .and_then(Self::from_name)
            .unwrap_or(Self::None)
    }

    /// Whether a job in this status counts as a failed run.
    pub fn is_failed(&self) -> bool {
        !matches!(
            self,
            Self::Running | Self::Resuming | Self::Completed | Self::Held
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Aborted => "Aborted",
            Self::Cancelled => "Cancelled",
            Self::Cancelling => "Cancelling",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Held => "Held",
            Self::Resuming => "Resuming",
            Self::Running => "Running",
            Self::Suspended => "Suspended",
            Self::Suspending => "Suspending",
        }
    }
}

/// Operating system group of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeOsGroup {
    Windows,
    Linux,
    Unix,
    Ndmp,
    #[default]
    Unknown,
}

impl NodeOsGroup {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "unix" => Self::Unix,
            "ndmp" => Self::Ndmp,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Unix => "Unix",
            Self::Ndmp => "NDMP",
            Self::Unknown => "Unknown",
        }
    }
}

macro_rules! lenient_str_enum {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Option::<serde_json::Value>::deserialize(deserializer)?;
                Ok(value
                    .as_ref()
                    .and_then(serde_json::Value::as_str)
                    .map(<$ty>::parse)
                    .unwrap_or_default())
            }
        }
    )*};
}

lenient_str_enum!(JobRunType, JobType, NodeOsGroup);

/// Last path segment of an absolute status URL, as the server spells it.
pub fn status_url_segment(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(str::to_string)
}

/// Display information the server keeps for a job status.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusInfo {
    #[serde(rename = "display", default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(
        rename = "job_instance_status_name",
        default,
        deserialize_with = "null_as_default"
    )]
    pub status_name: String,
}

impl JobStatusInfo {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_name(&self.status_name).unwrap_or_default()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a timestamp, assuming UTC when the server leaves out the offset.
fn utc_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(DateTime::<Utc>::default());
    };

    if let Ok(time) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(time.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Format a timestamp the way the server expects it inside filters.
pub fn format_api_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
}

/// One instance (run) of a backup job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobInstance {
    #[serde(rename = "job_instance_id")]
    pub id: i64,
    #[serde(rename = "job_name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(
        rename = "job_display_name",
        default,
        deserialize_with = "null_as_default"
    )]
    pub display_name: String,
    #[serde(rename = "job_instance_run_type", default)]
    pub run_type: JobRunType,
    #[serde(rename = "job_instance_type_grouping", default)]
    pub job_type: JobType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub retention_days: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_data: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed_data: i64,
    #[serde(rename = "rc", default, deserialize_with = "null_as_default")]
    pub return_code: i32,
    #[serde(default, deserialize_with = "utc_time")]
    pub start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "utc_time")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "duration", default, deserialize_with = "null_as_default")]
    pub duration_ms: i64,
    #[serde(
        rename = "catalog_completed",
        default,
        deserialize_with = "null_as_default"
    )]
    pub cataloged: bool,
    #[serde(rename = "job_sched_id", default, deserialize_with = "null_as_default")]
    pub schedule_id: i64,
    #[serde(rename = "job", default)]
    pub job_url: Option<String>,
    #[serde(rename = "status", default)]
    pub status_url: Option<String>,
}

impl JobInstance {
    /// Status parsed from the status URL, without asking the server.
    pub fn status(&self) -> JobStatus {
        self.status_url
            .as_deref()
            .map(JobStatus::from_status_url)
            .unwrap_or_default()
    }

    pub fn run_duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.duration_ms)
    }

    /// Days since the job ended, rounded to the nearest day.
    pub fn days_since_end(&self, now: DateTime<Utc>) -> i64 {
        ((now - self.end_time).num_seconds() as f64 / 86_400.0).round() as i64
    }

    /// Whether the server still guarantees to retain this job at `now`.
    pub fn is_in_retention(&self, now: DateTime<Utc>) -> bool {
        let elapsed_days = (now - self.end_time).num_seconds() as f64 / 86_400.0;
        elapsed_days < self.retention_days as f64
    }
}

/// One entry of a job instance log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogEntry {
    #[serde(default, deserialize_with = "utc_time")]
    pub time: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub module: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_code: String,
}

/// One filter expression for the job instance query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterItem {
    #[serde(rename = "var")]
    pub target: String,
    #[serde(rename = "op")]
    pub operation: String,
    #[serde(rename = "val")]
    pub values: Vec<String>,
}

impl FilterItem {
    fn new(target: &str, operation: &str, values: Vec<String>) -> Self {
        Self {
            target: target.to_string(),
            operation: operation.to_string(),
            values,
        }
    }

    /// `=` for a single value, `in` for several.
    fn one_or_many(target: &str, values: Vec<String>) -> Self {
        let op = if values.len() > 1 { "in" } else { "=" };
        Self::new(target, op, values)
    }

    fn dedup_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    pub fn report_start(time: DateTime<Utc>) -> Self {
        Self::new("report_start_time", "=", vec![format_api_time(time)])
    }

    pub fn report_end(time: DateTime<Utc>) -> Self {
        Self::new("report_end_time", "=", vec![format_api_time(time)])
    }

    pub fn job_name_is<S: AsRef<str>>(names: &[S]) -> Self {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        Self::one_or_many("job_name", names)
    }

    pub fn job_name_is_not<S: AsRef<str>>(names: &[S]) -> Self {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        Self::new("job_name", "!=", names)
    }

    pub fn job_type(types: &[JobType]) -> Self {
        let values = Self::dedup_names(types.iter().map(JobType::as_str));
        Self::one_or_many("job_instance_type_grouping", values)
    }

    pub fn run_type(types: &[JobRunType]) -> Self {
        let values = Self::dedup_names(types.iter().map(JobRunType::as_str));
        Self::one_or_many("job_instance_run_type", values)
    }

    pub fn job_status(statuses: &[JobStatus]) -> Self {
        let values = Self::dedup_names(statuses.iter().map(JobStatus::as_str));
        Self::one_or_many("job_instance_status_name", values)
    }
}

/// A value with an optional unit, as used by license categories.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DimensionedValue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl fmt::Display for DimensionedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit.as_deref().map(str::trim) {
            Some(unit) if !unit.is_empty() => write!(f, "{} {}", self.value, unit),
            _ => write!(f, "{}", self.value),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseCategory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(rename = "licenseViolated", default, deserialize_with = "null_as_default")]
    pub violated: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub licensed: DimensionedValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumed: DimensionedValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<LicenseCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseResponse {
    #[serde(rename = "key", default)]
    pub license_key: Option<String>,
    #[serde(rename = "eval_license", default, deserialize_with = "null_as_default")]
    pub is_eval: bool,
    #[serde(rename = "expiration_days", default, deserialize_with = "null_as_default")]
    pub expires_in_days: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_node_name: String,
    #[serde(rename = "server_node_addr", default, deserialize_with = "null_as_default")]
    pub server_node_address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_host_name: String,
    #[serde(rename = "build_version", default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub build_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub build_time: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<LicenseCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeGroup {
    #[serde(rename = "node_group_name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(rename = "media_pool_name", default, deserialize_with = "null_as_default")]
    pub media_pool: String,
    #[serde(
        rename = "device_cluster_name",
        default,
        deserialize_with = "null_as_default"
    )]
    pub cluster_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creator: String,
    #[serde(default, deserialize_with = "utc_time")]
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "node_name", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "node_type", default, deserialize_with = "null_as_default")]
    pub node_type: String,
    #[serde(rename = "node_group_name", default, deserialize_with = "null_as_default")]
    pub group_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub server_name: String,
    #[serde(rename = "opsys", default)]
    pub os_group: NodeOsGroup,
    #[serde(rename = "osname", default, deserialize_with = "null_as_default")]
    pub os_name: String,
    #[serde(rename = "osversion", default, deserialize_with = "null_as_default")]
    pub os_version: String,
    #[serde(rename = "osrelease", default, deserialize_with = "null_as_default")]
    pub os_release: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creator: String,
    #[serde(default, deserialize_with = "utc_time")]
    pub creation_time: DateTime<Utc>,
    #[serde(
        rename = "node_feature_flags",
        default,
        deserialize_with = "null_as_default"
    )]
    pub feature_flags: Vec<String>,
}
