pub mod fetcher;
pub mod matcher;
pub mod query;
pub mod size;
pub mod stats;
pub mod timing;
pub mod volsers;

pub use fetcher::{FetchOptions, LogSource, fetch_all_logs};
pub use matcher::{LogCriteria, matches};
pub use query::{JobQuery, JobSource, JobWithMeta, MetadataRequest, query_jobs_with_meta};
pub use size::{JobSizeInfo, extract_job_size};
pub use stats::{JobStatsInfo, RunningAverage, StatsAggregator};
pub use timing::{JobTimeInfo, extract_job_timings};
pub use volsers::extract_volsers;
