//! Paginated retrieval of a job instance log.
//!
//! The server hands out logs in fixed-size batches addressed by start index.
//! A batch shorter than the requested size marks the end of the log. An
//! optional wall-clock timeout can end the fetch early; the timeout is checked
//! only between batches, so one slow request can overrun it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::api::models::LogEntry;
use crate::api::{ApiError, Connection};

/// Default number of log entries requested per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Anything that can serve batches of a job instance log.
#[async_trait]
pub trait LogSource: Send {
    async fn fetch_batch(
        &mut self,
        job_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<LogEntry>, ApiError>;
}

#[async_trait]
impl LogSource for Connection {
    async fn fetch_batch(
        &mut self,
        job_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<LogEntry>, ApiError> {
        self.job_logs(job_id, start, count).await
    }
}

/// How to fetch a full log.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub batch_size: usize,
    /// Stop fetching once this much time has passed. `None` fetches everything.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: None,
        }
    }
}

impl FetchOptions {
    /// Build options from a millisecond timeout, where `<= 0` means unlimited.
    pub fn with_timeout_ms(batch_size: usize, timeout_ms: i64) -> Self {
        let timeout = u64::try_from(timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            batch_size,
            timeout,
        }
    }
}

/// Fetch the log of a job instance, in server order.
///
/// The result may be incomplete when the timeout elapsed. That is not an
/// error; callers treat the log as possibly truncated.
pub async fn fetch_all_logs<S>(
    source: &mut S,
    job_id: i64,
    options: FetchOptions,
) -> Result<Vec<LogEntry>, ApiError>
where
    S: LogSource + ?Sized,
{
    let batch_size = options.batch_size.max(1);
    let started = Instant::now();
    let mut logs: Vec<LogEntry> = Vec::new();

    loop {
        let batch = source.fetch_batch(job_id, logs.len(), batch_size).await?;
        let received = batch.len();
        logs.extend(batch);

        if received < batch_size {
            break;
        }

        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout {
                debug!(
                    job_id,
                    entries = logs.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Log fetch timed out, log may be incomplete"
                );
                break;
            }
        }
    }

    debug!(job_id, entries = logs.len(), "Fetched job log");
    Ok(logs)
}
