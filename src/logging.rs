//! Logging and tracing initialization.
//!
//! Structured logging through the `tracing` ecosystem, with pretty console
//! output or JSON for machine parsing. Logs go to stderr so report tables on
//! stdout stay clean.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::api::HTTP_TRACE_TARGET;

/// Configuration for the logging system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
    /// Trace every request to and response from the server
    pub debug_requests: bool,
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(config: &LogConfig) -> String {
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let mut directives = format!("dpxreport={}", level.as_str().to_lowercase());
    if config.debug_requests {
        directives.push_str(&format!(",{}=trace", HTTP_TRACE_TARGET));
    }
    directives
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Call once, early in main(), after config is loaded. The log level can be
/// overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config)));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }
}
