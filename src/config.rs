//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `dpxreport.toml` in the working directory, or the file named by `DPXREPORT_CONFIG`
//! 3. `DPXREPORT_*` environment variables (e.g. `DPXREPORT_HOST`)
//! 4. Command line arguments

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::fetcher::{DEFAULT_BATCH_SIZE, FetchOptions};

pub const DEFAULT_CONFIG_FILE: &str = "dpxreport.toml";
pub const CONFIG_PATH_ENV: &str = "DPXREPORT_CONFIG";
pub const ENV_PREFIX: &str = "DPXREPORT_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] Box<figment::Error>),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// DPX master server, with or without scheme
    pub host: String,
    pub user: String,
    /// Prompted for when not set
    pub password: Option<String>,
    /// Log entries requested per batch
    pub log_batch_size: usize,
    /// Per-job log fetch timeout in milliseconds, `<= 0` for none
    pub query_timeout_ms: i64,
    /// New sessions to request per call after the server rejects the current one
    pub reauth_attempts: u32,
    pub request_timeout_secs: u64,
    pub debug_requests: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: None,
            log_batch_size: DEFAULT_BATCH_SIZE,
            query_timeout_ms: -1,
            reauth_attempts: 1,
            request_timeout_secs: 60,
            debug_requests: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("log_batch_size", &self.log_batch_size)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .field("reauth_attempts", &self.reauth_attempts)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load the configuration, with `cli` (if any) overriding every other source.
    ///
    /// `cli` must serialize to a map whose keys are config keys. Unset options
    /// should be skipped during serialization so they do not mask lower layers.
    pub fn new<T: Serialize>(cli: Option<&T>) -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(cli) = cli {
            figment = figment.merge(Serialized::defaults(cli));
        }

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        if self.log_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "log_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::with_timeout_ms(self.log_batch_size, self.query_timeout_ms)
    }
}
