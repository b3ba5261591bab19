use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};

/// Prefix of every environment variable the relay reads
const ENV_PREFIX: &str = "RELAY_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to actix's choice (one per physical core)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Single endpoint for both the WebSocket upgrade and the push API
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Close sessions that send nothing for this long. Unset means sessions
    /// are never closed for inactivity.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_path() -> String {
    "/relay".to_string()
}

fn default_max_frame_size() -> usize {
    256_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            path: default_path(),
            max_frame_size: default_max_frame_size(),
            idle_timeout_secs: None,
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load from `RELAY_*` environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let config: Config = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(AppError::Config(format!(
                "RELAY_PATH must start with '/', got {:?}",
                self.path
            )));
        }
        if self.max_frame_size == 0 {
            return Err(AppError::Config(
                "RELAY_MAX_FRAME_SIZE must be positive".to_string(),
            ));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(AppError::Config(
                "RELAY_IDLE_TIMEOUT_SECS must be positive when set".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(AppError::Config("RELAY_WORKERS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}
