use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub worker_threads: usize,
    pub round_duration_seconds: u64,
    pub round_rotation_delay_seconds: u64,
    pub round_retry_seconds: u64,
    pub rounds_file: PathBuf,
    pub rounds_cycle: bool,
    pub read_buffer_bytes: usize,
    pub max_line_bytes: usize,
    /// Requests, and separately responses, queued per connection before
    /// reading from that socket pauses.
    pub max_pending_requests: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            worker_threads: parse_var(&lookup, "WORKER_THREADS", defaults.worker_threads)?,
            round_duration_seconds: parse_var(
                &lookup,
                "ROUND_DURATION_SECONDS",
                defaults.round_duration_seconds,
            )?,
            round_rotation_delay_seconds: parse_var(
                &lookup,
                "ROUND_ROTATION_DELAY_SECONDS",
                defaults.round_rotation_delay_seconds,
            )?,
            round_retry_seconds: parse_var(
                &lookup,
                "ROUND_RETRY_SECONDS",
                defaults.round_retry_seconds,
            )?,
            rounds_file: lookup("ROUNDS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.rounds_file),
            rounds_cycle: parse_var(&lookup, "ROUNDS_CYCLE", defaults.rounds_cycle)?,
            read_buffer_bytes: parse_var(&lookup, "READ_BUFFER_BYTES", defaults.read_buffer_bytes)?,
            max_line_bytes: parse_var(&lookup, "MAX_LINE_BYTES", defaults.max_line_bytes)?,
            max_pending_requests: parse_var(
                &lookup,
                "MAX_PENDING_REQUESTS",
                defaults.max_pending_requests,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_THREADS must be at least 1".to_string(),
            ));
        }
        if self.round_duration_seconds == 0 {
            return Err(ConfigError::Invalid(
                "ROUND_DURATION_SECONDS must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_bytes == 0 {
            return Err(ConfigError::Invalid(
                "READ_BUFFER_BYTES must be at least 1".to_string(),
            ));
        }
        if self.max_pending_requests == 0 {
            return Err(ConfigError::Invalid(
                "MAX_PENDING_REQUESTS must be at least 1".to_string(),
            ));
        }
        if self.max_line_bytes < self.read_buffer_bytes {
            return Err(ConfigError::Invalid(format!(
                "MAX_LINE_BYTES ({}) must not be smaller than READ_BUFFER_BYTES ({})",
                self.max_line_bytes, self.read_buffer_bytes
            )));
        }
        self.host.parse::<IpAddr>().map_err(|_| ConfigError::InvalidValue {
            name: "HOST",
            value: self.host.clone(),
        })?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: "HOST",
                value: self.host.clone(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_duration_seconds)
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_secs(self.round_rotation_delay_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.round_retry_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4242,
            worker_threads: 4,
            round_duration_seconds: 300,
            round_rotation_delay_seconds: 5,
            round_retry_seconds: 30,
            rounds_file: PathBuf::from("./shared/rounds.json"),
            rounds_cycle: false,
            read_buffer_bytes: 8192,
            max_line_bytes: 65536,
            max_pending_requests: 64,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}
