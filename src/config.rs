//! Configuration for Conductor.
//!
//! Settings are resolved from environment variables with defaults; a
//! `.env` file is loaded via dotenvy early in startup. Server
//! registrations live in their own JSON file (see `remote::config`).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration for the runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub executor: ExecutorConfig,
    pub jobs: JobsConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            remote: RemoteConfig::resolve()?,
            executor: ExecutorConfig::resolve()?,
            jobs: JobsConfig::resolve()?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            executor: ExecutorConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

/// Remote tool client configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Handshake timeout for `connect()`.
    pub connect_timeout: Duration,
    /// Per-call timeout for discovery and invocation.
    pub call_timeout: Duration,
    /// Maximum retries for transient transport failures.
    /// With the default of 2, the client makes up to 3 total attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
    /// Path to the persisted server registrations.
    pub servers_path: PathBuf,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
            servers_path: default_servers_path(),
        }
    }
}

impl RemoteConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout: Duration::from_secs(parse_optional_env(
                "CONDUCTOR_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            call_timeout: Duration::from_secs(parse_optional_env(
                "CONDUCTOR_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            max_retries: parse_optional_env("CONDUCTOR_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_optional_env(
                "CONDUCTOR_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            servers_path: optional_env("CONDUCTOR_SERVERS_PATH")?
                .map(PathBuf::from)
                .unwrap_or(defaults.servers_path),
        })
    }
}

/// Default server registrations path (~/.conductor/servers.json).
pub fn default_servers_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conductor")
        .join("servers.json")
}

/// Workflow executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum independent steps dispatched concurrently within one job.
    pub step_fanout: usize,
    /// Byte budget for a step output substituted into a later parameter.
    /// Larger outputs are truncated before substitution.
    pub max_substitution_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_fanout: 4,
            max_substitution_bytes: 16 * 1024,
        }
    }
}

impl ExecutorConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let step_fanout = parse_optional_env("CONDUCTOR_STEP_FANOUT", defaults.step_fanout)?;
        if step_fanout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONDUCTOR_STEP_FANOUT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            step_fanout,
            max_substitution_bytes: parse_optional_env(
                "CONDUCTOR_MAX_SUBSTITUTION_BYTES",
                defaults.max_substitution_bytes,
            )?,
        })
    }
}

/// Async job manager configuration.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Number of worker tasks draining the job queue.
    pub workers: usize,
    /// Queue capacity; `submit` fails with `QueueFull` beyond this.
    pub queue_capacity: usize,
    /// How long finished jobs remain pollable before expiry.
    pub ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl JobsConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let workers = parse_optional_env("CONDUCTOR_JOB_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONDUCTOR_JOB_WORKERS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            workers,
            queue_capacity: parse_optional_env(
                "CONDUCTOR_JOB_QUEUE_CAPACITY",
                defaults.queue_capacity,
            )?,
            ttl: Duration::from_secs(parse_optional_env(
                "CONDUCTOR_JOB_TTL_SECS",
                defaults.ttl.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parse_optional_env(
                "CONDUCTOR_JOB_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
        })
    }
}

// Helper functions

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
