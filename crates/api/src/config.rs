use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// A configuration variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{key} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development next to a
/// generation service on `localhost:8001`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Streams are exempt
    /// once their headers are sent.
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for task loops during shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Base URL of the external generation service.
    pub generation_service_url: String,
    /// Timeout for submission calls (default: `600`).
    pub submit_timeout_secs: u64,
    /// Timeout for progress polls (default: `10`).
    pub poll_timeout_secs: u64,
    /// Delay between progress polls of one task (default: `1000`).
    pub poll_interval_ms: u64,
    /// Age after which terminal tasks leave the live store (default: `3600`).
    pub task_retention_secs: u64,
    /// How often the retention sweeper runs (default: `300`).
    pub sweep_interval_secs: u64,
    /// Directory of the durable task log (default: `./data`).
    pub data_dir: PathBuf,
    /// Directory of project documents (default: `./projects`).
    pub projects_dir: PathBuf,
    /// Root for generated artifacts when a request names none (default: `./outputs`).
    pub output_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `HOST`                   | `0.0.0.0`                |
    /// | `PORT`                   | `3000`                   |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                     |
    /// | `GENERATION_SERVICE_URL` | `http://localhost:8001`  |
    /// | `SUBMIT_TIMEOUT_SECS`    | `600`                    |
    /// | `POLL_TIMEOUT_SECS`      | `10`                     |
    /// | `POLL_INTERVAL_MS`       | `1000`                   |
    /// | `TASK_RETENTION_SECS`    | `3600`                   |
    /// | `SWEEP_INTERVAL_SECS`    | `300`                    |
    /// | `DATA_DIR`               | `./data`                 |
    /// | `PROJECTS_DIR`           | `./projects`             |
    /// | `OUTPUT_DIR`             | `./outputs`              |
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_origins: Vec<String> = env_string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3000, "u16")?,
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30, "u64")?,
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 30, "u64")?,
            generation_service_url: env_string("GENERATION_SERVICE_URL", "http://localhost:8001"),
            submit_timeout_secs: env_parse("SUBMIT_TIMEOUT_SECS", 600, "u64")?,
            poll_timeout_secs: env_parse("POLL_TIMEOUT_SECS", 10, "u64")?,
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", 1000, "u64")?,
            task_retention_secs: env_parse("TASK_RETENTION_SECS", 3600, "u64")?,
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 300, "u64")?,
            data_dir: env_string("DATA_DIR", "./data").into(),
            projects_dir: env_string("PROJECTS_DIR", "./projects").into(),
            output_dir: env_string("OUTPUT_DIR", "./outputs").into(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Directory holding the per-kind task log documents.
    pub fn task_log_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: FromStr>(
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError {
            key,
            value,
            expected,
        }),
        Err(_) => Ok(default),
    }
}
