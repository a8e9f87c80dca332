//! Configuration types for TaskForge.
//!
//! This module contains all configuration structures used throughout TaskForge:
//! worker pool sizing, queue connection, retry backoff, the metrics listener
//! and logging. Configuration is loaded once at startup and never mutated.

use crate::error::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Default queue list name.
pub const DEFAULT_QUEUE_NAME: &str = "task_queue";

/// Main configuration for TaskForge.
///
/// # Examples
///
/// ```rust
/// use taskforge::config::{ForgeConfig, WorkerConfig};
///
/// let config = ForgeConfig {
///     workers: WorkerConfig::with_workers(8),
///     ..ForgeConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Worker-pool configuration
    pub workers: WorkerConfig,

    /// Queue transport configuration
    pub queue: QueueConfig,

    /// Retry backoff configuration
    pub retry: RetryConfig,

    /// Metrics listener configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Pool sizing, shutdown and restart settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub num_workers: usize,

    /// Time to wait for workers to finish their current task on stop (in seconds)
    pub shutdown_timeout_secs: u64,

    /// How many times a worker slot is restarted after losing the queue connection
    pub max_restarts: u32,

    /// Initial delay before restarting a worker (in milliseconds), doubled per restart
    pub restart_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_WORKERS,
            shutdown_timeout_secs: 30,
            max_restarts: 5,
            restart_delay_ms: 1000,
        }
    }
}

impl WorkerConfig {
    /// Defaults with `num_workers` workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Seconds `stop()` waits for workers before aborting them.
    pub fn with_shutdown_timeout(mut self, timeout_secs: u64) -> Self {
        self.shutdown_timeout_secs = timeout_secs;
        self
    }

    /// Set the restart limit and initial restart delay.
    pub fn with_restarts(mut self, max_restarts: u32, delay_ms: u64) -> Self {
        self.max_restarts = max_restarts;
        self.restart_delay_ms = delay_ms;
        self
    }

    /// Shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout_secs.secs()
    }
}

/// Queue transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Connection string (e.g. "redis://localhost:6379")
    pub connection_string: String,

    /// Name of the list workers pop from
    pub queue_name: String,

    /// Where exhausted tasks are archived; `None` means count-and-log only
    pub dead_letter_queue: Option<String>,

    /// Server-side timeout of a single blocking pop before it is reissued (in seconds)
    pub poll_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection_string: "redis://127.0.0.1:6379".to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            dead_letter_queue: None,
            poll_timeout_secs: 1,
        }
    }
}

impl QueueConfig {
    /// Create a queue configuration for the given connection string.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    /// Set the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    /// Archive exhausted tasks to the given list.
    pub fn with_dead_letter_queue(mut self, name: impl Into<String>) -> Self {
        self.dead_letter_queue = Some(name.into());
        self
    }
}

/// Delay applied before a failed task is requeued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Backoff strategy
    pub backoff: BackoffStrategy,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any retry delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffStrategy::None,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

impl RetryConfig {
    /// Requeue failed tasks immediately.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Exponential backoff starting at `base_delay_ms`.
    pub fn exponential(base_delay_ms: u64) -> Self {
        Self {
            backoff: BackoffStrategy::Exponential { multiplier: 2.0 },
            base_delay_ms,
            ..Default::default()
        }
    }

    /// Linear backoff: `base + (failures - 1) * increment`.
    pub fn linear(base_delay_ms: u64, increment_ms: u64) -> Self {
        Self {
            backoff: BackoffStrategy::Linear { increment_ms },
            base_delay_ms,
            ..Default::default()
        }
    }

    /// The same delay before every retry.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            backoff: BackoffStrategy::Fixed,
            base_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
        }
    }
}

/// How the retry delay grows with each failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// No delay
    None,

    /// Always the base delay
    Fixed,

    /// Linear backoff (base + (failures - 1) * increment)
    Linear {
        /// Added per further failure, in milliseconds
        increment_ms: u64,
    },

    /// Exponential backoff (base * multiplier^(failures - 1))
    Exponential {
        /// Growth factor per further failure
        multiplier: f64,
    },
}

/// Metrics listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the metrics endpoint binds to
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter, overridden by `RUST_LOG` when set
    pub level: LogLevel,

    /// Emit JSON lines instead of plain text
    pub json_format: bool,

    /// Print the event target
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            include_targets: false,
        }
    }
}

/// Minimum level for emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ForgeError::config(format!("unknown log level '{other}'"))),
        }
    }
}

/// Turns plain integers from configuration into `Duration`s.
pub trait DurationExt {
    /// `self` seconds
    fn secs(self) -> Duration;
    /// `self` milliseconds
    fn millis(self) -> Duration;
}

impl DurationExt for u64 {
    fn secs(self) -> Duration {
        Duration::from_secs(self)
    }

    fn millis(self) -> Duration {
        Duration::from_millis(self)
    }
}

impl ForgeConfig {
    /// Create a configuration for local development.
    pub fn development() -> Self {
        Self {
            workers: WorkerConfig {
                num_workers: 2,
                shutdown_timeout_secs: 10,
                ..Default::default()
            },
            server: ServerConfig {
                listen_addr: "127.0.0.1:8080".to_string(),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                include_targets: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a configuration for testing.
    pub fn testing() -> Self {
        Self {
            workers: WorkerConfig {
                num_workers: 1,
                shutdown_timeout_secs: 5,
                max_restarts: 2,
                restart_delay_ms: 10,
            },
            server: ServerConfig {
                listen_addr: "127.0.0.1:0".to_string(),
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                include_targets: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> ForgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Recognised keys: `REDIS_URL` (required), `QUEUE_NAME`,
    /// `DEAD_LETTER_QUEUE`, `PORT_WORKER`, `LISTEN_ADDR`, `WORKER_COUNT`,
    /// `LOG_LEVEL`, `LOG_FORMAT`.
    pub fn from_lookup<F>(lookup: F) -> ForgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.queue.connection_string = lookup("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ForgeError::config("REDIS_URL must be set"))?;

        if let Some(name) = lookup("QUEUE_NAME") {
            config.queue.queue_name = name;
        }
        config.queue.dead_letter_queue = lookup("DEAD_LETTER_QUEUE").filter(|q| !q.is_empty());

        if let Some(port) = lookup("PORT_WORKER") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ForgeError::config(format!("PORT_WORKER is not a port: '{port}'")))?;
            config.server.listen_addr = format!("0.0.0.0:{port}");
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Some(count) = lookup("WORKER_COUNT") {
            config.workers.num_workers = count.trim().parse().map_err(|_| {
                ForgeError::config(format!("WORKER_COUNT is not a number: '{count}'"))
            })?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level.parse()?;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        config.validate().map_err(|errors| ForgeError::config(errors.join("; ")))?;
        Ok(config)
    }

    /// Check the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.workers.num_workers == 0 {
            errors.push("Number of workers must be greater than 0".to_string());
        }

        if self.workers.num_workers > 1000 {
            errors.push("Number of workers should not exceed 1000".to_string());
        }

        if self.queue.queue_name.is_empty() {
            errors.push("Queue name must not be empty".to_string());
        }

        if self.queue.dead_letter_queue.as_deref() == Some(self.queue.queue_name.as_str()) {
            errors.push("Dead letter queue must differ from the work queue".to_string());
        }

        if self.queue.poll_timeout_secs == 0 {
            errors.push("Poll timeout must be greater than 0".to_string());
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push("Retry max delay must be greater than or equal to base delay".to_string());
        }

        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Listen address '{}' is not a socket address",
                self.server.listen_addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.workers.num_workers, DEFAULT_WORKERS);
        assert_eq!(config.queue.queue_name, "task_queue");
        assert!(matches!(config.retry.backoff, BackoffStrategy::None));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        let dev = ForgeConfig::development();
        assert_eq!(dev.workers.num_workers, 2);
        assert_eq!(dev.logging.level, LogLevel::Debug);
        assert!(dev.validate().is_ok());

        let testing = ForgeConfig::testing();
        assert_eq!(testing.workers.num_workers, 1);
        assert!(testing.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_with_required_keys_only() {
        let config = ForgeConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://cache:6379/2"),
            ("PORT_WORKER", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.queue.connection_string, "redis://cache:6379/2");
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.workers.num_workers, DEFAULT_WORKERS);
        assert_eq!(config.queue.dead_letter_queue, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ForgeConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://localhost"),
            ("QUEUE_NAME", "jobs"),
            ("DEAD_LETTER_QUEUE", "jobs:dead"),
            ("LISTEN_ADDR", "127.0.0.1:7000"),
            ("WORKER_COUNT", "12"),
            ("LOG_LEVEL", "warn"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.queue.queue_name, "jobs");
        assert_eq!(config.queue.dead_letter_queue.as_deref(), Some("jobs:dead"));
        assert_eq!(config.server.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.workers.num_workers, 12);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let missing = ForgeConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(missing, Err(ForgeError::Config { .. })));

        let bad_port = ForgeConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://localhost"),
            ("PORT_WORKER", "http"),
        ]));
        assert!(bad_port.is_err());

        let zero_workers = ForgeConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://localhost"),
            ("WORKER_COUNT", "0"),
        ]));
        let err = zero_workers.unwrap_err().to_string();
        assert!(err.contains("workers"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ForgeConfig::default();
        assert!(config.validate().is_ok());

        config.workers.num_workers = 0;
        assert!(config.validate().is_err());
        config.workers.num_workers = 1;

        config.queue.dead_letter_queue = Some(config.queue.queue_name.clone());
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("Dead letter")));
        config.queue.dead_letter_queue = None;

        config.server.listen_addr = ":8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_presets() {
        let fixed = RetryConfig::fixed(250);
        assert_eq!(fixed.base_delay_ms, 250);
        assert!(matches!(fixed.backoff, BackoffStrategy::Fixed));

        let exponential = RetryConfig::exponential(100);
        assert!(matches!(
            exponential.backoff,
            BackoffStrategy::Exponential { .. }
        ));

        let linear = RetryConfig::linear(100, 50);
        assert!(matches!(
            linear.backoff,
            BackoffStrategy::Linear { increment_ms: 50 }
        ));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.as_directive(), "error");
    }

    #[test]
    fn test_duration_ext() {
        assert_eq!(5u64.secs(), Duration::from_secs(5));
        assert_eq!(1500u64.millis(), Duration::from_millis(1500));
    }
}
