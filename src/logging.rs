//! Logging setup and the task audit sink.

use crate::config::LoggingConfig;
use crate::error::{ForgeError, ForgeResult, ProcessingError};
use crate::task::Task;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bytes of an undecodable message kept in the audit log.
pub const DROPPED_PREVIEW_BYTES: usize = 128;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig) -> ForgeResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_format {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.include_targets),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(config.include_targets))
            .try_init()
    };

    result.map_err(|e| ForgeError::config(format!("failed to install subscriber: {e}")))
}

/// Records terminal outcomes of task attempts.
///
/// Implementations must be cheap and must not fail; they are called inline
/// from the worker loop.
pub trait AuditSink: Send + Sync {
    /// A task attempt succeeded.
    fn log_success(&self, task: &Task);

    /// A task attempt failed.
    fn log_failure(&self, task: &Task, error: &ProcessingError);

    /// A task failed with no retry budget left.
    fn log_exhausted(&self, task: &Task, attempts: u32) {
        let _ = (task, attempts);
    }

    /// A queue message could not be decoded and was discarded.
    fn log_dropped(&self, raw: &[u8], reason: &str) {
        let _ = (raw, reason);
    }
}

/// Audit sink writing to the `taskforge::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_success(&self, task: &Task) {
        tracing::info!(
            target: "taskforge::audit",
            task_type = %task.task_type,
            retries = task.retries,
            "task succeeded"
        );
    }

    fn log_failure(&self, task: &Task, error: &ProcessingError) {
        tracing::warn!(
            target: "taskforge::audit",
            task_type = %task.task_type,
            retries = task.retries,
            error = %error,
            "task failed"
        );
    }

    fn log_exhausted(&self, task: &Task, attempts: u32) {
        tracing::error!(
            target: "taskforge::audit",
            task_type = %task.task_type,
            attempts,
            "task failed after all retries"
        );
    }

    fn log_dropped(&self, raw: &[u8], reason: &str) {
        let preview = &raw[..raw.len().min(DROPPED_PREVIEW_BYTES)];
        tracing::error!(
            target: "taskforge::audit",
            bytes = raw.len(),
            truncated = preview.len() < raw.len(),
            raw = %String::from_utf8_lossy(preview),
            reason,
            "dropped undecodable message"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Audit event captured by [`RecordingAuditSink`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum AuditEvent {
        Success(String),
        Failure(String, ProcessingError),
        Exhausted(String, u32),
        Dropped(String),
    }

    /// Sink that keeps every event for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingAuditSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl RecordingAuditSink {
        pub fn events(&self) -> Vec<AuditEvent> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: AuditEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl AuditSink for RecordingAuditSink {
        fn log_success(&self, task: &Task) {
            self.push(AuditEvent::Success(task.task_type.clone()));
        }

        fn log_failure(&self, task: &Task, error: &ProcessingError) {
            self.push(AuditEvent::Failure(task.task_type.clone(), error.clone()));
        }

        fn log_exhausted(&self, task: &Task, attempts: u32) {
            self.push(AuditEvent::Exhausted(task.task_type.clone(), attempts));
        }

        fn log_dropped(&self, _raw: &[u8], reason: &str) {
            self.push(AuditEvent::Dropped(reason.to_string()));
        }
    }
}
