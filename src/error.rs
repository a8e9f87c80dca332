//! Error types for TaskForge operations.

use thiserror::Error;

/// Result type used throughout TaskForge.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Main error type for TaskForge operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// The queue transport is unreachable or the connection was lost
    #[error("Transport error: {message}")]
    Transport {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A raw queue message could not be decoded into a task
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A task attempt failed
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// A task failed and has no retry budget left
    #[error("Task of type '{task_type}' failed after {attempts} attempts")]
    Exhausted {
        /// Type tag of the exhausted task
        task_type: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The forge is already running
    #[error("TaskForge is already running")]
    AlreadyRunning,

    /// The forge is not running
    #[error("TaskForge is not running")]
    NotRunning,

    /// I/O error (listener binding, serving)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis connection error
    #[cfg(feature = "redis-queue")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-queue")))]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl ForgeError {
    /// Create a new transport error
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error with no underlying cause
    pub fn transport_msg(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error means the queue connection is gone.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            #[cfg(feature = "redis-queue")]
            Self::Redis(_) => true,
            _ => false,
        }
    }
}

/// A raw message that is not a valid task.
#[derive(Error, Debug)]
#[error("Malformed task message: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Why a single task attempt failed.
///
/// Every variant is recovered locally by the retry policy and never escapes
/// the worker loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The task carried no payload, or an empty one
    #[error("payload is empty")]
    EmptyPayload,

    /// The task type tag was empty
    #[error("task type is empty")]
    EmptyType,

    /// No handler is registered for the task type
    #[error("unsupported task type '{task_type}'")]
    UnsupportedType {
        /// The type tag that had no handler
        task_type: String,
    },

    /// The handler ran and reported a failure
    #[error("handler for '{task_type}' failed: {message}")]
    Handler {
        /// Type tag of the failing task
        task_type: String,
        /// Failure description from the handler
        message: String,
    },
}

impl ProcessingError {
    /// Create a handler failure
    pub fn handler(task_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            task_type: task_type.into(),
            message: message.into(),
        }
    }
}
