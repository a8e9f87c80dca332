//! # TaskForge
//!
//! A background task worker pool for Rust applications.
//!
//! Producers push JSON tasks `{"type", "payload", "retries"}` onto a shared
//! queue. A fixed pool of workers pops them, dispatches each one to the
//! handler registered for its type, and requeues failed tasks while their
//! retry budget lasts.
//!
//! ## Features
//!
//! - **Handler registry**: new task types are added by registering a handler
//! - **Retry budget**: failed tasks go back to the tail of the queue, with
//!   optional backoff and an optional dead-letter list
//! - **Graceful shutdown**: workers finish their current task before exiting
//! - **Supervision**: workers that lose the queue connection are restarted
//! - **Metrics**: lock-free counters served over HTTP as JSON
//!   (and Prometheus text with the `prometheus` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskforge::prelude::*;
//!
//! struct Notify;
//!
//! #[async_trait]
//! impl TaskHandler for Notify {
//!     async fn execute(&self, payload: &Payload) -> Result<(), ProcessingError> {
//!         tracing::info!(user = ?payload.get("user"), "notifying");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ForgeResult<()> {
//!     let registry = HandlerRegistry::builder().register("notify", Notify).build();
//!     let forge = TaskForge::new(
//!         ForgeConfig::development(),
//!         Arc::new(InMemoryQueue::new()),
//!         registry,
//!     )?;
//!
//!     forge.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     forge.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod queue;
pub mod task;

pub mod prelude {
    pub use crate::config::{
        BackoffStrategy, ForgeConfig, LogLevel, LoggingConfig, QueueConfig, RetryConfig,
        ServerConfig, WorkerConfig,
    };
    pub use crate::core::{
        HandlerRegistry, HandlerRegistryBuilder, MetricsAggregator, MetricsSnapshot,
        ShutdownReport, TaskForge, TaskHandler,
    };
    pub use crate::error::{DecodeError, ForgeError, ForgeResult, ProcessingError};
    pub use crate::logging::{AuditSink, TracingAuditSink};
    pub use crate::queue::{InMemoryQueue, QueueTransport, SharedQueue};
    pub use crate::task::{Payload, Task};
    pub use async_trait::async_trait;

    #[cfg(feature = "redis-queue")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-queue")))]
    pub use crate::queue::RedisQueue;
}

pub use crate::config::ForgeConfig;
pub use crate::core::{HandlerRegistry, MetricsSnapshot, ShutdownReport, TaskForge, TaskHandler};
pub use crate::error::{ForgeError, ForgeResult, ProcessingError};
pub use crate::task::{Payload, Task};
pub use async_trait::async_trait;
