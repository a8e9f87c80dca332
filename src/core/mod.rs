//! The TaskForge facade.
//!
//! `TaskForge` owns the queue transport, the handler registry and the
//! metrics aggregator, and starts or stops the worker pool over them.

use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::logging::{AuditSink, TracingAuditSink};
use crate::queue::SharedQueue;
use crate::task::Task;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod metrics;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod worker;

pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use pool::{PoolHandle, ShutdownReport, WorkerPool};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder, TaskHandler};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{AttemptOutcome, Worker, WorkerContext, WorkerExit};

/// Background task processor.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use taskforge::prelude::*;
///
/// # async fn example() -> ForgeResult<()> {
/// let registry = taskforge::handlers::register_builtin(HandlerRegistry::builder()).build();
/// let forge = TaskForge::new(ForgeConfig::testing(), Arc::new(InMemoryQueue::new()), registry)?;
///
/// forge.start().await?;
/// forge.enqueue(&Task::new("generate_pdf", Payload::from_iter([("id".to_string(), 1.into())]), 0)).await?;
/// let report = forge.stop().await?;
/// assert!(report.is_clean());
/// # Ok(())
/// # }
/// ```
pub struct TaskForge {
    config: ForgeConfig,
    queue: SharedQueue,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<MetricsAggregator>,
    audit: Arc<dyn AuditSink>,
    pool: RwLock<Option<PoolHandle>>,
}

impl std::fmt::Debug for TaskForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskForge")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl TaskForge {
    /// Create a stopped forge. The configuration is validated here.
    pub fn new(
        config: ForgeConfig,
        queue: SharedQueue,
        registry: HandlerRegistry,
    ) -> ForgeResult<Self> {
        config
            .validate()
            .map_err(|errors| ForgeError::config(errors.join("; ")))?;

        if registry.is_empty() {
            tracing::warn!("No task handlers registered; every task will fail");
        }

        Ok(Self {
            config,
            queue,
            registry: Arc::new(registry),
            metrics: Arc::new(MetricsAggregator::new()),
            audit: Arc::new(TracingAuditSink),
            pool: RwLock::new(None),
        })
    }

    /// Replace the audit sink used for task outcomes.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Spawn the worker pool. Returns immediately.
    pub async fn start(&self) -> ForgeResult<()> {
        let mut pool = self.pool.write().await;
        if pool.is_some() {
            return Err(ForgeError::AlreadyRunning);
        }

        let ctx = WorkerContext {
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            retry: RetryPolicy::new(self.config.retry.clone()),
            audit: Arc::clone(&self.audit),
            queue_name: self.config.queue.queue_name.clone(),
            dead_letter_queue: self.config.queue.dead_letter_queue.clone(),
        };
        *pool = Some(WorkerPool::start(&self.config.workers, ctx));

        tracing::info!(
            workers = self.config.workers.num_workers,
            task_types = ?self.registry.registered_types(),
            "TaskForge started"
        );
        Ok(())
    }

    /// Stop the pool, letting in-flight tasks finish.
    pub async fn stop(&self) -> ForgeResult<ShutdownReport> {
        let handle = self
            .pool
            .write()
            .await
            .take()
            .ok_or(ForgeError::NotRunning)?;

        let report = handle.stop().await;
        tracing::info!(?report, "TaskForge stopped");
        Ok(report)
    }

    /// Append `task` to the configured work queue.
    pub async fn enqueue(&self, task: &Task) -> ForgeResult<()> {
        let encoded = task.encode()?;
        self.queue
            .enqueue(&self.config.queue.queue_name, encoded)
            .await?;

        tracing::debug!(task_type = %task.task_type, retries = task.retries, "Task enqueued");
        Ok(())
    }

    /// Shared counters, also used by the HTTP surface.
    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    /// Whether the pool is running.
    pub async fn is_running(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Workers currently inside their loop, 0 when stopped.
    pub async fn active_workers(&self) -> usize {
        self.pool
            .read()
            .await
            .as_ref()
            .map_or(0, PoolHandle::active_workers)
    }

    /// The configuration in use.
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }
}
