//! Worker loop.
//!
//! Each worker repeatedly pops one raw message from the queue, decodes it,
//! dispatches it through the [`HandlerRegistry`] and applies the
//! [`RetryPolicy`] to failures. Task-level outcomes never end the loop; only
//! a lost queue transport or cancellation does.

use crate::core::metrics::MetricsAggregator;
use crate::core::registry::HandlerRegistry;
use crate::core::retry::{RetryDecision, RetryPolicy};
use crate::error::{ForgeError, ForgeResult, ProcessingError};
use crate::logging::AuditSink;
use crate::queue::SharedQueue;
use crate::task::Task;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a worker needs, shared by all workers of a pool.
#[derive(Clone)]
pub struct WorkerContext {
    /// Queue transport
    pub queue: SharedQueue,
    /// Handler lookup
    pub registry: Arc<HandlerRegistry>,
    /// Shared counters
    pub metrics: Arc<MetricsAggregator>,
    /// What to do with failed attempts
    pub retry: RetryPolicy,
    /// Outcome log
    pub audit: Arc<dyn AuditSink>,
    /// Work queue name
    pub queue_name: String,
    /// Where exhausted tasks go, if anywhere
    pub dead_letter_queue: Option<String>,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("queue_name", &self.queue_name)
            .field("dead_letter_queue", &self.dead_letter_queue)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Why a worker loop returned.
#[derive(Debug)]
pub enum WorkerExit {
    /// The cancellation token fired
    Cancelled,
    /// The queue transport failed
    TransportLost(ForgeError),
}

/// What happened to one dequeued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Handler succeeded
    Succeeded,
    /// Handler failed; a copy with `retries` left went back on the queue
    Requeued {
        /// Budget carried by the requeued copy
        retries: u32,
    },
    /// Handler failed with no budget left
    Exhausted {
        /// Attempts made, this one included
        attempts: u32,
    },
    /// The message could not be decoded and was discarded
    Dropped,
}

/// A single queue consumer.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    /// Create worker `id` over the shared context.
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    /// Worker identifier, stable across restarts of the same slot.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Run until cancelled or the transport fails.
    ///
    /// The token is handed to the transport, which stops waiting at the next
    /// safe point. A message already taken off the queue is always finished
    /// first.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerExit {
        info!(worker_id = self.id, queue = %self.ctx.queue_name, "Worker started");

        let exit = loop {
            let received = self
                .ctx
                .queue
                .blocking_dequeue(&self.ctx.queue_name, &cancel)
                .await;

            let raw = match received {
                Ok(Some(raw)) => raw,
                Ok(None) => break WorkerExit::Cancelled,
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Dequeue failed");
                    break WorkerExit::TransportLost(e);
                }
            };

            self.refresh_queue_depth().await;

            match self.process(raw, &cancel).await {
                Ok(outcome) => debug!(worker_id = self.id, ?outcome, "Attempt finished"),
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Queue write failed");
                    break WorkerExit::TransportLost(e);
                }
            }
        };

        info!(worker_id = self.id, ?exit, "Worker stopped");
        exit
    }

    /// Handle one raw message.
    ///
    /// Errors are transport failures while writing a requeued or
    /// dead-lettered copy; every task-level failure is an `Ok` outcome.
    pub async fn process(
        &self,
        raw: Vec<u8>,
        cancel: &CancellationToken,
    ) -> ForgeResult<AttemptOutcome> {
        let task = match Task::decode(&raw) {
            Ok(task) => task,
            Err(e) => {
                warn!(worker_id = self.id, error = %e, "Dropping undecodable message");
                self.ctx.audit.log_dropped(&raw, &e.to_string());
                return Ok(AttemptOutcome::Dropped);
            }
        };

        let error = match self.dispatch(&task).await {
            Ok(()) => {
                self.ctx.metrics.record_success();
                self.ctx.audit.log_success(&task);
                return Ok(AttemptOutcome::Succeeded);
            }
            Err(error) => error,
        };

        self.ctx.metrics.record_failure();
        self.ctx.audit.log_failure(&task, &error);

        match self.ctx.retry.decide(&task, &error) {
            RetryDecision::Requeue { task: next, delay } => {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(worker_id = self.id, "Backoff cut short by shutdown");
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                let retries = next.retries;
                self.push(&self.ctx.queue_name, &next).await?;
                Ok(AttemptOutcome::Requeued { retries })
            }
            RetryDecision::Exhausted => {
                let attempts = task.attempts.saturating_add(1);
                let exhausted = ForgeError::Exhausted {
                    task_type: task.task_type.clone(),
                    attempts,
                };
                error!(worker_id = self.id, "{}", exhausted);
                self.ctx.audit.log_exhausted(&task, attempts);

                if let Some(dead_letter) = &self.ctx.dead_letter_queue {
                    self.push(dead_letter, &task).await?;
                }
                Ok(AttemptOutcome::Exhausted { attempts })
            }
        }
    }

    /// Run the handler, turning a panic into a handler error.
    async fn dispatch(&self, task: &Task) -> Result<(), ProcessingError> {
        debug!(worker_id = self.id, task_type = %task.task_type, "Dispatching task");

        match AssertUnwindSafe(self.ctx.registry.dispatch(task))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(worker_id = self.id, task_type = %task.task_type, "Handler panicked");
                Err(ProcessingError::handler(
                    task.task_type.clone(),
                    "handler panicked",
                ))
            }
        }
    }

    async fn push(&self, queue: &str, task: &Task) -> ForgeResult<()> {
        let encoded = task.encode()?;
        self.ctx.queue.enqueue(queue, encoded).await
    }

    async fn refresh_queue_depth(&self) {
        match self.ctx.queue.length(&self.ctx.queue_name).await {
            Ok(depth) => self.ctx.metrics.set_queue_depth(depth),
            Err(e) => warn!(worker_id = self.id, error = %e, "Could not read queue length"),
        }
    }
}
