//! Worker pool with per-slot restart supervision.
//!
//! The pool spawns one supervised slot per configured worker. A slot runs a
//! [`Worker`] loop; when the loop ends because the transport was lost, the
//! slot waits and starts a fresh worker, up to `max_restarts` times.
//! Stopping the pool cancels a shared token and waits for every slot.

use crate::config::{DurationExt, WorkerConfig};
use crate::core::worker::{Worker, WorkerContext, WorkerExit};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound of the restart backoff.
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(30);

/// How a slot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotExit {
    /// Stopped through cancellation
    Stopped,
    /// Ran out of restarts after repeated transport failures
    GaveUp,
}

/// Summary returned by [`PoolHandle::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Slots that stopped on cancellation
    pub clean: usize,
    /// Slots that had given up or panicked
    pub errored: usize,
    /// Slots aborted after the shutdown timeout
    pub timed_out: usize,
}

impl ShutdownReport {
    /// Whether every slot stopped cleanly.
    pub fn is_clean(&self) -> bool {
        self.errored == 0 && self.timed_out == 0
    }
}

/// Starts worker pools.
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `config.num_workers` supervised workers on the current runtime.
    pub fn start(config: &WorkerConfig, ctx: WorkerContext) -> PoolHandle {
        let ctx = Arc::new(ctx);
        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let restart_delay = config.restart_delay_ms.millis();

        info!(
            workers = config.num_workers,
            queue = %ctx.queue_name,
            "Starting worker pool"
        );

        let slots = (0..config.num_workers)
            .map(|id| {
                let slot = Slot {
                    id,
                    ctx: Arc::clone(&ctx),
                    cancel: cancel.clone(),
                    active: Arc::clone(&active),
                    max_restarts: config.max_restarts,
                    restart_delay,
                };
                tokio::spawn(slot.supervise())
            })
            .collect();

        PoolHandle {
            cancel,
            slots,
            active,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct PoolHandle {
    cancel: CancellationToken,
    slots: Vec<JoinHandle<SlotExit>>,
    active: Arc<AtomicUsize>,
    shutdown_timeout: Duration,
}

impl PoolHandle {
    /// Number of workers currently inside their loop.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of supervised slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Signal every worker to finish its current task, then wait for all of
    /// them within the shutdown timeout. Stragglers are aborted.
    pub async fn stop(self) -> ShutdownReport {
        info!(slots = self.slots.len(), "Stopping worker pool");
        self.cancel.cancel();

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut report = ShutdownReport::default();

        for (id, mut slot) in self.slots.into_iter().enumerate() {
            match timeout_at(deadline, &mut slot).await {
                Ok(Ok(SlotExit::Stopped)) => report.clean += 1,
                Ok(Ok(SlotExit::GaveUp)) => report.errored += 1,
                Ok(Err(e)) => {
                    error!(worker_id = id, error = %e, "Worker slot panicked");
                    report.errored += 1;
                }
                Err(_) => {
                    warn!(worker_id = id, "Worker did not stop in time, aborting");
                    slot.abort();
                    report.timed_out += 1;
                }
            }
        }

        info!(?report, "Worker pool stopped");
        report
    }
}

struct Slot {
    id: usize,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
    max_restarts: u32,
    restart_delay: Duration,
}

impl Slot {
    async fn supervise(self) -> SlotExit {
        let mut restarts = 0;
        let mut delay = self.restart_delay;

        loop {
            let exit = {
                let _active = ActiveGuard::enter(&self.active);
                Worker::new(self.id, Arc::clone(&self.ctx))
                    .run(self.cancel.clone())
                    .await
            };

            let error = match exit {
                WorkerExit::Cancelled => return SlotExit::Stopped,
                WorkerExit::TransportLost(error) => error,
            };

            if self.cancel.is_cancelled() {
                return SlotExit::Stopped;
            }

            if restarts >= self.max_restarts {
                error!(
                    worker_id = self.id,
                    restarts,
                    error = %error,
                    "Worker exhausted its restarts, slot is down"
                );
                return SlotExit::GaveUp;
            }
            restarts += 1;

            warn!(
                worker_id = self.id,
                restart = restarts,
                max_restarts = self.max_restarts,
                ?delay,
                error = %error,
                "Restarting worker after transport failure"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return SlotExit::Stopped,
                _ = sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RESTART_DELAY);
            debug!(worker_id = self.id, "Worker restarting");
        }
    }
}

/// Counts a worker as active for as long as it lives.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::worker::tests::{QUEUE, encoded, harness, wait_until};
    use crate::queue::QueueTransport;

    fn config(workers: usize) -> WorkerConfig {
        WorkerConfig::with_workers(workers)
            .with_shutdown_timeout(5)
            .with_restarts(2, 10)
    }

    #[tokio::test]
    async fn test_pool_processes_and_stops_cleanly() {
        let h = harness(None);
        let pool = WorkerPool::start(&config(3), (*h.ctx).clone());

        for _ in 0..10 {
            h.queue.enqueue(QUEUE, encoded("send_email", 0)).await.unwrap();
        }

        let metrics = Arc::clone(&h.metrics);
        wait_until(move || metrics.snapshot().jobs_done == 10).await;

        let active = Arc::clone(&pool.active);
        wait_until(move || active.load(Ordering::SeqCst) == 3).await;
        assert_eq!(pool.size(), 3);

        let report = pool.stop().await;
        assert_eq!(
            report,
            ShutdownReport {
                clean: 3,
                errored: 0,
                timed_out: 0
            }
        );
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failing_tasks_do_not_stop_the_pool() {
        let h = harness(None);
        let pool = WorkerPool::start(&config(2), (*h.ctx).clone());

        h.queue.enqueue(QUEUE, encoded("flaky", 1)).await.unwrap();
        h.queue.enqueue(QUEUE, b"garbage".to_vec()).await.unwrap();
        h.queue.enqueue(QUEUE, encoded("send_email", 0)).await.unwrap();

        let metrics = Arc::clone(&h.metrics);
        wait_until(move || {
            let s = metrics.snapshot();
            s.jobs_done == 1 && s.jobs_failed == 2
        })
        .await;

        assert_eq!(pool.active_workers(), 2);
        assert!(pool.stop().await.is_clean());
    }

    #[tokio::test]
    async fn test_slot_restarts_after_transport_recovers() {
        let h = harness(None);
        let cfg = WorkerConfig::with_workers(1)
            .with_shutdown_timeout(5)
            .with_restarts(5, 200);
        let pool = WorkerPool::start(&cfg, (*h.ctx).clone());

        let active = Arc::clone(&pool.active);
        wait_until(move || active.load(Ordering::SeqCst) == 1).await;

        h.queue.close();
        let active = Arc::clone(&pool.active);
        wait_until(move || active.load(Ordering::SeqCst) == 0).await;

        h.queue.reopen();
        h.queue.enqueue(QUEUE, encoded("send_email", 0)).await.unwrap();

        let metrics = Arc::clone(&h.metrics);
        wait_until(move || metrics.snapshot().jobs_done == 1).await;
        assert!(pool.stop().await.is_clean());
    }

    #[tokio::test]
    async fn test_slot_gives_up_after_max_restarts() {
        let h = harness(None);
        h.queue.close();
        let pool = WorkerPool::start(&config(2), (*h.ctx).clone());

        // 10ms then 20ms of restart backoff per slot
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.active_workers(), 0);

        let report = pool.stop().await;
        assert_eq!(report.errored, 2);
        assert_eq!(report.clean, 0);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_task() {
        use crate::core::registry::{HandlerRegistry, TaskHandler};
        use crate::error::ProcessingError;
        use crate::task::Payload;
        use async_trait::async_trait;
        use std::sync::atomic::AtomicBool;

        struct Slow(Arc<AtomicBool>);

        #[async_trait]
        impl TaskHandler for Slow {
            async fn execute(&self, _payload: &Payload) -> Result<(), ProcessingError> {
                self.0.store(true, Ordering::SeqCst);
                sleep(Duration::from_millis(200)).await;
                Ok(())
            }
        }

        let h = harness(None);
        let started = Arc::new(AtomicBool::new(false));
        let mut ctx = (*h.ctx).clone();
        ctx.registry = Arc::new(
            HandlerRegistry::builder()
                .register("slow", Slow(Arc::clone(&started)))
                .build(),
        );
        let pool = WorkerPool::start(&config(1), ctx);

        h.queue.enqueue(QUEUE, encoded("slow", 0)).await.unwrap();
        let flag = Arc::clone(&started);
        wait_until(move || flag.load(Ordering::SeqCst)).await;

        let report = pool.stop().await;
        assert!(report.is_clean());
        assert_eq!(h.metrics.snapshot().jobs_done, 1);
    }

    #[tokio::test]
    async fn test_stuck_worker_is_aborted_at_deadline() {
        use crate::core::registry::{HandlerRegistry, TaskHandler};
        use crate::error::ProcessingError;
        use crate::task::Payload;
        use async_trait::async_trait;

        struct Stuck;

        #[async_trait]
        impl TaskHandler for Stuck {
            async fn execute(&self, _payload: &Payload) -> Result<(), ProcessingError> {
                sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let h = harness(None);
        let mut ctx = (*h.ctx).clone();
        ctx.registry = Arc::new(HandlerRegistry::builder().register("stuck", Stuck).build());
        let cfg = WorkerConfig::with_workers(1).with_shutdown_timeout(0);
        let pool = WorkerPool::start(&cfg, ctx);

        h.queue.enqueue(QUEUE, encoded("stuck", 0)).await.unwrap();
        let queue = Arc::clone(&h.queue);
        let probe = tokio::spawn(async move {
            while queue.length(QUEUE).await.unwrap() > 0 {
                sleep(Duration::from_millis(5)).await;
            }
        });
        probe.await.unwrap();

        let report = pool.stop().await;
        assert_eq!(report.timed_out, 1);
    }
}
