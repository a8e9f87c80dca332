//! In-memory queue transport.
//!
//! Lists live in a `HashMap` behind an async lock; blocked consumers are
//! woken through a [`Notify`]. Useful for development, tests and
//! single-process deployments where persistence is not required.

use super::QueueTransport;
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// In-memory queue transport
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    /// Lists by queue name, head at the front
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    /// Wakes consumers blocked on an empty list
    available: Notify,
    /// Set once the queue is closed; every later call fails as a transport error
    closed: AtomicBool,
}

impl InMemoryQueue {
    /// Create an empty in-memory queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the queue, failing blocked and future calls with a transport error.
    ///
    /// Mimics a lost connection.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_waiters();
    }

    /// Reopen a closed queue. Items enqueued before closing are kept.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of the items in `queue`, head first.
    pub async fn items(&self, queue: &str) -> Vec<Vec<u8>> {
        let lists = self.lists.lock().await;
        lists
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_open(&self) -> ForgeResult<()> {
        if self.is_closed() {
            Err(ForgeError::transport_msg("in-memory queue is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn blocking_dequeue(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> ForgeResult<Option<Vec<u8>>> {
        loop {
            // Register interest before checking, so a push between the check
            // and the await is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Ok(None);
            }
            self.ensure_open()?;
            {
                let mut lists = self.lists.lock().await;
                if let Some(item) = lists.get_mut(queue).and_then(VecDeque::pop_front) {
                    tracing::trace!(queue, "dequeued item");
                    return Ok(Some(item));
                }
            }

            // Nothing has been popped yet, so giving up the wait is safe.
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = notified => {}
            }
        }
    }

    async fn enqueue(&self, queue: &str, item: Vec<u8>) -> ForgeResult<()> {
        self.ensure_open()?;
        {
            let mut lists = self.lists.lock().await;
            lists.entry(queue.to_string()).or_default().push_back(item);
        }
        self.available.notify_waiters();

        tracing::trace!(queue, "enqueued item");
        Ok(())
    }

    async fn length(&self, queue: &str) -> ForgeResult<u64> {
        self.ensure_open()?;
        let lists = self.lists.lock().await;
        Ok(lists.get(queue).map_or(0, |list| list.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn pop(queue: &InMemoryQueue, name: &str) -> ForgeResult<Option<Vec<u8>>> {
        queue.blocking_dequeue(name, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new();
        for i in 1..=3 {
            queue.enqueue("q", vec![i]).await.unwrap();
        }

        for i in 1..=3 {
            assert_eq!(pop(&queue, "q").await.unwrap(), Some(vec![i]));
        }
        assert_eq!(queue.length("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = InMemoryQueue::new();
        queue.enqueue("a", b"x".to_vec()).await.unwrap();

        assert_eq!(queue.length("a").await.unwrap(), 1);
        assert_eq!(queue.length("b").await.unwrap(), 0);
        assert!(queue.items("b").await.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_item() {
        let queue = Arc::new(InMemoryQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { pop(&queue, "q").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.enqueue("q", b"late".to_vec()).await.unwrap();
        let item = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(item, Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_dequeue_blocks_while_empty() {
        let queue = InMemoryQueue::new();
        let result = timeout(Duration::from_millis(50), pop(&queue, "q")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_wakes_blocked_consumer() {
        let queue = Arc::new(InMemoryQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.blocking_dequeue("q", &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        let result = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_dequeue_leaves_items_in_place() {
        let queue = InMemoryQueue::new();
        queue.enqueue("q", b"kept".to_vec()).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.blocking_dequeue("q", &cancel).await.unwrap(), None);
        assert_eq!(queue.items("q").await, vec![b"kept".to_vec()]);
    }

    #[tokio::test]
    async fn test_close_fails_blocked_consumers() {
        let queue = Arc::new(InMemoryQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { pop(&queue, "q").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.close();
        let result = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_transport());
        assert!(queue.enqueue("q", vec![]).await.is_err());

        queue.reopen();
        assert!(queue.enqueue("q", vec![1]).await.is_ok());
    }
}
