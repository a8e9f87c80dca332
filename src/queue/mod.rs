//! Queue transports for TaskForge.
//!
//! Workers only need three list operations from the transport:
//! - **blocking dequeue** from the head, waiting until an item exists
//! - **enqueue** at the tail
//! - **length**, used for the queue-depth gauge
//!
//! Two transports are provided:
//! - **In-Memory**: single-process, used for tests and local runs
//! - **Redis**: the production transport, one list per queue name
//!
//! # Examples
//!
//! ```rust,no_run
//! use taskforge::queue::{InMemoryQueue, QueueTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> taskforge::ForgeResult<()> {
//! let queue = InMemoryQueue::new();
//! let cancel = CancellationToken::new();
//! queue.enqueue("task_queue", br#"{"type":"generate_pdf"}"#.to_vec()).await?;
//! let raw = queue.blocking_dequeue("task_queue", &cancel).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::ForgeResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub use memory::InMemoryQueue;

#[cfg(feature = "redis-queue")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-queue")))]
pub mod redis;

#[cfg(feature = "redis-queue")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-queue")))]
pub use self::redis::RedisQueue;

/// List-like store shared by all workers.
///
/// Every method is an individually atomic operation from the caller's point
/// of view. Errors returned here are transport failures.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Pop the head of `queue`, waiting until an item exists or `cancel`
    /// fires.
    ///
    /// Returns `Ok(None)` on cancellation. An item the store already handed
    /// out is always returned, even if `cancel` fired meanwhile, so callers
    /// must not race this future against the token and drop it.
    async fn blocking_dequeue(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> ForgeResult<Option<Vec<u8>>>;

    /// Append `item` at the tail of `queue`.
    async fn enqueue(&self, queue: &str, item: Vec<u8>) -> ForgeResult<()>;

    /// Approximate number of items waiting in `queue`.
    async fn length(&self, queue: &str) -> ForgeResult<u64>;
}

/// Convenient type alias for a shared transport
pub type SharedQueue = std::sync::Arc<dyn QueueTransport>;
