//! Redis queue transport for TaskForge.
//!
//! Each queue is a Redis list: producers and retries `RPUSH` at the tail,
//! workers `BLPOP` from the head.
//!
//! A blocking pop ties up the connection it runs on, so blocking dequeues
//! use dedicated connections from a small checkout pool, while `RPUSH` and
//! `LLEN` share a single [`ConnectionManager`].
//!
//! `BLPOP` runs in rounds bounded by the poll timeout. Cancellation is only
//! checked between rounds: a round is never abandoned, because an item the
//! server popped in it would otherwise be lost.

use super::QueueTransport;
use crate::config::{DurationExt, QueueConfig};
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, AsyncConnectionConfig, Client};

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redis queue transport
pub struct RedisQueue {
    /// Client used to open dedicated blocking connections
    client: Client,
    /// Shared connection for non-blocking commands
    conn: ConnectionManager,
    /// Idle dedicated connections for `BLPOP`
    blocking_pool: Mutex<Vec<MultiplexedConnection>>,
    /// Server-side timeout of one `BLPOP` round
    poll_timeout: Duration,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue")
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisQueue {
    /// Connect to Redis using the given connection string.
    pub async fn new(connection_string: &str, poll_timeout: Duration) -> ForgeResult<Self> {
        let client = Client::open(connection_string)
            .map_err(|e| ForgeError::transport("Failed to create Redis client", e))?;

        let conn = timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| ForgeError::transport_msg("Timed out connecting to Redis"))?
            .map_err(|e| ForgeError::transport("Failed to create Redis connection manager", e))?;

        info!("Connected to Redis queue transport");

        Ok(Self {
            client,
            conn,
            blocking_pool: Mutex::new(Vec::new()),
            poll_timeout,
        })
    }

    /// Connect using a queue configuration.
    pub async fn from_config(config: &QueueConfig) -> ForgeResult<Self> {
        Self::new(&config.connection_string, config.poll_timeout_secs.secs()).await
    }

    /// Take an idle blocking connection or open a new one.
    async fn checkout(&self) -> ForgeResult<MultiplexedConnection> {
        if let Some(conn) = self.blocking_pool.lock().await.pop() {
            return Ok(conn);
        }

        // The response timeout must outlive a full BLPOP round.
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(CONNECT_TIMEOUT)
            .set_response_timeout(self.poll_timeout + Duration::from_secs(5));

        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| ForgeError::transport("Failed to open blocking Redis connection", e))?;

        debug!("Opened dedicated blocking connection");
        Ok(conn)
    }

    async fn checkin(&self, conn: MultiplexedConnection) {
        self.blocking_pool.lock().await.push(conn);
    }
}

#[async_trait]
impl QueueTransport for RedisQueue {
    async fn blocking_dequeue(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> ForgeResult<Option<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut conn = self.checkout().await?;
        let poll_secs = self.poll_timeout.as_secs_f64();

        loop {
            let popped: Option<(String, Vec<u8>)> = conn
                .blpop(queue, poll_secs)
                .await
                .map_err(|e| ForgeError::transport("Failed to pop from Redis list", e))?;

            if let Some((_, item)) = popped {
                self.checkin(conn).await;
                return Ok(Some(item));
            }

            if cancel.is_cancelled() {
                debug!(queue, "Blocking dequeue cancelled between rounds");
                self.checkin(conn).await;
                return Ok(None);
            }
        }
    }

    async fn enqueue(&self, queue: &str, item: Vec<u8>) -> ForgeResult<()> {
        let mut conn = self.conn.clone();
        let _: u64 = conn
            .rpush(queue, item)
            .await
            .map_err(|e| ForgeError::transport("Failed to push to Redis list", e))?;

        debug!(queue, "Pushed item to Redis list");
        Ok(())
    }

    async fn length(&self, queue: &str) -> ForgeResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(queue).await?)
    }
}
