//! Redis List Queue
//!
//! Implements [`DurableQueue`] on a Redis list: `LPUSH` appends at the head,
//! `RPOP` takes from the tail, so the list behaves as a FIFO. The loader's
//! idle wait uses `BRPOP` with a timeout instead of polling.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionInfo, RedisError};

use crate::application::ports::{Connector, DurableQueue, QueueError};

/// Map a client error to a queue error.
///
/// Broken, refused, or timed-out connections must be re-acquired; anything
/// else (e.g. `WRONGTYPE`) leaves the connection usable.
#[must_use]
pub fn classify(error: &RedisError) -> QueueError {
    if error.is_connection_dropped()
        || error.is_io_error()
        || error.is_timeout()
        || error.is_connection_refusal()
    {
        QueueError::Connection(error.to_string())
    } else {
        QueueError::Command(error.to_string())
    }
}

fn map_err(error: RedisError) -> QueueError {
    classify(&error)
}

/// Opens multiplexed connections and checks them with `PING`.
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    /// Connector for the given server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection info is rejected by the client.
    pub fn new(info: ConnectionInfo) -> Result<Self, QueueError> {
        Client::open(info)
            .map(|client| Self { client })
            .map_err(map_err)
    }

    /// Connector for a `redis://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn from_url(url: &str) -> Result<Self, QueueError> {
        Client::open(url)
            .map(|client| Self { client })
            .map_err(map_err)
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Handle = RedisQueue;
    type Error = QueueError;

    fn target(&self) -> &str {
        "redis"
    }

    async fn connect(&self) -> Result<RedisQueue, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        Ok(RedisQueue { conn })
    }
}

/// One connection to the queue server.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

#[async_trait]
impl DurableQueue for RedisQueue {
    async fn push(&mut self, queue: &str, entry: &str) -> Result<(), QueueError> {
        let _: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(entry)
            .query_async(&mut self.conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn len(&mut self, queue: &str) -> Result<usize, QueueError> {
        redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut self.conn)
            .await
            .map_err(map_err)
    }

    async fn pop(&mut self, queue: &str) -> Result<Option<String>, QueueError> {
        redis::cmd("RPOP")
            .arg(queue)
            .query_async(&mut self.conn)
            .await
            .map_err(map_err)
    }

    async fn pop_wait(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        // A zero timeout would block forever.
        if timeout.is_zero() {
            return self.pop(queue).await;
        }

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(blocking_timeout_secs(timeout))
            .query_async(&mut self.conn)
            .await
            .map_err(map_err)?;

        Ok(popped.map(|(_, entry)| entry))
    }
}

/// BRPOP timeout in whole seconds, rounded up. Servers before Redis 6
/// reject fractional timeouts.
fn blocking_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}
