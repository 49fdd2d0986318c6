//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: Opens and health-checks a connection to one target
//! - `DurableQueue`: FIFO list service between producer and loader
//! - `TickStore`: Partitioned relational storage with explicit transactions

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::partition::PartitionKey;
use crate::domain::tick::NormalizedTick;

// =============================================================================
// Connector
// =============================================================================

/// Opens a fresh, health-checked connection to one external target.
///
/// Handles are never repaired in place: after a failure the caller discards
/// the old handle and asks the connector for a new one.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection handle produced on success.
    type Handle: Send;

    /// Error reported for a failed attempt.
    type Error: std::fmt::Display + Send;

    /// Short target label used in logs and metrics (e.g. `redis`).
    fn target(&self) -> &str;

    /// Connect and verify the connection is usable.
    async fn connect(&self) -> Result<Self::Handle, Self::Error>;
}

// =============================================================================
// Durable Queue
// =============================================================================

/// Errors from queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The connection is broken and must be re-acquired.
    #[error("queue connection lost: {0}")]
    Connection(String),

    /// The command was rejected; the connection is still usable.
    #[error("queue command failed: {0}")]
    Command(String),
}

impl QueueError {
    /// Whether the caller must re-acquire the connection.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// FIFO list keyed by name.
///
/// `push` appends, `pop` removes and returns the oldest entry. Entries are
/// opaque strings and are stored and removed whole. A popped entry is gone
/// from the queue immediately, before the consumer has stored it anywhere.
#[async_trait]
pub trait DurableQueue: Send {
    /// Append an entry.
    async fn push(&mut self, queue: &str, entry: &str) -> Result<(), QueueError>;

    /// Number of entries currently queued.
    async fn len(&mut self, queue: &str) -> Result<usize, QueueError>;

    /// Remove and return the oldest entry, or `None` when empty.
    async fn pop(&mut self, queue: &str) -> Result<Option<String>, QueueError>;

    /// Like [`DurableQueue::pop`], but waits up to `timeout` for an entry.
    async fn pop_wait(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError>;
}

// =============================================================================
// Tick Store
// =============================================================================

/// Errors from store operations, classified by how the loader recovers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The target partition table does not exist yet.
    #[error("partition {0} does not exist")]
    MissingPartition(String),

    /// The connection is broken and must be re-acquired.
    #[error("store connection lost: {0}")]
    Connection(String),

    /// Any other database error; the open transaction must be rolled back.
    #[error("database error: {0}")]
    Database(String),
}

/// Partitioned tick storage.
///
/// Inserts accumulate in an implicit open transaction that only becomes
/// durable on [`TickStore::commit`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TickStore: Send {
    /// Insert one tick into its partition, inside the open transaction.
    async fn insert_tick(
        &mut self,
        partition: &PartitionKey,
        tick: &NormalizedTick,
    ) -> Result<(), StoreError>;

    /// Idempotently create a partition table and commit the DDL.
    async fn create_partition(&mut self, partition: &PartitionKey) -> Result<(), StoreError>;

    /// Commit the open transaction. No-op when nothing is open.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Roll back the open transaction. No-op when nothing is open.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
