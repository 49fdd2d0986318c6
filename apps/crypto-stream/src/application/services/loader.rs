//! Loader
//!
//! Drains one queue into partitioned storage:
//!
//! ```text
//! pop ──► parse ──► partition key ──► INSERT ──► every N inserts: COMMIT
//!                                        │
//!                 missing table ─────────┤ ROLLBACK, CREATE IF NOT EXISTS, COMMIT, retry once
//!                 database error ────────┤ ROLLBACK, open batch is lost
//!                 connection lost ───────┘ re-acquire, open batch is lost
//! ```
//!
//! # Delivery
//!
//! Entries are removed from the queue before they are durable. Anything that
//! fails after the pop is lost for good, and a rollback also discards every
//! row inserted since the last commit, so the loss window is bounded by
//! `commit_count`. Losses are logged with a `lost` field and counted in
//! [`LoaderStats::rows_lost`].

use std::time::Duration;

use crate::application::ports::{Connector, DurableQueue, StoreError, TickStore};
use crate::application::services::supervisor::ConnectionSupervisor;
use crate::domain::partition::PartitionKey;
use crate::domain::tick::NormalizedTick;
use crate::infrastructure::metrics;

/// How long a pop waits for an entry before the loop re-checks cancellation.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Per-instance loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Queue to drain.
    pub queue: String,
    /// Inserts per commit (at least 1).
    pub commit_count: usize,
    /// Blocking-pop timeout while the queue is empty.
    pub idle_timeout: Duration,
}

impl LoaderConfig {
    /// Config with the default idle timeout. A `commit_count` of 0 is raised to 1.
    #[must_use]
    pub fn new(queue: impl Into<String>, commit_count: usize) -> Self {
        Self {
            queue: queue.into(),
            commit_count: commit_count.max(1),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

// =============================================================================
// State and Outcomes
// =============================================================================

/// Running totals for one loader process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Entries removed from the queue.
    pub popped: u64,
    /// Successful inserts (committed or not).
    pub inserted: u64,
    /// Successful commits.
    pub commits: u64,
    /// Partitions created by this process.
    pub partitions_created: u64,
    /// Entries dropped before reaching the store.
    pub dropped: u64,
    /// Inserted rows discarded by a rollback or connection loss.
    pub rows_lost: u64,
    /// Queue connections re-acquired.
    pub queue_reconnects: u64,
    /// Store connections re-acquired.
    pub store_reconnects: u64,
}

/// Connections and the open-batch counter owned by the run loop.
#[derive(Debug)]
pub struct LoaderState<Q, S> {
    queue: Q,
    store: S,
    pending: usize,
    stats: LoaderStats,
}

impl<Q, S> LoaderState<Q, S> {
    /// Wrap freshly acquired handles.
    #[must_use]
    pub const fn new(queue: Q, store: S) -> Self {
        Self {
            queue,
            store,
            pending: 0,
            stats: LoaderStats {
                popped: 0,
                inserted: 0,
                commits: 0,
                partitions_created: 0,
                dropped: 0,
                rows_lost: 0,
                queue_reconnects: 0,
                store_reconnects: 0,
            },
        }
    }

    /// Inserts since the last commit.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> LoaderStats {
        self.stats
    }

    fn lose_pending(&mut self) -> usize {
        let lost = std::mem::take(&mut self.pending);
        self.stats.rows_lost += lost as u64;
        if lost > 0 {
            metrics::record_rows_lost(lost as u64);
        }
        lost
    }
}

/// Why an entry never reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not a parseable order-book snapshot.
    Malformed,
    /// Asset code fails the table-name allow-list.
    InvalidPartition,
}

impl DropReason {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidPartition => "invalid_partition",
        }
    }
}

/// Why the open batch was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// A database error forced a rollback.
    Database,
    /// The store connection was lost and re-acquired.
    StoreConnection,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The queue stayed empty for the idle timeout.
    Idle,
    /// The entry was inserted.
    Stored {
        /// The insert completed a batch and it was committed.
        committed: bool,
        /// The partition was created on the way.
        created_partition: bool,
    },
    /// The entry was dropped before reaching the store.
    Dropped(DropReason),
    /// The entry and the open batch were lost.
    BatchAbandoned {
        /// Previously inserted, uncommitted rows discarded.
        lost: usize,
        /// What forced the abandon.
        reason: AbandonReason,
    },
    /// The queue connection was re-acquired; no entry was consumed.
    QueueReconnected,
    /// Cancellation was requested.
    Cancelled,
}

// =============================================================================
// Loader
// =============================================================================

/// Queue-to-store consumer.
pub struct Loader<QC, SC> {
    config: LoaderConfig,
    queue_connector: QC,
    store_connector: SC,
    supervisor: ConnectionSupervisor,
}

impl<QC, SC> Loader<QC, SC>
where
    QC: Connector,
    QC::Handle: DurableQueue,
    SC: Connector,
    SC::Handle: TickStore,
{
    /// Create a loader. Connections are opened by [`Loader::run`] or [`Loader::connect`].
    #[must_use]
    pub const fn new(
        config: LoaderConfig,
        queue_connector: QC,
        store_connector: SC,
        supervisor: ConnectionSupervisor,
    ) -> Self {
        Self {
            config,
            queue_connector,
            store_connector,
            supervisor,
        }
    }

    /// Loader settings.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Acquire both connections. `None` only on cancellation.
    pub async fn connect(&self) -> Option<LoaderState<QC::Handle, SC::Handle>> {
        let store = self.supervisor.acquire(&self.store_connector).await?;
        let queue = self.supervisor.acquire(&self.queue_connector).await?;
        Some(LoaderState::new(queue, store))
    }

    /// Run until cancelled, then commit the open batch and return the totals.
    pub async fn run(&self) -> LoaderStats {
        tracing::info!(
            queue = %self.config.queue,
            commit_count = self.config.commit_count,
            idle_timeout_ms = self.config.idle_timeout.as_millis(),
            "Loader starting"
        );

        let Some(mut state) = self.connect().await else {
            tracing::info!("Loader cancelled before connecting");
            return LoaderStats::default();
        };

        while self.step(&mut state).await != StepOutcome::Cancelled {}

        self.shutdown(&mut state).await;
        tracing::info!(stats = ?state.stats, "Loader stopped");
        state.stats
    }

    /// Process at most one queue entry.
    pub async fn step(&self, state: &mut LoaderState<QC::Handle, SC::Handle>) -> StepOutcome {
        if self.supervisor.cancel_token().is_cancelled() {
            return StepOutcome::Cancelled;
        }

        let entry = match state
            .queue
            .pop_wait(&self.config.queue, self.config.idle_timeout)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => return StepOutcome::Idle,
            Err(e) if e.is_connection() => {
                tracing::error!(error = %e, queue = %self.config.queue, "Queue connection failed");
                return self.reconnect_queue(state).await;
            }
            Err(e) => {
                tracing::error!(error = %e, queue = %self.config.queue, "Queue pop failed");
                self.pause().await;
                return StepOutcome::Idle;
            }
        };
        state.stats.popped += 1;

        let tick = match NormalizedTick::from_entry(&entry) {
            Ok(tick) => tick,
            Err(e) => {
                tracing::error!(error = %e, "Dropping unparseable entry");
                return Self::drop_entry(state, DropReason::Malformed);
            }
        };

        let partition = match PartitionKey::for_tick(&tick) {
            Ok(partition) => partition,
            Err(e) => {
                tracing::error!(error = %e, "Dropping entry with unroutable asset");
                return Self::drop_entry(state, DropReason::InvalidPartition);
            }
        };

        self.store(state, &partition, &tick).await
    }

    fn drop_entry(state: &mut LoaderState<QC::Handle, SC::Handle>, reason: DropReason) -> StepOutcome {
        state.stats.dropped += 1;
        metrics::record_loader_drop(reason.as_str());
        StepOutcome::Dropped(reason)
    }

    async fn store(
        &self,
        state: &mut LoaderState<QC::Handle, SC::Handle>,
        partition: &PartitionKey,
        tick: &NormalizedTick,
    ) -> StepOutcome {
        let mut created_partition = false;
        let mut result = state.store.insert_tick(partition, tick).await;

        if matches!(result, Err(StoreError::MissingPartition(_))) {
            result = match self.create_partition(state, partition).await {
                Ok(()) => {
                    created_partition = true;
                    state.store.insert_tick(partition, tick).await
                }
                Err(e) => Err(e),
            };
        }

        if let Err(e) = result {
            return self.recover(state, e).await;
        }

        state.pending += 1;
        state.stats.inserted += 1;
        metrics::record_loader_insert();

        let mut committed = false;
        if state.pending >= self.config.commit_count {
            if let Err(e) = state.store.commit().await {
                return self.recover(state, e).await;
            }
            tracing::debug!(rows = state.pending, "Committed batch");
            state.pending = 0;
            state.stats.commits += 1;
            committed = true;
            metrics::record_loader_commit();
            self.publish_queue_depth(state).await;
        }

        StepOutcome::Stored {
            committed,
            created_partition,
        }
    }

    /// Roll back, create the table, and commit the DDL.
    async fn create_partition(
        &self,
        state: &mut LoaderState<QC::Handle, SC::Handle>,
        partition: &PartitionKey,
    ) -> Result<(), StoreError> {
        state.store.rollback().await?;
        let lost = state.lose_pending();
        if lost > 0 {
            tracing::warn!(lost, partition = %partition, "Open batch rolled back to create partition");
        }

        state.store.create_partition(partition).await?;
        state.stats.partitions_created += 1;
        metrics::record_partition_created();
        tracing::info!(partition = %partition, "Created partition");
        Ok(())
    }

    /// Discard the open batch after a store failure.
    async fn recover(
        &self,
        state: &mut LoaderState<QC::Handle, SC::Handle>,
        error: StoreError,
    ) -> StepOutcome {
        let lost = state.lose_pending();

        if let StoreError::Connection(_) = error {
            tracing::error!(error = %error, lost, "Store connection failed");
            return self.reconnect_store(state, lost).await;
        }

        tracing::error!(error = %error, lost, "Transaction error");
        if let Err(rollback_error) = state.store.rollback().await {
            tracing::error!(error = %rollback_error, "Rollback failed");
            if matches!(rollback_error, StoreError::Connection(_)) {
                return self.reconnect_store(state, lost).await;
            }
        }

        StepOutcome::BatchAbandoned {
            lost,
            reason: AbandonReason::Database,
        }
    }

    async fn reconnect_store(
        &self,
        state: &mut LoaderState<QC::Handle, SC::Handle>,
        lost: usize,
    ) -> StepOutcome {
        let Some(store) = self.supervisor.acquire(&self.store_connector).await else {
            return StepOutcome::Cancelled;
        };
        state.store = store;
        state.pending = 0;
        state.stats.store_reconnects += 1;

        StepOutcome::BatchAbandoned {
            lost,
            reason: AbandonReason::StoreConnection,
        }
    }

    async fn reconnect_queue(&self, state: &mut LoaderState<QC::Handle, SC::Handle>) -> StepOutcome {
        let Some(queue) = self.supervisor.acquire(&self.queue_connector).await else {
            return StepOutcome::Cancelled;
        };
        state.queue = queue;
        state.stats.queue_reconnects += 1;
        StepOutcome::QueueReconnected
    }

    async fn publish_queue_depth(&self, state: &mut LoaderState<QC::Handle, SC::Handle>) {
        match state.queue.len(&self.config.queue).await {
            Ok(depth) => metrics::set_queue_depth(&self.config.queue, depth),
            Err(e) => tracing::debug!(error = %e, "Queue length unavailable"),
        }
    }

    async fn pause(&self) {
        tokio::select! {
            () = self.supervisor.cancel_token().cancelled() => {}
            () = tokio::time::sleep(self.config.idle_timeout) => {}
        }
    }

    /// Best-effort commit of the open batch before exit.
    async fn shutdown(&self, state: &mut LoaderState<QC::Handle, SC::Handle>) {
        if state.pending == 0 {
            return;
        }

        let rows = state.pending;
        match state.store.commit().await {
            Ok(()) => {
                state.pending = 0;
                state.stats.commits += 1;
                metrics::record_loader_commit();
                tracing::info!(rows, "Committed open batch on shutdown");
            }
            Err(e) => {
                let lost = state.lose_pending();
                tracing::error!(error = %e, lost, "Final commit failed");
            }
        }
    }
}
