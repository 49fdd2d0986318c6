//! In-memory queue and store shared by the integration tests.
//!
//! One [`Broker`] plays both the Redis server and the PostgreSQL server.
//! Handles hold a reference to it, so tests can inspect state and inject
//! outages while a loader or feed client is running.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crypto_stream::{
    Connector, DurableQueue, NormalizedTick, PartitionKey, QueueError, StoreError, TickStore,
};

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<String>>,
    tables: BTreeMap<String, Vec<NormalizedTick>>,
    partitions_created: usize,
    queue_down: bool,
    store_down: bool,
    fail_next_pop: Option<QueueError>,
    fail_next_insert: Option<StoreError>,
    queue_connects: usize,
    queue_connect_failures: usize,
    store_connects: usize,
    store_connect_failures: usize,
}

/// Shared fake of both external services.
#[derive(Clone, Default)]
pub struct Broker(Arc<Mutex<BrokerState>>);

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, queue: &str, entry: &str) {
        self.0
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(entry.to_string());
    }

    /// Entries still queued, oldest first.
    pub fn queued(&self, queue: &str) -> Vec<String> {
        self.0
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed rows of one table, or `None` if it does not exist.
    pub fn committed(&self, table: &str) -> Option<Vec<NormalizedTick>> {
        self.0.lock().tables.get(table).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.0.lock().tables.keys().cloned().collect()
    }

    pub fn partitions_created(&self) -> usize {
        self.0.lock().partitions_created
    }

    pub fn set_queue_down(&self, down: bool) {
        self.0.lock().queue_down = down;
    }

    pub fn set_store_down(&self, down: bool) {
        self.0.lock().store_down = down;
    }

    pub fn fail_next_pop(&self, error: QueueError) {
        self.0.lock().fail_next_pop = Some(error);
    }

    pub fn fail_next_insert(&self, error: StoreError) {
        self.0.lock().fail_next_insert = Some(error);
    }

    pub fn queue_connects(&self) -> usize {
        self.0.lock().queue_connects
    }

    pub fn queue_connect_failures(&self) -> usize {
        self.0.lock().queue_connect_failures
    }

    pub fn store_connects(&self) -> usize {
        self.0.lock().store_connects
    }

    pub fn store_connect_failures(&self) -> usize {
        self.0.lock().store_connect_failures
    }

    pub fn queue_connector(&self) -> MemoryQueueConnector {
        MemoryQueueConnector(self.clone())
    }

    pub fn store_connector(&self) -> MemoryStoreConnector {
        MemoryStoreConnector(self.clone())
    }
}

// =============================================================================
// Queue
// =============================================================================

pub struct MemoryQueueConnector(Broker);

#[async_trait]
impl Connector for MemoryQueueConnector {
    type Handle = MemoryQueue;
    type Error = QueueError;

    fn target(&self) -> &str {
        "memory-queue"
    }

    async fn connect(&self) -> Result<MemoryQueue, QueueError> {
        let mut state = self.0.0.lock();
        if state.queue_down {
            state.queue_connect_failures += 1;
            return Err(QueueError::Connection("connection refused".to_string()));
        }
        state.queue_connects += 1;
        Ok(MemoryQueue(self.0.clone()))
    }
}

pub struct MemoryQueue(Broker);

impl MemoryQueue {
    fn check(&self) -> Result<(), QueueError> {
        if self.0.0.lock().queue_down {
            return Err(QueueError::Connection("broken pipe".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
    async fn push(&mut self, queue: &str, entry: &str) -> Result<(), QueueError> {
        self.check()?;
        self.0.push(queue, entry);
        Ok(())
    }

    async fn len(&mut self, queue: &str) -> Result<usize, QueueError> {
        self.check()?;
        Ok(self.0.0.lock().queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn pop(&mut self, queue: &str) -> Result<Option<String>, QueueError> {
        self.check()?;
        let mut state = self.0.0.lock();
        if let Some(error) = state.fail_next_pop.take() {
            return Err(error);
        }
        Ok(state.queues.get_mut(queue).and_then(VecDeque::pop_back))
    }

    async fn pop_wait(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, QueueError> {
        if let Some(entry) = self.pop(queue).await? {
            return Ok(Some(entry));
        }
        tokio::time::sleep(timeout).await;
        self.pop(queue).await
    }
}

// =============================================================================
// Store
// =============================================================================

pub struct MemoryStoreConnector(Broker);

#[async_trait]
impl Connector for MemoryStoreConnector {
    type Handle = MemoryStore;
    type Error = StoreError;

    fn target(&self) -> &str {
        "memory-store"
    }

    async fn connect(&self) -> Result<MemoryStore, StoreError> {
        let mut state = self.0.0.lock();
        if state.store_down {
            state.store_connect_failures += 1;
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        state.store_connects += 1;
        Ok(MemoryStore {
            broker: self.0.clone(),
            open: Vec::new(),
        })
    }
}

/// Store handle with its own open transaction.
pub struct MemoryStore {
    broker: Broker,
    open: Vec<(String, NormalizedTick)>,
}

impl MemoryStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.broker.0.lock().store_down {
            return Err(StoreError::Connection("server closed the connection".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TickStore for MemoryStore {
    async fn insert_tick(
        &mut self,
        partition: &PartitionKey,
        tick: &NormalizedTick,
    ) -> Result<(), StoreError> {
        self.check()?;
        let table = partition.table_name();
        {
            let mut state = self.broker.0.lock();
            if let Some(error) = state.fail_next_insert.take() {
                return Err(error);
            }
            if !state.tables.contains_key(&table) {
                return Err(StoreError::MissingPartition(table));
            }
        }
        self.open.push((table, tick.clone()));
        Ok(())
    }

    async fn create_partition(&mut self, partition: &PartitionKey) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.broker.0.lock();
        if !state.tables.contains_key(&partition.table_name()) {
            state.tables.insert(partition.table_name(), Vec::new());
            state.partitions_created += 1;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.broker.0.lock();
        for (table, tick) in self.open.drain(..) {
            state.tables.entry(table).or_default().push(tick);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.check()?;
        self.open.clear();
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Order-book snapshot entry as the producer would queue it.
pub fn snapshot(code: &str, tms: i64, bid: &str, ask: &str) -> String {
    format!(
        r#"{{"cd":"{code}","obu":[{{"ap":{ask},"as":0.5,"bp":{bid},"bs":1.25}}],"tms":{tms},"ty":"orderbook"}}"#
    )
}

// =============================================================================
// Logs
// =============================================================================

/// Counts ERROR events whose `target_name` field matches.
#[derive(Clone)]
pub struct ErrorCounter {
    target_name: &'static str,
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn new(target_name: &'static str) -> Self {
        Self {
            target_name,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct TargetName(Option<String>);

impl Visit for TargetName {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "target_name" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = TargetName(None);
        event.record(&mut visitor);
        if visitor.0.as_deref() == Some(self.target_name) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
