//! PostgreSQL tick store.
//!
//! Each store owns a pool capped at one connection, so the open transaction
//! and every statement in it share a single session.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};

use super::statements::{self, DuplicatePolicy};
use crate::application::ports::{Connector, StoreError, TickStore};
use crate::domain::partition::PartitionKey;
use crate::domain::tick::NormalizedTick;

/// SQLSTATE for `undefined_table`.
pub const UNDEFINED_TABLE: &str = "42P01";

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a driver error to the loader's recovery classes.
#[must_use]
pub fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => classify_sqlstate(&code, error.to_string()),
            None => StoreError::Database(error.to_string()),
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(error.to_string()),
        _ => StoreError::Database(error.to_string()),
    }
}

fn classify_sqlstate(code: &str, message: String) -> StoreError {
    if code == UNDEFINED_TABLE {
        StoreError::MissingPartition(message)
    } else if code.starts_with("08") || code.starts_with("57P") {
        // connection_exception, operator_intervention (admin shutdown, crash)
        StoreError::Connection(message)
    } else {
        StoreError::Database(message)
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens single-connection pools and checks them with `SELECT 1`.
#[derive(Debug, Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    policy: DuplicatePolicy,
    acquire_timeout: Duration,
}

impl PgConnector {
    /// Connector for the given server and duplicate-timestamp policy.
    #[must_use]
    pub const fn new(options: PgConnectOptions, policy: DuplicatePolicy) -> Self {
        Self {
            options,
            policy,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgTickStore;
    type Error = StoreError;

    fn target(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<PgTickStore, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(self.options.clone())
            .await
            .map_err(classify)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(classify)?;

        Ok(PgTickStore::new(pool, self.policy))
    }
}

// =============================================================================
// Store
// =============================================================================

/// [`TickStore`] over one PostgreSQL session.
pub struct PgTickStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    policy: DuplicatePolicy,
}

impl PgTickStore {
    /// Wrap a pool. No transaction is opened until the first statement.
    #[must_use]
    pub const fn new(pool: PgPool, policy: DuplicatePolicy) -> Self {
        Self {
            pool,
            tx: None,
            policy,
        }
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await.map_err(classify)?,
        };
        Ok(self.tx.insert(tx))
    }
}

#[async_trait]
impl TickStore for PgTickStore {
    async fn insert_tick(
        &mut self,
        partition: &PartitionKey,
        tick: &NormalizedTick,
    ) -> Result<(), StoreError> {
        let sql = statements::insert_tick(partition, self.policy);
        let tx = self.transaction().await?;

        sqlx::query(&sql)
            .bind(tick.timestamp)
            .bind(tick.bid_price)
            .bind(tick.bid_volume)
            .bind(tick.ask_price)
            .bind(tick.ask_volume)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn create_partition(&mut self, partition: &PartitionKey) -> Result<(), StoreError> {
        let sql = statements::create_table(partition);
        let tx = self.transaction().await?;

        sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;

        self.commit().await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(classify)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(classify)?;
        }
        Ok(())
    }
}
