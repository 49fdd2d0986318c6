#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Crypto Stream - Order Book Ingestion Pipeline
//!
//! Two independent processes connected by a durable queue:
//!
//! - **Producer** (`upbit-producer`): subscribes to Upbit order-book
//!   snapshots over WebSocket and pushes each payload onto a Redis list.
//! - **Dataloader** (`upbit-dataloader`): pops entries, keeps the best bid
//!   and ask, and inserts them into one PostgreSQL table per asset per UTC
//!   day, committing in batches.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: ticks and partition keys
//! - **Application**: ports (`Connector`, `DurableQueue`, `TickStore`) and
//!   services (retry policy, connection supervisor, loader)
//! - **Infrastructure**: Upbit, Redis and PostgreSQL adapters, configuration,
//!   metrics, telemetry
//!
//! # Data Flow
//!
//! ```text
//! Upbit WS ──► FeedClient ──LPUSH──► Redis list ──BRPOP──► Loader ──► <asset>_upbit_<YYYYMMDD>
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Ticks and partition keys with no I/O.
pub mod domain;

/// Application layer - Port definitions and pipeline services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::partition::{PartitionError, PartitionKey};
pub use domain::tick::{NormalizedTick, OrderbookUnit, RawFeedMessage, TickError};

// Ports
pub use application::ports::{Connector, DurableQueue, QueueError, StoreError, TickStore};

// Services
pub use application::services::{
    AbandonReason, ConnectionSupervisor, DropReason, Loader, LoaderConfig, LoaderState,
    LoaderStats, RetryConfig, RetryPolicy, StepOutcome,
};

// Adapters
pub use infrastructure::postgres::{DuplicatePolicy, PgConnector, PgTickStore};
pub use infrastructure::redis::{RedisConnector, RedisQueue};
pub use infrastructure::upbit::{FeedClient, FeedClientConfig, FeedState, FeedStats};

// Configuration
pub use infrastructure::config::{
    ConfigError, DataloaderConfig, InstanceFile, PostgresSettings, ProducerConfig, RedisSettings,
    RuntimeSettings, load_instances,
};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
