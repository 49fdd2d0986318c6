//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Feed**: frames received, entries pushed, frames dropped, reconnects
//! - **Connections**: failed acquisition attempts per target
//! - **Loader**: inserts, commits, partitions created, drops, rows lost
//! - **Queue**: depth sampled after each commit
//!
//! # Integration
//!
//! When a port is configured the exporter serves `/metrics` on
//! `0.0.0.0:<port>`. Without a recorder every call below is a no-op.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// A port of 0 leaves metrics disabled. Must be called from inside a Tokio
/// runtime. Repeated calls after a successful install are ignored.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init(port: u16) -> Result<(), BuildError> {
    if port == 0 || INSTALLED.get().is_some() {
        return Ok(());
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    let _ = INSTALLED.set(addr);
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "crypto_stream_feed_frames_total",
        "Frames received from the exchange feed"
    );
    describe_counter!(
        "crypto_stream_queue_pushes_total",
        "Entries pushed onto the durable queue"
    );
    describe_counter!(
        "crypto_stream_feed_dropped_total",
        "Feed frames dropped before reaching the queue"
    );
    describe_counter!(
        "crypto_stream_feed_reconnects_total",
        "Feed WebSocket reconnections"
    );
    describe_counter!(
        "crypto_stream_connection_failures_total",
        "Failed connection attempts by target"
    );

    describe_counter!("crypto_stream_loader_inserts_total", "Rows inserted");
    describe_counter!("crypto_stream_loader_commits_total", "Batches committed");
    describe_counter!(
        "crypto_stream_loader_partitions_created_total",
        "Partition tables created"
    );
    describe_counter!(
        "crypto_stream_loader_dropped_total",
        "Queue entries dropped before insert"
    );
    describe_counter!(
        "crypto_stream_loader_rows_lost_total",
        "Inserted rows discarded by rollback or connection loss"
    );

    describe_gauge!("crypto_stream_queue_depth", "Entries waiting in the queue");
}

// =============================================================================
// Feed
// =============================================================================

/// Record a frame received from the exchange.
pub fn record_feed_frame() {
    counter!("crypto_stream_feed_frames_total").increment(1);
}

/// Record an entry pushed onto the queue.
pub fn record_queue_push(queue: &str) {
    counter!("crypto_stream_queue_pushes_total", "queue" => queue.to_string()).increment(1);
}

/// Record a feed frame that was not pushed.
pub fn record_feed_drop(reason: &'static str) {
    counter!("crypto_stream_feed_dropped_total", "reason" => reason).increment(1);
}

/// Record a feed reconnection.
pub fn record_feed_reconnect() {
    counter!("crypto_stream_feed_reconnects_total").increment(1);
}

/// Record a failed connection attempt.
pub fn record_connection_failure(target: &str) {
    counter!(
        "crypto_stream_connection_failures_total",
        "target" => target.to_string()
    )
    .increment(1);
}

// =============================================================================
// Loader
// =============================================================================

/// Record a successful insert.
pub fn record_loader_insert() {
    counter!("crypto_stream_loader_inserts_total").increment(1);
}

/// Record a successful commit.
pub fn record_loader_commit() {
    counter!("crypto_stream_loader_commits_total").increment(1);
}

/// Record a partition table creation.
pub fn record_partition_created() {
    counter!("crypto_stream_loader_partitions_created_total").increment(1);
}

/// Record an entry dropped before insert.
pub fn record_loader_drop(reason: &'static str) {
    counter!("crypto_stream_loader_dropped_total", "reason" => reason).increment(1);
}

/// Record rows discarded with an abandoned batch.
pub fn record_rows_lost(rows: u64) {
    counter!("crypto_stream_loader_rows_lost_total").increment(rows);
}

/// Publish the current queue depth.
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(queue: &str, depth: usize) {
    gauge!("crypto_stream_queue_depth", "queue" => queue.to_string()).set(depth as f64);
}
