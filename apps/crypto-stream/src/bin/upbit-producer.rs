//! Upbit Producer Binary
//!
//! Streams order-book snapshots for one configured instance into its queue.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin upbit-producer -- upbit_producer_1
//! ```
//!
//! # Environment Variables
//!
//! - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`: queue server
//! - `CRYPTO_STREAM_CONFIG`: instance file (default: conf/crypto-stream.yaml)
//! - `CRYPTO_STREAM_RETRY_DELAY_SECS`: reconnect delay (default: 5)
//! - `CRYPTO_STREAM_RETRY_MAX_DELAY_SECS`: backoff cap (default: the reconnect delay)
//! - `CRYPTO_STREAM_RETRY_JITTER`: delay randomization, 0.0 to 1.0 (default: 0)
//! - `CRYPTO_STREAM_METRICS_PORT`: Prometheus port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: crypto_stream=info)

use anyhow::Context;
use crypto_stream::infrastructure::config::{RedisSettings, RuntimeSettings, load_instances};
use crypto_stream::infrastructure::redis::RedisConnector;
use crypto_stream::infrastructure::upbit::{FeedClient, FeedClientConfig};
use crypto_stream::infrastructure::{bootstrap, metrics, telemetry};
use crypto_stream::ConnectionSupervisor;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let instance = std::env::args()
        .nth(1)
        .context("usage: upbit-producer <instance>")?;

    bootstrap::install_crypto_provider().map_err(anyhow::Error::msg)?;
    let dotenv = bootstrap::load_dotenv();
    let _telemetry_guard = telemetry::init("producer")?;

    let settings = RuntimeSettings::from_env();
    metrics::init(settings.metrics_port)?;

    let instances = load_instances(&settings.config_path)?;
    let producer = instances.producer(&instance)?;
    let redis = RedisSettings::from_env();

    tracing::info!(
        instance = %instance,
        config = %settings.config_path.display(),
        dotenv = ?dotenv,
        redis = ?redis,
        retry = ?settings.retry_config(),
        "Configuration loaded"
    );

    let shutdown_token = CancellationToken::new();
    tokio::spawn(bootstrap::await_shutdown(shutdown_token.clone()));

    let client = FeedClient::new(
        FeedClientConfig::from_producer(producer, settings.retry_config()),
        RedisConnector::new(redis.connection_info())?,
        ConnectionSupervisor::new(settings.retry_config(), shutdown_token),
    );

    let stats = client
        .run()
        .instrument(tracing::info_span!("producer", instance = %instance))
        .await;

    tracing::info!(
        frames = stats.frames,
        pushed = stats.pushed,
        dropped = stats.dropped,
        reconnects = stats.reconnects,
        "Producer stopped"
    );
    Ok(())
}
