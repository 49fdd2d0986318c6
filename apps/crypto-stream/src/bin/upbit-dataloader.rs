//! Upbit Dataloader Binary
//!
//! Drains one configured queue into per-asset, per-day PostgreSQL tables.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin upbit-dataloader -- upbit_dataloader_1
//! ```
//!
//! # Environment Variables
//!
//! - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`: queue server
//! - `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`,
//!   `POSTGRES_DB`: tick store
//! - `CRYPTO_STREAM_CONFIG`: instance file (default: conf/crypto-stream.yaml)
//! - `CRYPTO_STREAM_RETRY_DELAY_SECS`: reconnect delay (default: 5)
//! - `CRYPTO_STREAM_RETRY_MAX_DELAY_SECS`: backoff cap (default: the reconnect delay)
//! - `CRYPTO_STREAM_RETRY_JITTER`: delay randomization, 0.0 to 1.0 (default: 0)
//! - `CRYPTO_STREAM_METRICS_PORT`: Prometheus port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: crypto_stream=info)

use anyhow::Context;
use crypto_stream::infrastructure::config::{
    PostgresSettings, RedisSettings, RuntimeSettings, load_instances,
};
use crypto_stream::infrastructure::postgres::PgConnector;
use crypto_stream::infrastructure::redis::RedisConnector;
use crypto_stream::infrastructure::{bootstrap, metrics, telemetry};
use crypto_stream::{ConnectionSupervisor, Loader};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let instance = std::env::args()
        .nth(1)
        .context("usage: upbit-dataloader <instance>")?;

    bootstrap::install_crypto_provider().map_err(anyhow::Error::msg)?;
    let dotenv = bootstrap::load_dotenv();
    let _telemetry_guard = telemetry::init("dataloader")?;

    let settings = RuntimeSettings::from_env();
    metrics::init(settings.metrics_port)?;

    let instances = load_instances(&settings.config_path)?;
    let dataloader = instances.dataloader(&instance)?;
    let redis = RedisSettings::from_env();
    let postgres = PostgresSettings::from_env();

    tracing::info!(
        instance = %instance,
        config = %settings.config_path.display(),
        dotenv = ?dotenv,
        redis = ?redis,
        postgres = ?postgres,
        duplicate_policy = dataloader.duplicate_policy.as_str(),
        retry = ?settings.retry_config(),
        "Configuration loaded"
    );

    let shutdown_token = CancellationToken::new();
    tokio::spawn(bootstrap::await_shutdown(shutdown_token.clone()));

    let loader = Loader::new(
        dataloader.loader_config(),
        RedisConnector::new(redis.connection_info())?,
        PgConnector::new(postgres.connect_options(), dataloader.duplicate_policy),
        ConnectionSupervisor::new(settings.retry_config(), shutdown_token),
    );

    let stats = loader
        .run()
        .instrument(tracing::info_span!("dataloader", instance = %instance))
        .await;

    tracing::info!(
        popped = stats.popped,
        inserted = stats.inserted,
        commits = stats.commits,
        rows_lost = stats.rows_lost,
        "Dataloader stopped"
    );
    Ok(())
}
