//! Environment Settings
//!
//! Connection and runtime settings read from environment variables. Unset or
//! unparseable values fall back to defaults.

use std::path::PathBuf;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use sqlx::postgres::PgConnectOptions;

use crate::application::services::retry::{DEFAULT_RETRY_DELAY, RetryConfig};

/// Default instance file location.
pub const DEFAULT_CONFIG_PATH: &str = "conf/crypto-stream.yaml";

/// Queue server connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Optional `AUTH` password.
    pub password: Option<String>,
    /// Logical database index.
    pub db: i64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisSettings {
    /// Read `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("REDIS_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "REDIS_PORT", defaults.port),
            password: lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()),
            db: parse_or(&lookup, "REDIS_DB", defaults.db),
        }
    }

    /// Client connection info.
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        }
    }
}

impl std::fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("db", &self.db)
            .finish()
    }
}

/// Relational store connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: Option<String>,
    /// Database name.
    pub database: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
        }
    }
}

impl PostgresSettings {
    /// Read `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`,
    /// `POSTGRES_PASSWORD`, `POSTGRES_DB`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("POSTGRES_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "POSTGRES_PORT", defaults.port),
            user: lookup("POSTGRES_USER").unwrap_or(defaults.user),
            password: lookup("POSTGRES_PASSWORD").filter(|p| !p.is_empty()),
            database: lookup("POSTGRES_DB").unwrap_or(defaults.database),
        }
    }

    /// Driver connect options.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .application_name("crypto-stream");

        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .finish()
    }
}

/// Process-level settings shared by both binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Delay before the first reconnection attempt.
    pub retry_delay: Duration,
    /// Cap for the reconnection delay. Equal to `retry_delay` keeps it fixed.
    pub retry_max_delay: Duration,
    /// Randomization applied to each delay (0.1 = ±10%).
    pub retry_jitter: f64,
    /// Prometheus listener port (0 = disabled).
    pub metrics_port: u16,
    /// Instance file location.
    pub config_path: PathBuf,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_max_delay: DEFAULT_RETRY_DELAY,
            retry_jitter: 0.0,
            metrics_port: 0,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

impl RuntimeSettings {
    /// Read the `CRYPTO_STREAM_*` variables:
    ///
    /// - `CRYPTO_STREAM_RETRY_DELAY_SECS` (default 5)
    /// - `CRYPTO_STREAM_RETRY_MAX_DELAY_SECS` (default: the retry delay)
    /// - `CRYPTO_STREAM_RETRY_JITTER` (default 0)
    /// - `CRYPTO_STREAM_METRICS_PORT` (default 0)
    /// - `CRYPTO_STREAM_CONFIG`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retry_delay = Duration::from_secs(parse_or(
            &lookup,
            "CRYPTO_STREAM_RETRY_DELAY_SECS",
            defaults.retry_delay.as_secs(),
        ));
        let retry_max_delay = Duration::from_secs(parse_or(
            &lookup,
            "CRYPTO_STREAM_RETRY_MAX_DELAY_SECS",
            retry_delay.as_secs(),
        ))
        .max(retry_delay);

        Self {
            retry_delay,
            retry_max_delay,
            retry_jitter: parse_or(&lookup, "CRYPTO_STREAM_RETRY_JITTER", defaults.retry_jitter),
            metrics_port: parse_or(&lookup, "CRYPTO_STREAM_METRICS_PORT", defaults.metrics_port),
            config_path: lookup("CRYPTO_STREAM_CONFIG").map_or(defaults.config_path, PathBuf::from),
        }
    }

    /// Reconnection schedule: fixed when the cap equals the first delay,
    /// otherwise doubling up to the cap.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        let schedule = if self.retry_max_delay > self.retry_delay {
            RetryConfig::exponential(self.retry_delay, self.retry_max_delay)
        } else {
            RetryConfig::fixed(self.retry_delay)
        };
        schedule.with_jitter(self.retry_jitter)
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
