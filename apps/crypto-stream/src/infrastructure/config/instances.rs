//! Instance File
//!
//! Named producer and dataloader instances, loaded from YAML with `${VAR}`
//! and `${VAR:-default}` interpolation before parsing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use super::ConfigError;
use crate::application::services::LoaderConfig;
use crate::domain::partition::is_valid_asset;
use crate::infrastructure::postgres::DuplicatePolicy;

/// Public Upbit quotation WebSocket endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Order-book depths accepted by the feed.
pub const SUPPORTED_DEPTHS: [u8; 4] = [1, 5, 15, 30];

/// All instances in one file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFile {
    /// Producer instances by name.
    #[serde(default)]
    pub producers: BTreeMap<String, ProducerConfig>,
    /// Dataloader instances by name.
    #[serde(default)]
    pub dataloaders: BTreeMap<String, DataloaderConfig>,
}

impl InstanceFile {
    /// Look up a producer instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownInstance`] if no producer has that name.
    pub fn producer(&self, name: &str) -> Result<&ProducerConfig, ConfigError> {
        self.producers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInstance {
                kind: "producer",
                name: name.to_string(),
            })
    }

    /// Look up a dataloader instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownInstance`] if no dataloader has that name.
    pub fn dataloader(&self, name: &str) -> Result<&DataloaderConfig, ConfigError> {
        self.dataloaders
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInstance {
                kind: "dataloader",
                name: name.to_string(),
            })
    }
}

/// One feed-to-queue producer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProducerConfig {
    /// Destination queue.
    pub queue: String,
    /// Asset tickers to subscribe to, as a list or a comma-separated string.
    #[serde(deserialize_with = "ticker_list")]
    pub tickers: Vec<String>,
    /// Quote market prefix.
    #[serde(default = "default_market")]
    pub market: String,
    /// Order-book levels per snapshot.
    #[serde(default = "default_depth")]
    pub orderbook_depth: u8,
    /// Feed endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Protocol ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl ProducerConfig {
    /// Qualified subscription codes, e.g. `KRW-BTC.1`.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        let market = self.market.to_ascii_uppercase();
        self.tickers
            .iter()
            .map(|t| format!("{market}-{}.{}", t.to_ascii_uppercase(), self.orderbook_depth))
            .collect()
    }

    /// Ping interval as a duration.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(invalid(name, "queue must not be empty"));
        }
        if self.tickers.is_empty() {
            return Err(invalid(name, "tickers must not be empty"));
        }
        if let Some(bad) = self.tickers.iter().find(|t| !is_valid_asset(t)) {
            return Err(invalid(name, &format!("ticker {bad:?} is not alphanumeric")));
        }
        if !is_valid_asset(&self.market) {
            return Err(invalid(name, &format!("market {:?} is not alphanumeric", self.market)));
        }
        if !SUPPORTED_DEPTHS.contains(&self.orderbook_depth) {
            return Err(invalid(
                name,
                &format!("orderbook_depth must be one of {SUPPORTED_DEPTHS:?}"),
            ));
        }
        if self.ping_interval_secs == 0 {
            return Err(invalid(name, "ping_interval_secs must be positive"));
        }
        Ok(())
    }
}

/// One queue-to-store dataloader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataloaderConfig {
    /// Source queue.
    pub queue: String,
    /// Inserts per commit.
    pub commit_count: usize,
    /// Blocking-pop timeout in milliseconds.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Duplicate-timestamp handling.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl DataloaderConfig {
    /// Loader settings for this instance.
    #[must_use]
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            ..LoaderConfig::new(self.queue.clone(), self.commit_count)
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(invalid(name, "queue must not be empty"));
        }
        if self.commit_count == 0 {
            return Err(invalid(name, "commit_count must be at least 1"));
        }
        Ok(())
    }
}

fn default_market() -> String {
    "KRW".to_string()
}

const fn default_depth() -> u8 {
    1
}

fn default_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

const fn default_ping_interval() -> u64 {
    60
}

const fn default_idle_timeout_ms() -> u64 {
    1000
}

fn ticker_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tickers {
        List(Vec<String>),
        Csv(String),
    }

    let tickers = match Tickers::deserialize(deserializer)? {
        Tickers::List(list) => list,
        Tickers::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(tickers
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

fn invalid(instance: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{instance}: {message}"))
}

// =============================================================================
// Loading
// =============================================================================

/// Load and validate an instance file.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_instances(path: &Path) -> Result<InstanceFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    load_instances_from_string(&contents)
}

/// Parse and validate instance YAML.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_instances_from_string(yaml: &str) -> Result<InstanceFile, ConfigError> {
    let interpolated = interpolate_env_vars(yaml, |key| std::env::var(key).ok());
    let file: InstanceFile = serde_yaml_bw::from_str(&interpolated)?;
    validate(&file)?;
    Ok(file)
}

fn validate(file: &InstanceFile) -> Result<(), ConfigError> {
    for (name, producer) in &file.producers {
        producer.validate(name)?;
    }
    for (name, loader) in &file.dataloaders {
        loader.validate(name)?;
    }
    Ok(())
}

/// Replace `${VAR}` and `${VAR:-default}`. Unset or empty variables without
/// a default become empty strings.
#[allow(clippy::expect_used)]
fn interpolate_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        match lookup(&caps[1]) {
            Some(value) if !value.is_empty() => value,
            _ => default.to_string(),
        }
    })
    .into_owned()
}
