//! Partition Keys
//!
//! Every `(asset, UTC date)` pair maps to its own table, named
//! `<asset>_upbit_<YYYYMMDD>` with the asset lower-cased. Table names are
//! derived from feed data, so the asset is validated against a strict
//! character allow-list before it is ever placed in SQL.

use std::fmt;

use chrono::NaiveDate;

use super::tick::NormalizedTick;

/// Exchange tag embedded in every partition table name.
pub const EXCHANGE_TAG: &str = "upbit";

/// Longest accepted asset code.
pub const MAX_ASSET_LEN: usize = 20;

/// Errors building a partition key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// Asset code is empty, too long, or contains characters outside `[A-Za-z0-9]`.
    #[error("asset {0:?} is not a valid partition identifier")]
    InvalidAsset(String),
}

/// Identifies one partition table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    asset: String,
    date: NaiveDate,
}

impl PartitionKey {
    /// Build a key, validating the asset code.
    ///
    /// # Errors
    ///
    /// Returns [`PartitionError::InvalidAsset`] for anything that is not
    /// 1 to [`MAX_ASSET_LEN`] ASCII alphanumerics.
    pub fn new(asset: &str, date: NaiveDate) -> Result<Self, PartitionError> {
        if !is_valid_asset(asset) {
            return Err(PartitionError::InvalidAsset(asset.to_string()));
        }

        Ok(Self {
            asset: asset.to_ascii_lowercase(),
            date,
        })
    }

    /// Key for the partition a tick belongs to.
    ///
    /// # Errors
    ///
    /// See [`PartitionKey::new`].
    pub fn for_tick(tick: &NormalizedTick) -> Result<Self, PartitionError> {
        Self::new(&tick.asset, tick.utc_date())
    }

    /// Lower-cased asset code.
    #[must_use]
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// UTC calendar date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Unquoted table name, e.g. `btc_upbit_20231114`.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!(
            "{}_{EXCHANGE_TAG}_{}",
            self.asset,
            self.date.format("%Y%m%d")
        )
    }

    /// Table name as a double-quoted SQL identifier.
    ///
    /// Safe to splice into SQL because the asset passed validation.
    #[must_use]
    pub fn quoted_table_name(&self) -> String {
        format!("\"{}\"", self.table_name())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_name())
    }
}

/// Check an asset code against the identifier allow-list.
#[must_use]
pub fn is_valid_asset(asset: &str) -> bool {
    !asset.is_empty()
        && asset.len() <= MAX_ASSET_LEN
        && asset.bytes().all(|b| b.is_ascii_alphanumeric())
}
