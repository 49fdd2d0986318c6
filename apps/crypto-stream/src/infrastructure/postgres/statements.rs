//! SQL for partition tables.
//!
//! Table identifiers are only ever produced by [`PartitionKey`], which has
//! already checked the asset against the allow-list, and are double-quoted
//! on top of that. Values are always bound as parameters.

use serde::Deserialize;

use crate::domain::partition::PartitionKey;

/// What an insert does when the partition already holds a row with the
/// same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with a unique violation; the loader rolls the batch back.
    #[default]
    Reject,
    /// Keep the existing row.
    Ignore,
    /// Overwrite the existing row.
    Replace,
}

impl DuplicatePolicy {
    /// Config spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Ignore => "ignore",
            Self::Replace => "replace",
        }
    }

    const fn conflict_clause(self) -> &'static str {
        match self {
            Self::Reject => "",
            Self::Ignore => " ON CONFLICT (timestamp) DO NOTHING",
            Self::Replace => {
                " ON CONFLICT (timestamp) DO UPDATE SET \
                 up_bid_price = EXCLUDED.up_bid_price, \
                 up_bid_vol = EXCLUDED.up_bid_vol, \
                 up_ask_price = EXCLUDED.up_ask_price, \
                 up_ask_vol = EXCLUDED.up_ask_vol"
            }
        }
    }
}

/// Idempotent DDL for one partition.
#[must_use]
pub fn create_table(partition: &PartitionKey) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         timestamp NUMERIC(20,5) PRIMARY KEY, \
         up_bid_price NUMERIC(20,10), \
         up_bid_vol NUMERIC(20,10), \
         up_ask_price NUMERIC(20,10), \
         up_ask_vol NUMERIC(20,10))",
        partition.quoted_table_name()
    )
}

/// Parameterized insert: `$1` timestamp, `$2` bid price, `$3` bid volume,
/// `$4` ask price, `$5` ask volume.
#[must_use]
pub fn insert_tick(partition: &PartitionKey, policy: DuplicatePolicy) -> String {
    format!(
        "INSERT INTO {} (timestamp, up_bid_price, up_bid_vol, up_ask_price, up_ask_vol) \
         VALUES ($1, $2, $3, $4, $5){}",
        partition.quoted_table_name(),
        policy.conflict_clause()
    )
}
