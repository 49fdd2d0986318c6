//! PostgreSQL adapter for the [`TickStore`](crate::application::ports::TickStore) port.

pub mod statements;
mod store;

pub use statements::DuplicatePolicy;
pub use store::{PgConnector, PgTickStore, UNDEFINED_TABLE, classify};
