//! Domain Layer - Order-book records and partition routing.
//!
//! Pure types with serialization support and no I/O. Everything the loader
//! decides about a record (what it contains, where it goes) is computed here.

/// Raw feed messages and the normalized tick derived from them.
pub mod tick;

/// Per-asset, per-day partition keys and table naming.
pub mod partition;
