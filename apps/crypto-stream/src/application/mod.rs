//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the pipeline services and the port interfaces that
//! define how they reach the queue service and the relational store.

/// Port interfaces for external systems (queue, store, connectors).
pub mod ports;

/// Application services: connection supervision and the loader.
pub mod services;
