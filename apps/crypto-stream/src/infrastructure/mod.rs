//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus process-level configuration and observability.

/// Upbit WebSocket feed client.
pub mod upbit;

/// Redis list adapter for the durable queue.
pub mod redis;

/// PostgreSQL adapter for partitioned tick storage.
pub mod postgres;

/// Environment and instance-file configuration.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;

/// Process startup and signal handling.
pub mod bootstrap;
