//! Application Services
//!
//! - `retry`: fixed or exponential retry schedule
//! - `supervisor`: connection acquisition that never gives up
//! - `loader`: queue-to-store consumer with batched commits

pub mod loader;
pub mod retry;
pub mod supervisor;

pub use loader::{
    AbandonReason, DropReason, Loader, LoaderConfig, LoaderState, LoaderStats, StepOutcome,
};
pub use retry::{RetryConfig, RetryPolicy};
pub use supervisor::ConnectionSupervisor;
