//! Connection Supervisor
//!
//! Blocks until a connector yields a working handle. Call sites treat
//! acquisition as an operation that always eventually succeeds, so none of
//! them carries its own connection-establishment error handling.

use tokio_util::sync::CancellationToken;

use super::retry::{RetryConfig, RetryPolicy};
use crate::application::ports::Connector;
use crate::infrastructure::metrics;

/// Acquires connections with indefinite retry.
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    /// Create a supervisor with the given retry schedule.
    #[must_use]
    pub const fn new(retry: RetryConfig, cancel: CancellationToken) -> Self {
        Self { retry, cancel }
    }

    /// Supervisor with the default fixed 5 second delay.
    #[must_use]
    pub fn with_default_retry(cancel: CancellationToken) -> Self {
        Self::new(RetryConfig::default(), cancel)
    }

    /// Token observed while waiting between attempts.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Connect, retrying until success.
    ///
    /// Every failed attempt is logged at error level before sleeping. Returns
    /// `None` only if the cancellation token fires.
    pub async fn acquire<C: Connector>(&self, connector: &C) -> Option<C::Handle> {
        let mut policy = RetryPolicy::new(self.retry.clone());

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match connector.connect().await {
                Ok(handle) => {
                    tracing::info!(
                        target_name = connector.target(),
                        attempts = policy.attempt_count() + 1,
                        "Connected"
                    );
                    return Some(handle);
                }
                Err(e) => {
                    metrics::record_connection_failure(connector.target());

                    let delay = policy.next_delay();

                    tracing::error!(
                        target_name = connector.target(),
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "Connection failed, retrying"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => return None,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
