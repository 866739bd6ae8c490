//! Fixed inter-page pacing
//!
//! One unconditional delay between successive page fetches is the sole
//! backpressure applied to the upstream API. The wait is cancelable so an
//! interrupted run can unwind straight to persistence.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Enforces the fixed delay between successive page fetches.
#[derive(Clone, Copy, Debug)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    /// Create a pacer with the given fixed delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the fixed delay, or return early on cancellation.
    ///
    /// Returns `true` when the full delay elapsed and `false` when the
    /// wait was interrupted.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        if self.delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => true,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn wait_completes_after_the_configured_delay() {
        let pacer = Pacer::new(Duration::from_millis(30));
        let cancel = CancellationToken::new();

        let started = Instant::now();
        assert!(pacer.wait(&cancel).await);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn zero_delay_returns_immediately() {
        let pacer = Pacer::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        assert!(pacer.wait(&cancel).await);
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let pacer = Pacer::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(!pacer.wait(&cancel).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_even_a_zero_delay() {
        let pacer = Pacer::new(Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!pacer.wait(&cancel).await);
    }
}
