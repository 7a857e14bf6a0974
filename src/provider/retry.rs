use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ConfigFetcher, FetchError, RawConfig};

/// Backoff settings for [`RetryingFetcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Caller-side decorator that retries transient fetch failures with
/// exponential backoff. The scan engine itself never retries.
pub struct RetryingFetcher<F> {
    inner: F,
    config: RetryConfig,
}

impl<F: ConfigFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<F: ConfigFetcher> ConfigFetcher for RetryingFetcher<F> {
    async fn fetch(&self, resource_id: &str) -> std::result::Result<RawConfig, FetchError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(resource_id).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    attempt += 1;
                    warn!(
                        resource_id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(resource_id, attempts = attempt + 1, error = %e, "fetch giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        error: FetchError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ConfigFetcher for Flaky {
        async fn fetch(&self, _id: &str) -> std::result::Result<RawConfig, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(serde_json::json!({ "ok": true }))
            }
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.backoff(0), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(1), Duration::from_millis(2000));
        assert_eq!(cfg.backoff(2), Duration::from_millis(4000));
        assert_eq!(cfg.backoff(3), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let fetcher = RetryingFetcher::new(
            Flaky {
                failures: 2,
                error: FetchError::Transport("reset".into()),
                calls: AtomicU32::new(0),
            },
            fast(),
        );
        assert!(fetcher.fetch("r").await.is_ok());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let fetcher = RetryingFetcher::new(
            Flaky {
                failures: 5,
                error: FetchError::NotFound,
                calls: AtomicU32::new(0),
            },
            fast(),
        );
        assert_eq!(fetcher.fetch("r").await.unwrap_err(), FetchError::NotFound);
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let fetcher = RetryingFetcher::new(
            Flaky {
                failures: 10,
                error: FetchError::Timeout(Duration::from_millis(5)),
                calls: AtomicU32::new(0),
            },
            fast(),
        );
        assert!(fetcher.fetch("r").await.is_err());
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 4);
    }
}
