//! Jittered exponential backoff for outbound network calls.

use {
    rand::Rng,
    std::{fmt::Display, future::Future, time::Duration},
};

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    /// How many times a failed operation is retried, in addition to the
    /// initial attempt.
    pub retries: u32,
    pub min_back_off: Duration,
    pub max_back_off: Duration,
    pub back_off_growth_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            min_back_off: Duration::from_millis(200),
            max_back_off: Duration::from_secs(5),
            back_off_growth_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Back off before the given retry, including up to 50% random jitter so
    /// that concurrent retries spread out.
    fn back_off(&self, retry: u32) -> Duration {
        let factor = self.back_off_growth_factor.powi(retry as i32);
        let back_off = self.min_back_off.as_secs_f64() * factor;
        let back_off = back_off.min(self.max_back_off.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(1.0..1.5);
        Duration::from_secs_f64(back_off * jitter)
    }
}

/// Runs the operation, retrying failures with jittered exponential backoff.
/// The last error is returned when all attempts fail.
pub async fn with_back_off<T, E, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut run: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0;
    loop {
        match run().await {
            Ok(value) => return Ok(value),
            Err(err) if retry < config.retries => {
                let back_off = config.back_off(retry);
                tracing::debug!(%err, operation, retry, ?back_off, "retrying failed operation");
                tokio::time::sleep(back_off).await;
                retry += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    fn fast_config(retries: u32) -> RetryConfig {
        RetryConfig {
            retries,
            min_back_off: Duration::from_millis(1),
            max_back_off: Duration::from_millis(2),
            back_off_growth_factor: 1.0,
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let attempts = AtomicU32::new(0);
        let result = with_back_off(&fast_config(2), "test", || async {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0 => Err("boom"),
                _ => Ok(42),
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_configured_retries() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = with_back_off(&fast_config(2), "test", || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
