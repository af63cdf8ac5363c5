use std::future::Future;
use std::time::Duration;

use freshdesk_core::FreshdeskError;
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self {
            base,
            max,
            jitter,
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(0..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn retry<T, F, Fut>(&self, op: F) -> Result<T, FreshdeskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FreshdeskError>>,
    {
        self.retry_if(FreshdeskError::is_retryable, op).await
    }

    /// Like [`Backoff::retry`] for calls that must not be applied twice:
    /// only rejected requests are resent.
    pub async fn retry_create<T, F, Fut>(&self, op: F) -> Result<T, FreshdeskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FreshdeskError>>,
    {
        self.retry_if(FreshdeskError::is_safe_to_resend, op).await
    }

    async fn retry_if<T, F, Fut>(
        &self,
        resend: fn(&FreshdeskError) -> bool,
        mut op: F,
    ) -> Result<T, FreshdeskError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FreshdeskError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if resend(&err) && attempt + 1 < self.max_attempts => {
                    let delay = self.delay(attempt);
                    debug!(attempt, ?delay, error = %err, "retrying remote call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
