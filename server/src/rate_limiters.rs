use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

use crate::server_config::PromptLimits;

/// Throttles outgoing prompts and pauses dispatch after a rate-limit error.
#[derive(Clone)]
pub struct RateLimiters {
    prompt: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl RateLimiters {
    pub fn new(
        prompt_limit_per_sec: usize,
        prompt_interval_ms: usize,
        prompt_refill: usize,
        backoff_duration: Duration,
    ) -> Self {
        let prompt = RateLimiter::builder()
            .initial(1)
            .interval(Duration::from_millis(prompt_interval_ms as u64))
            .max(prompt_limit_per_sec)
            .refill(prompt_refill)
            .build();

        Self {
            prompt: Arc::new(prompt),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration,
        }
    }

    pub fn from_config(limits: &PromptLimits) -> Self {
        Self::new(
            limits.rate_limit_per_sec,
            limits.refill_interval_ms,
            limits.refill_amount,
            Duration::from_secs(limits.backoff_secs),
        )
    }

    pub async fn acquire_one(&self) {
        if self.backoff.load(Relaxed) {
            tokio::time::sleep(self.backoff_duration).await;
        }
        self.prompt.acquire_one().await;
    }

    pub fn trigger_backoff(&self) {
        if self.backoff_duration.is_zero() {
            return;
        }
        tracing::info!("Triggering backoff for {:?}...", self.backoff_duration);
        self.backoff.store(true, Relaxed);
        let self_ = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self_.backoff_duration).await;
            tracing::info!("Backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    pub fn is_backing_off(&self) -> bool {
        self.backoff.load(Relaxed)
    }

    pub fn get_status(&self) -> String {
        let prompt_bucket = format!("{}/{}", self.prompt.balance(), self.prompt.max());
        if self.backoff.load(Relaxed) {
            format!("prompts: {} (BACKOFF)", prompt_bucket)
        } else {
            format!("prompts: {}", prompt_bucket)
        }
    }
}

#[cfg(test)]
impl RateLimiters {
    /// Effectively unthrottled limiter with backoff disabled.
    pub fn unthrottled() -> Self {
        Self::new(10_000, 1, 10_000, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_backoff_is_ignored() {
        let limiters = RateLimiters::unthrottled();
        limiters.trigger_backoff();
        assert!(!limiters.is_backing_off());
        limiters.acquire_one().await;
    }

    #[tokio::test]
    async fn test_backoff_expires() {
        let limiters = RateLimiters::new(10, 1, 10, Duration::from_millis(20));
        limiters.trigger_backoff();
        assert!(limiters.is_backing_off());
        assert!(limiters.get_status().contains("BACKOFF"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!limiters.is_backing_off());
    }
}
