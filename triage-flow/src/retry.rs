//! Retry-with-backoff around a [`LanguageModel`].
//!
//! Rate-limited calls are retried without an attempt ceiling, waiting
//! `min(base * 2^(attempt-1), cap)` between attempts. Every other failure is
//! returned to the caller on the spot. There is no jitter.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{error::ModelError, model::LanguageModel};

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(300);

/// Something that can wait. Injected so tests can run backoff schedules instantly.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Unbounded exponential backoff for retryable model errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable: fn(&ModelError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            retryable: ModelError::is_rate_limit,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_retryable(mut self, retryable: fn(&ModelError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self, error: &ModelError) -> bool {
        (self.retryable)(error)
    }

    /// Wait before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(attempt - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// A [`LanguageModel`] wrapper that applies a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryingModel {
    model: Arc<dyn LanguageModel>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingModel {
    pub fn new(model: Arc<dyn LanguageModel>, policy: RetryPolicy) -> Self {
        Self {
            model,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call the model, backing off for as long as it keeps rate limiting us.
    pub async fn call(&self, prompt: &str) -> Result<String, ModelError> {
        let mut attempt: u32 = 1;
        loop {
            match self.model.complete(prompt).await {
                Ok(text) => {
                    debug!(attempt, "Model call succeeded");
                    return Ok(text);
                }
                Err(e) if self.policy.is_retryable(&e) => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Model call rate limited, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LanguageModel for RetryingModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.call(prompt).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records requested sleeps instead of waiting.
    #[derive(Default)]
    pub struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Replays a fixed script of replies, one per call.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Request("script exhausted".into())))
        }
    }
}
