//! Process-wide rate limiting for chat-completion calls.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Shared token bucket covering every chat call in the process.
///
/// Both gateway operations draw from the same bucket; a call that would
/// exceed the budget suspends until a slot frees. A slot is held for one
/// HTTP attempt; retries reacquire.
pub struct LlmRateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl LlmRateLimiter {
    /// Create a limiter admitting `calls_per_minute` calls per rolling
    /// 60-second window.
    pub fn new(calls_per_minute: u32) -> Self {
        let cells = NonZeroU32::new(calls_per_minute.max(1)).expect("clamped to >= 1");
        Self {
            inner: RateLimiter::direct(Quota::per_minute(cells)),
        }
    }

    /// Wait until a call slot is available.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Take a slot immediately if one is available.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

impl std::fmt::Debug for LlmRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_first_call_is_denied_within_the_window() {
        let limiter = LlmRateLimiter::new(60);
        for _ in 0..60 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_budget_is_clamped_to_one() {
        let limiter = LlmRateLimiter::new(0);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
