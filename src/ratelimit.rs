//! Request-budget rate limiting shared by one API client.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token-budget limiter fed from response metadata.
///
/// Each response reports the remaining request budget and when the window
/// resets. Once the budget hits zero, [`RateLimiter::acquire`] suspends the
/// caller with a single bounded sleep until the reset instant; concurrent
/// callers in the same process serialize behind the internal lock.
pub struct RateLimiter {
    state: Mutex<Budget>,
}

struct Budget {
    remaining: u32,
    reset_at: Instant,
}

impl RateLimiter {
    /// A fresh limiter assumes a full window until the first response says
    /// otherwise.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Budget {
                remaining: u32::MAX,
                reset_at: Instant::now(),
            }),
        }
    }

    /// Wait until a request may be dispatched, consuming one budget unit.
    pub async fn acquire(&self) {
        let mut budget = self.state.lock().await;
        if budget.remaining == 0 {
            let reset_at = budget.reset_at;
            let now = Instant::now();
            if now < reset_at {
                let wait = reset_at - now;
                tracing::info!(wait_secs = wait.as_secs_f64(), "rate limit exhausted, waiting for reset");
                tokio::time::sleep_until(reset_at).await;
            }
            // Past the reset instant the window is fresh; the next response
            // will report the real remaining budget.
        } else {
            budget.remaining -= 1;
        }
    }

    /// Record budget metadata from a response.
    pub async fn update(&self, remaining: u32, reset_after: Duration) {
        let mut budget = self.state.lock().await;
        budget.remaining = remaining;
        budget.reset_at = Instant::now() + reset_after;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
