//! Rate limiter for outbound Bot API messages.
//!
//! Spaces out sends so the bot stays under Telegram's global message limit,
//! and holds every send back after a flood-wait answer.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct LimiterState {
    /// Last time a send was let through.
    last_operation: Option<Instant>,

    /// No send is let through before this instant.
    blocked_until: Option<Instant>,
}

/// Rate limiter that enforces minimum intervals between sends.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed sends.
    min_interval: Duration,

    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Waits until a send is allowed, then marks it as performed.
    ///
    /// Concurrent callers queue on the internal lock, so sends leave in order.
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut state = self.state.lock().await;

        let wait_duration = self.wait_needed(&state, Instant::now());
        if !wait_duration.is_zero() {
            debug!("Rate limiter: waiting {:?} before next send", wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        state.last_operation = Some(Instant::now());
        state.blocked_until = None;
        wait_duration
    }

    /// Returns the time remaining until the next send is allowed.
    pub async fn time_until_allowed(&self) -> Duration {
        let state = self.state.lock().await;
        self.wait_needed(&state, Instant::now())
    }

    /// Blocks all sends for the number of seconds Telegram asked for.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!("Received flood wait from Telegram: {} seconds", wait_seconds);
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));

        let mut state = self.state.lock().await;
        if state.blocked_until.is_none_or(|current| current < until) {
            state.blocked_until = Some(until);
        }
    }

    fn wait_needed(&self, state: &LimiterState, now: Instant) -> Duration {
        let after_interval = state
            .last_operation
            .map(|last| last + self.min_interval);

        [after_interval, state.blocked_until]
            .into_iter()
            .flatten()
            .max()
            .map_or(Duration::ZERO, |ready_at| ready_at.saturating_duration_since(now))
    }
}
