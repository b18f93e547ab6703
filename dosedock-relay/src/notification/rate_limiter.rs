//! Client-side rate limiting for outbound provider calls.
//!
//! Enforces a minimum spacing between requests issued by one client
//! instance, derived from a configured requests-per-second limit.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::context::DeliveryContext;
use crate::{Error, Result};

/// Longest spacing a limiter will enforce between two sends.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests per second.
    pub max_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_second: 5.0,
        }
    }
}

impl RateLimiterConfig {
    /// Create a config for a specific requests-per-second limit.
    pub fn with_rps(rps: f64) -> Result<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(Error::config(format!(
                "rate limit must be a positive finite number, got {}",
                rps
            )));
        }
        match Duration::try_from_secs_f64(1.0 / rps) {
            Ok(interval) if interval <= MAX_INTERVAL => Ok(Self {
                max_per_second: rps,
            }),
            _ => Err(Error::config(format!(
                "rate limit {} is too low, spacing would exceed {:?}",
                rps, MAX_INTERVAL
            ))),
        }
    }

    /// Minimum spacing between two sends (5/s => 200ms), capped at [`MAX_INTERVAL`].
    pub fn min_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.max_per_second)
            .map_or(MAX_INTERVAL, |interval| interval.min(MAX_INTERVAL))
    }
}

/// Minimum-interval rate limiter.
///
/// The last-send timestamp is private to this instance and only touched
/// under its mutex, so concurrent callers sharing one limiter cannot both
/// observe a stale elapsed time and skip the wait.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_interval(config.min_interval())
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Claim the next send slot and record it as the last-send timestamp.
    ///
    /// The slot is the later of "now" and "last send + interval". It is
    /// recorded before the caller waits for it, which is the moment the
    /// caller's network call will be issued.
    async fn reserve(&self) -> Instant {
        let mut last_send = self.last_send.lock().await;
        let now = Instant::now();
        let slot = match *last_send {
            Some(last) => (last + self.min_interval).max(now),
            None => now,
        };
        *last_send = Some(slot);
        slot
    }

    /// Wait until this caller may send.
    ///
    /// Returns the duration waited, or the context's error if it ends while
    /// waiting.
    ///
    /// # Cancel Safety
    ///
    /// The mutex is held only while the slot is computed, never across the
    /// wait. A caller abandoned mid-wait keeps its reserved slot, so later
    /// callers are spaced as if it had sent.
    pub async fn acquire(&self, ctx: &DeliveryContext) -> Result<Duration> {
        let slot = self.reserve().await;
        let wait = slot.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            return Ok(wait);
        }

        trace!(wait = ?wait, "rate limited");
        ctx.sleep_until(slot).await?;
        Ok(wait)
    }

    /// Time a new caller would have to wait right now.
    pub async fn time_until_available(&self) -> Duration {
        match *self.last_send.lock().await {
            Some(last) => (last + self.min_interval).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
