//! Pacing for outbound access reviews.

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::{
    sync::Mutex,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// The smallest interval a [`TickerRateLimiter`] will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,

    #[error("rate limiter stopped")]
    Stopped,
}

#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Waits until a request may be issued.
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError>;

    /// Releases the limiter. Subsequent waits fail with [`RateLimitError::Stopped`].
    fn stop(&self);
}

/// Admits one request per tick of a fixed interval.
///
/// The first call to [`RateLimiter::wait`] is admitted immediately so that a
/// freshly built limiter does not delay the first request by a full interval.
pub struct TickerRateLimiter {
    period: Duration,
    created_at: Instant,
    first_taken: AtomicBool,
    stopped: CancellationToken,
    // The interval is built lazily because timers need a running runtime.
    ticker: Mutex<Option<Interval>>,
}

// === impl TickerRateLimiter ===

impl TickerRateLimiter {
    pub fn new(qps: f64) -> Self {
        Self {
            period: Self::period(qps),
            created_at: Instant::now(),
            first_taken: AtomicBool::new(false),
            stopped: CancellationToken::new(),
            ticker: Mutex::new(None),
        }
    }

    /// The tick interval for `qps`: `1s / qps`, never below [`MIN_INTERVAL`].
    pub fn period(qps: f64) -> Duration {
        Duration::try_from_secs_f64(1.0 / qps)
            .unwrap_or(MIN_INTERVAL)
            .max(MIN_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.period
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let mut ticker = tokio::select! {
            ticker = self.ticker.lock() => ticker,
            _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            _ = self.stopped.cancelled() => return Err(RateLimitError::Stopped),
        };
        let ticker = ticker.get_or_insert_with(|| {
            let mut ticker = time::interval_at(self.created_at + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        tokio::select! {
            _ = ticker.tick() => Ok(()),
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
            _ = self.stopped.cancelled() => Err(RateLimitError::Stopped),
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for TickerRateLimiter {
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if self.stopped.is_cancelled() {
            return Err(RateLimitError::Stopped);
        }
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }
        if self
            .first_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Ok(());
        }

        self.tick(cancel).await
    }

    fn stop(&self) {
        self.stopped.cancel();
    }
}

impl fmt::Debug for TickerRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickerRateLimiter")
            .field("period", &self.period)
            .field("stopped", &self.stopped.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_qps() {
        assert_eq!(TickerRateLimiter::period(5.0), Duration::from_millis(200));
        assert_eq!(TickerRateLimiter::period(1.0), Duration::from_secs(1));
        assert_eq!(TickerRateLimiter::period(1_000_000.0), MIN_INTERVAL);
        assert_eq!(TickerRateLimiter::period(-1.0), MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn first_wait_is_free_then_paced() {
        let limiter = TickerRateLimiter::new(1.0);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.wait(&cancel).await.expect("first wait must succeed");
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait(&cancel).await.expect("second wait must succeed");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(990) && elapsed <= Duration::from_millis(1010),
            "second wait took {elapsed:?}"
        );

        limiter.wait(&cancel).await.expect("third wait must succeed");
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let limiter = TickerRateLimiter::new(0.1);
        let cancel = CancellationToken::new();
        limiter.wait(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert_eq!(limiter.wait(&cancel).await, Err(RateLimitError::Cancelled));
        assert_eq!(limiter.wait(&cancel).await, Err(RateLimitError::Cancelled));
    }

    #[tokio::test]
    async fn stopped_limiter_rejects_waits() {
        let limiter = TickerRateLimiter::new(5.0);
        limiter.stop();
        assert_eq!(
            limiter.wait(&CancellationToken::new()).await,
            Err(RateLimitError::Stopped)
        );
    }
}
