use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Minimum spacing between consecutive upstream-bound lookups.
#[derive(Debug)]
pub struct RequestGap {
    last_finished: Option<Instant>,
    min_delay: Duration,
}

impl RequestGap {
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            last_finished: None,
            min_delay,
        }
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Sleep until `min_delay` has passed since the last [`mark`](Self::mark).
    ///
    /// Returns how long it slept.
    pub async fn wait(&self) -> Duration {
        let Some(last) = self.last_finished else {
            return Duration::ZERO;
        };

        let ready_at = last + self.min_delay;
        let now = Instant::now();
        if ready_at <= now {
            return Duration::ZERO;
        }

        sleep_until(ready_at).await;
        ready_at - now
    }

    /// Record that an upstream-bound lookup just finished.
    pub fn mark(&mut self) {
        self.last_finished = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_wait_is_free() {
        let gap = RequestGap::new(Duration::from_millis(1000));
        assert_eq!(gap.wait().await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fills_remaining_gap() {
        let mut gap = RequestGap::new(Duration::from_millis(1000));
        gap.mark();
        tokio::time::advance(Duration::from_millis(300)).await;

        let start = Instant::now();
        let slept = gap.wait().await;
        assert_eq!(slept, Duration::from_millis(700));
        assert!(start.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_gap_elapsed() {
        let mut gap = RequestGap::new(Duration::from_millis(1000));
        gap.mark();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(gap.wait().await, Duration::ZERO);
    }
}
