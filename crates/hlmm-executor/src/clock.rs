//! Engine clock.
//!
//! Unix milliseconds anchored at creation and advanced by the tokio clock,
//! so paused-time tests see order ages and price staleness move with
//! `tokio::time::advance`.

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_unix_ms: u64,
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(hlmm_core::now_ms())
    }

    pub fn starting_at(origin_unix_ms: u64) -> Self {
        Self {
            origin_unix_ms,
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.origin_unix_ms.saturating_add(elapsed)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_tokio_time() {
        let clock = Clock::starting_at(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.now_ms(), 3_500);
    }
}
