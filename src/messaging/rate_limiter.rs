//! Start-rate cap for the job consumer: at most `max` permits per fixed window.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Window {
    started_at: Instant,
    granted: u32,
}

#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max_per_window: u32,
    window: Duration,
    current: Mutex<Window>,
}

impl FixedWindowRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            current: Mutex::new(Window {
                started_at: Instant::now(),
                granted: 0,
            }),
        }
    }

    /// Take a permit from the current window, or report how long until the next one opens
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut current = self.current.lock();

        let elapsed = now.saturating_duration_since(current.started_at);
        if elapsed >= self.window {
            current.started_at = now;
            current.granted = 0;
        }

        if current.granted < self.max_per_window {
            current.granted += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(elapsed))
        }
    }

    /// Wait until a permit is available
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            tokio::time::sleep(wait).await;
        }
    }
}
