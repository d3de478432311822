use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_CALLS_PER_MINUTE: usize = 60;

/// Upper bound on a single sleep so a shortened budget is noticed promptly.
const MAX_SLEEP: Duration = Duration::from_millis(250);

/// Sliding-window rate limiter shared by every ad-platform call in a run.
/// Constructed once per process and passed by reference; callers block in
/// `acquire` until a slot frees.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_minute(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Block until a call slot is available, then claim it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self
                    .timestamps
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let now = Instant::now();
                while let Some(oldest) = stamps.front() {
                    if now.duration_since(*oldest) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }
                if stamps.len() < self.max_calls {
                    stamps.push_back(now);
                    return;
                }
                match stamps.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            std::thread::sleep(wait.min(MAX_SLEEP).max(Duration::from_millis(1)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_under_budget_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire();
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_acquire_over_budget_waits_for_window() {
        let window = Duration::from_millis(300);
        let limiter = RateLimiter::new(2, window);
        let started = Instant::now();
        limiter.acquire();
        limiter.acquire();
        // Third call must wait until the first timestamp ages out.
        limiter.acquire();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_zero_budget_clamps_to_one() {
        let limiter = RateLimiter::new(0, Duration::from_millis(50));
        limiter.acquire();
    }
}
