use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum gap between two accepted submissions.
    pub min_interval: Duration,
    /// Trailing window for the count rule.
    pub window: Duration,
    /// Accepted submissions allowed inside `window`.
    pub max_in_window: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            window: Duration::from_secs(60),
            max_in_window: 3,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Submitting too fast, please try again in {retry_after_secs} seconds")]
    TooSoon { retry_after_secs: u64 },
    #[error("At most {max} comments can be posted per {window_secs} seconds")]
    WindowFull { max: usize, window_secs: u64 },
}

/// Client-side throttle for comment submission.
///
/// This is a UX guard only; the backend remains responsible for abuse
/// prevention. Acceptance is recorded by the caller after the write
/// succeeds, so a failed write does not consume quota.
#[derive(Debug, Clone)]
pub struct SubmissionLimiter {
    config: RateLimitConfig,
    accepted: VecDeque<i64>,
    count: u64,
}

impl SubmissionLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            accepted: VecDeque::new(),
            count: 0,
        }
    }

    /// Accepted submissions since the last reset.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last_submit_ms(&self) -> Option<i64> {
        self.accepted.back().copied()
    }

    pub fn check(&self, now_ms: i64) -> Result<(), RateLimitError> {
        let min_interval = self.config.min_interval.as_millis() as i64;
        if let Some(last) = self.last_submit_ms() {
            let elapsed = now_ms - last;
            if elapsed < min_interval {
                let remaining_ms = (min_interval - elapsed).max(0) as u64;
                return Err(RateLimitError::TooSoon {
                    retry_after_secs: remaining_ms.div_ceil(1000),
                });
            }
        }

        let window = self.config.window.as_millis() as i64;
        let in_window = self.accepted.iter().filter(|&&t| now_ms - t < window).count();
        if in_window >= self.config.max_in_window {
            return Err(RateLimitError::WindowFull {
                max: self.config.max_in_window,
                window_secs: self.config.window.as_secs(),
            });
        }

        Ok(())
    }

    pub fn record(&mut self, now_ms: i64) {
        self.count += 1;
        self.accepted.push_back(now_ms);

        let window = self.config.window.as_millis() as i64;
        while self.accepted.len() > 1 {
            match self.accepted.front() {
                Some(&oldest) if now_ms - oldest >= window => {
                    self.accepted.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn reset(&mut self) {
        self.accepted.clear();
        self.count = 0;
    }
}

impl Default for SubmissionLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1000;

    #[test]
    fn sixty_second_gate() {
        let mut limiter = SubmissionLimiter::default();
        assert!(limiter.check(0).is_ok());
        limiter.record(0);

        assert_eq!(limiter.check(30 * SEC), Err(RateLimitError::TooSoon { retry_after_secs: 30 }));
        assert!(limiter.check(61 * SEC).is_ok());
    }

    #[test]
    fn gate_boundary_is_exclusive() {
        let mut limiter = SubmissionLimiter::default();
        limiter.record(0);
        assert!(limiter.check(60 * SEC - 1).is_err());
        assert!(limiter.check(60 * SEC).is_ok());
    }

    #[test]
    fn reset_clears_state() {
        let mut limiter = SubmissionLimiter::default();
        limiter.record(0);
        assert_eq!(limiter.count(), 1);

        limiter.reset();
        assert_eq!(limiter.count(), 0);
        assert_eq!(limiter.last_submit_ms(), None);
        assert!(limiter.check(1).is_ok());
    }

    #[test]
    fn burst_config_enforces_window_count() {
        let mut limiter = SubmissionLimiter::new(RateLimitConfig {
            min_interval: Duration::ZERO,
            window: Duration::from_secs(60),
            max_in_window: 3,
        });

        for t in [0, SEC, 2 * SEC] {
            assert!(limiter.check(t).is_ok());
            limiter.record(t);
        }
        assert_eq!(
            limiter.check(3 * SEC),
            Err(RateLimitError::WindowFull { max: 3, window_secs: 60 })
        );
        // The first submission leaves the window at t=60s.
        assert!(limiter.check(60 * SEC).is_ok());
    }

    #[test]
    fn default_count_rule_never_fires_alone() {
        let mut limiter = SubmissionLimiter::default();
        let mut t = 0;
        for _ in 0..10 {
            assert!(limiter.check(t).is_ok());
            limiter.record(t);
            t += 60 * SEC;
        }
        assert_eq!(limiter.count(), 10);
    }
}
