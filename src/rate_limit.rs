// ABOUTME: Fixed-window rate limiter for outbound WHOOP API requests
// ABOUTME: Counts requests per window, rejects at the ceiling, resets wholesale on rollover
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Fixed-Window Rate Limiting
//!
//! Requests are counted in a fixed time bucket that resets wholesale at the
//! window boundary. A request beyond the ceiling is rejected immediately,
//! never queued; retry policy belongs to the external dispatcher.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of the limiter for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Maximum requests allowed per window
    pub limit: u32,
    /// Requests remaining in the current window
    pub remaining: u32,
    /// Seconds until the current window resets
    pub resets_in_secs: u64,
}

/// Fixed-window request counter
pub struct FixedWindowLimiter {
    window_start: Instant,
    request_count: u32,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    /// Limiter allowing `max_requests` per `window`
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_requests,
            window,
        }
    }

    /// Reset the counter if the window has rolled over
    fn roll_window(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.request_count = 0;
        }
    }

    /// Count one request, or report the current count when the ceiling is reached
    ///
    /// # Errors
    ///
    /// Returns the number of requests already counted in this window when the
    /// ceiling would be exceeded. The request is rejected, not queued.
    pub fn try_acquire(&mut self) -> Result<(), u32> {
        self.roll_window();
        if self.request_count >= self.max_requests {
            return Err(self.request_count);
        }
        self.request_count += 1;
        Ok(())
    }

    /// Diagnostic snapshot of the current window
    pub fn status(&mut self) -> RateLimitStatus {
        self.roll_window();
        let elapsed = self.window_start.elapsed();
        RateLimitStatus {
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(self.request_count),
            resets_in_secs: self.window.saturating_sub(elapsed).as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_request_beyond_ceiling() {
        let mut limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }
        assert_eq!(limiter.try_acquire(), Err(3));
    }

    #[tokio::test(start_paused = true)]
    async fn window_rollover_resets_counter() {
        let mut limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(limiter.try_acquire().is_ok());
        let status = limiter.status();
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_persists_within_window() {
        let mut limiter = FixedWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(limiter.try_acquire().is_err());
    }

    #[tokio::test]
    async fn status_reports_remaining_quota() {
        let mut limiter = FixedWindowLimiter::new(5, Duration::from_secs(60));
        let _ = limiter.try_acquire();
        let _ = limiter.try_acquire();
        let status = limiter.status();
        assert_eq!(status.limit, 5);
        assert_eq!(status.remaining, 3);
    }
}
