//! Per-connection rate limiting (spec §5: `msgs_per_sec` / `bytes_per_sec`).
//! A fixed one-second window tracking both a message count and a byte
//! count; either one tripping drops the connection's next frame.

use std::time::{Duration, Instant};
use voice_gateway_config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Drop,
}

/// One connection's rolling one-second window. Not `Clone`/`Send`-shared;
/// each `websocket` task owns its own instance.
pub struct RateLimiter {
    msgs_per_sec: u32,
    bytes_per_sec: u32,
    window_start: Instant,
    msgs_in_window: u32,
    bytes_in_window: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            msgs_per_sec: config.msgs_per_sec,
            bytes_per_sec: config.bytes_per_sec,
            window_start: Instant::now(),
            msgs_in_window: 0,
            bytes_in_window: 0,
        }
    }

    /// Call once per inbound frame, before it's handed to the session.
    pub fn check(&mut self, frame_bytes: usize) -> RateDecision {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= WINDOW {
            self.window_start = now;
            self.msgs_in_window = 0;
            self.bytes_in_window = 0;
        }

        self.msgs_in_window += 1;
        self.bytes_in_window += frame_bytes as u64;

        if self.msgs_in_window > self.msgs_per_sec || self.bytes_in_window > self.bytes_per_sec as u64 {
            RateDecision::Drop
        } else {
            RateDecision::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(msgs_per_sec: u32, bytes_per_sec: u32) -> RateLimitConfig {
        RateLimitConfig { msgs_per_sec, bytes_per_sec }
    }

    #[test]
    fn allows_under_the_limit() {
        let mut limiter = RateLimiter::new(config(10, 10_000));
        for _ in 0..5 {
            assert_eq!(limiter.check(100), RateDecision::Allow);
        }
    }

    #[test]
    fn drops_once_message_count_exceeds_the_window_limit() {
        let mut limiter = RateLimiter::new(config(3, 1_000_000));
        assert_eq!(limiter.check(1), RateDecision::Allow);
        assert_eq!(limiter.check(1), RateDecision::Allow);
        assert_eq!(limiter.check(1), RateDecision::Allow);
        assert_eq!(limiter.check(1), RateDecision::Drop);
    }

    #[test]
    fn drops_once_byte_count_exceeds_the_window_limit() {
        let mut limiter = RateLimiter::new(config(1_000, 100));
        assert_eq!(limiter.check(60), RateDecision::Allow);
        assert_eq!(limiter.check(60), RateDecision::Drop);
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let mut limiter = RateLimiter::new(config(1, 1_000_000));
        assert_eq!(limiter.check(1), RateDecision::Allow);
        assert_eq!(limiter.check(1), RateDecision::Drop);
        limiter.window_start -= Duration::from_millis(1100);
        assert_eq!(limiter.check(1), RateDecision::Allow);
    }
}
