//! Rate Limiting Infrastructure
//!
//! Fixed-window arithmetic shared by every store backend. A window opens at
//! the first request and stays current while `now - window_start < window`;
//! after that the next request opens a fresh window with a count of 1.

use std::time::Duration;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Counter state of one `(key, action)` window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub count: u32,
    pub window_start_ms: i64,
}

impl FixedWindow {
    /// Whether the window is still current at `now_ms`
    pub fn is_current(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms - self.window_start_ms < window_ms
    }

    /// Count one request: increment the current window or open a new one
    pub fn advance(current: Option<FixedWindow>, now_ms: i64, window_ms: i64) -> FixedWindow {
        match current {
            Some(w) if w.is_current(now_ms, window_ms) => FixedWindow {
                count: w.count.saturating_add(1),
                window_start_ms: w.window_start_ms,
            },
            _ => FixedWindow {
                count: 1,
                window_start_ms: now_ms,
            },
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    /// Decide from the post-increment window
    pub fn from_window(window: FixedWindow, config: &RateLimitConfig) -> Self {
        Self {
            allowed: window.count <= config.max_requests,
            remaining: config.max_requests.saturating_sub(window.count),
            reset_at_ms: window.window_start_ms + config.window_ms(),
        }
    }
}
