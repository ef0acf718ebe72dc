//! Rate Limiter (C4): per-session sliding-window admission control.
//!
//! Grounded on the teacher's `security::policy::SlidingWindow`, a single
//! `Mutex<VecDeque<Instant>>` rate gate. That structure is kept nearly
//! verbatim here but lifted into a per-session map (`DashMap`) since the
//! spec's rate limiter must admit or reject independently per `session_id`
//! rather than globally.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_CALLS_PER_MINUTE: usize = 60;

/// A single session's rolling window of recent call timestamps.
struct SlidingWindow {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    fn new() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Evict timestamps older than `window`, then admit if the remaining
    /// count is still under `max_calls`.
    fn try_admit(&self, window: Duration, max_calls: usize, now: Instant) -> bool {
        #[allow(clippy::unwrap_used)]
        let mut timestamps = self.timestamps.lock().unwrap();
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() < max_calls {
            timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn count(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.timestamps.lock().unwrap().len()
    }
}

/// Per-session FIFO sliding-window rate limiter (§4.4).
pub struct RateLimiter {
    window: Duration,
    max_calls: usize,
    sessions: DashMap<String, SlidingWindow>,
}

impl RateLimiter {
    pub fn new(window_secs: u64, calls_per_window: usize) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            max_calls: calls_per_window,
            sessions: DashMap::new(),
        }
    }

    /// Returns `true` if `session_id` may make another call right now, and
    /// records the call if so. Never blocks — a rejection is a substituted
    /// `RATE_LIMIT_EXCEEDED` tool result, not backpressure (§5).
    pub fn allow(&self, session_id: &str) -> bool {
        self.allow_at(session_id, Instant::now())
    }

    fn allow_at(&self, session_id: &str, now: Instant) -> bool {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SlidingWindow::new);
        entry.try_admit(self.window, self.max_calls, now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_CALLS_PER_MINUTE)
    }
}
