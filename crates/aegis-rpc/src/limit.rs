//! Per-subject sliding-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use aegis_core::error::AegisError;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window per subject. Subjects are addresses (or the
/// peer identity for unauthenticated calls); stale windows are evicted as
/// they are touched.
pub struct RateLimiter {
    max_per_minute: u32,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self { max_per_minute, windows: Mutex::new(HashMap::new()) }
    }

    /// Count one request for `subject`, rejecting with `RateLimited` when
    /// the window budget is exhausted.
    pub fn check(&self, subject: &str) -> Result<(), AegisError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let window = windows.entry(subject.to_string()).or_default();

        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_per_minute as usize {
            let oldest = *window.front().expect("non-empty window");
            let retry_after = WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(AegisError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drop windows that have gone fully idle. Called from the background
    /// reaper so abandoned subjects do not accumulate.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        windows.retain(|_, window| {
            window.back().is_some_and(|last| now.duration_since(*last) < WINDOW)
        });
    }
}
