use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

/// Outcome of a limiter check. `retry_after_seconds` tells the client when
/// the shared window rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { retry_after_seconds: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

struct WindowState {
    counts: HashMap<String, usize>,
    window_start: Instant,
}

/// Fixed-window counter shared by every client key.
///
/// One global window: when it elapses, the whole map is cleared and every
/// key starts over at the same instant. This is intentionally coarse and
/// vulnerable to burst-at-boundary abuse (a client can spend the full limit
/// just before a reset and again just after); counters live only in process
/// memory, so a restart silently forgives everyone.
pub struct FixedWindowLimiter {
    limit: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                counts: HashMap::new(),
                window_start: Instant::now(),
            }),
        }
    }

    /// Check-then-increment under a single lock acquisition, so concurrent
    /// requests for the same key cannot both slip under the ceiling.
    pub async fn check_and_consume(&self, key: &str) -> Decision {
        self.check_and_consume_at(key, Instant::now()).await
    }

    async fn check_and_consume_at(&self, key: &str, now: Instant) -> Decision {
        let mut state = self.state.lock().await;

        if now.duration_since(state.window_start) > self.window {
            state.counts.clear();
            state.window_start = now;
        }

        let count = state.counts.get(key).copied().unwrap_or(0);
        if count >= self.limit {
            let elapsed = now.duration_since(state.window_start);
            let remaining = self.window.saturating_sub(elapsed);
            return Decision::Denied {
                retry_after_seconds: remaining.as_secs().max(1),
            };
        }

        state.counts.insert(key.to_string(), count + 1);
        Decision::Allowed
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.state.lock().await.counts.len()
    }
}
