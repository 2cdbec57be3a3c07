//! Request rate limiting and per-case cooldowns
//!
//! Process-wide state behind a short mutex. Windows reset lazily on
//! access; a background pruner drops idle entries so the maps stay
//! bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Background prune cadence
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

struct Window {
    reset_at: Instant,
    count: u32,
}

#[derive(Default)]
struct LimiterInner {
    windows: HashMap<String, Window>,
    cooldowns: HashMap<String, Instant>,
}

/// Sliding-window limiter plus keyed cooldowns
pub struct RateLimiter {
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(LimiterInner::default()),
        })
    }

    /// Consume one slot under `key`. Returns `false` when the window is
    /// exhausted.
    pub fn take(&self, key: &str, limit: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        let entry = inner.windows.entry(key.to_string()).or_insert(Window {
            reset_at: now + window,
            count: 0,
        });
        if now >= entry.reset_at {
            entry.reset_at = now + window;
            entry.count = 0;
        }
        if entry.count >= limit {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Acquire the cooldown under `key`. Returns 0 on success, otherwise
    /// the remaining whole seconds.
    pub fn take_cooldown(&self, key: &str, cooldown: Duration) -> u64 {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        if let Some(until) = inner.cooldowns.get(key) {
            if *until > now {
                let remaining = until.duration_since(now);
                return remaining.as_secs().max(1);
            }
        }
        inner.cooldowns.insert(key.to_string(), now + cooldown);
        0
    }

    /// Drop expired windows and cooldowns.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        inner.windows.retain(|_, w| w.reset_at > now);
        inner.cooldowns.retain(|_, until| *until > now);
        debug!(
            windows = inner.windows.len(),
            cooldowns = inner.cooldowns.len(),
            "Rate limiter pruned"
        );
    }

    /// Spawn the background pruner task.
    pub fn spawn_pruner(self: Arc<Self>, interval: Duration) {
        let limiter = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.prune();
            }
        });
    }
}
