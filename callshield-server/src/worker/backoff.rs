//! Model-call pacing and rate-limit backoff
//!
//! Each call's worker owns one `ModelPacing` value. It tracks the last
//! model run (minimum-interval gate) and the 429 backoff window
//! (exponential, honoring Retry-After). The state never leaves the
//! worker task.

use std::time::{Duration, Instant};

/// Consecutive-429 streak resets after this much quiet time
const STREAK_RESET_AFTER: Duration = Duration::from_millis(90_000);

/// First backoff step on a 429
const BASE_BACKOFF_MS: u64 = 6_000;

/// Backoff ceiling
const MAX_BACKOFF_MS: u64 = 60_000;

/// Per-call model pacing state
#[derive(Debug, Default)]
pub struct ModelPacing {
    cool_until: Option<Instant>,
    rate_limit_streak: u32,
    last_rate_limit_at: Option<Instant>,
    last_model_run_at: Option<Instant>,
}

impl ModelPacing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the rate-limit cooldown has elapsed.
    pub fn cooldown_over(&self, now: Instant) -> bool {
        match self.cool_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Whether the minimum interval since the last model run has passed
    /// (trivially true before the first run).
    pub fn interval_elapsed(&self, now: Instant, min_interval: Duration) -> bool {
        match self.last_model_run_at {
            Some(last) => now.duration_since(last) >= min_interval,
            None => true,
        }
    }

    /// Record a successful model run: backoff fully clears.
    pub fn on_success(&mut self, now: Instant) {
        self.cool_until = None;
        self.rate_limit_streak = 0;
        self.last_rate_limit_at = None;
        self.last_model_run_at = Some(now);
    }

    /// Record a non-429 failure: no cooldown, but the minimum-interval
    /// gate still applies to the next attempt.
    pub fn on_failure(&mut self, now: Instant) {
        self.last_model_run_at = Some(now);
    }

    /// Record a 429: extend the cooldown exponentially, honoring any
    /// provider-requested wait.
    pub fn on_rate_limited(&mut self, now: Instant, retry_after_ms: Option<u64>) {
        if let Some(last) = self.last_rate_limit_at {
            if now.duration_since(last) > STREAK_RESET_AFTER {
                self.rate_limit_streak = 0;
            }
        }
        self.rate_limit_streak += 1;
        self.last_rate_limit_at = Some(now);
        self.last_model_run_at = Some(now);

        let exp = BASE_BACKOFF_MS
            .saturating_mul(1u64 << (self.rate_limit_streak - 1).min(16))
            .min(MAX_BACKOFF_MS);
        let wait = exp.max(retry_after_ms.unwrap_or(0));
        self.cool_until = Some(now + Duration::from_millis(wait));
    }

    #[cfg(test)]
    fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cool_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_permits_everything() {
        let pacing = ModelPacing::new();
        let now = Instant::now();
        assert!(pacing.cooldown_over(now));
        assert!(pacing.interval_elapsed(now, Duration::from_secs(3)));
    }

    #[test]
    fn first_429_backs_off_six_seconds() {
        let mut pacing = ModelPacing::new();
        let now = Instant::now();
        pacing.on_rate_limited(now, None);
        assert_eq!(pacing.cooldown_remaining(now), Duration::from_millis(6_000));
        assert!(!pacing.cooldown_over(now + Duration::from_millis(5_999)));
        assert!(pacing.cooldown_over(now + Duration::from_millis(6_000)));
    }

    #[test]
    fn retry_after_extends_past_exponential() {
        let mut pacing = ModelPacing::new();
        let now = Instant::now();
        pacing.on_rate_limited(now, Some(8_000));
        assert_eq!(pacing.cooldown_remaining(now), Duration::from_millis(8_000));
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let mut pacing = ModelPacing::new();
        let mut now = Instant::now();
        let expected = [6_000u64, 12_000, 24_000, 48_000, 60_000, 60_000];
        for want in expected {
            pacing.on_rate_limited(now, None);
            assert_eq!(
                pacing.cooldown_remaining(now),
                Duration::from_millis(want)
            );
            now += Duration::from_secs(1);
        }
    }

    #[test]
    fn quiet_period_resets_streak() {
        let mut pacing = ModelPacing::new();
        let now = Instant::now();
        pacing.on_rate_limited(now, None);
        pacing.on_rate_limited(now + Duration::from_secs(1), None);
        assert_eq!(
            pacing.cooldown_remaining(now + Duration::from_secs(1)),
            Duration::from_millis(12_000)
        );

        // 91 seconds of quiet resets to the first step
        let later = now + Duration::from_secs(92);
        pacing.on_rate_limited(later, None);
        assert_eq!(
            pacing.cooldown_remaining(later),
            Duration::from_millis(6_000)
        );
    }

    #[test]
    fn success_clears_backoff() {
        let mut pacing = ModelPacing::new();
        let now = Instant::now();
        pacing.on_rate_limited(now, Some(30_000));
        pacing.on_success(now + Duration::from_secs(1));
        assert!(pacing.cooldown_over(now + Duration::from_secs(1)));
        assert!(!pacing.interval_elapsed(
            now + Duration::from_secs(2),
            Duration::from_secs(3)
        ));
    }

    #[test]
    fn plain_failure_only_bumps_interval() {
        let mut pacing = ModelPacing::new();
        let now = Instant::now();
        pacing.on_failure(now);
        assert!(pacing.cooldown_over(now));
        assert!(!pacing.interval_elapsed(now + Duration::from_secs(1), Duration::from_secs(3)));
        assert!(pacing.interval_elapsed(now + Duration::from_secs(3), Duration::from_secs(3)));
    }
}
