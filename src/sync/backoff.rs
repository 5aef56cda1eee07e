//! Failure bookkeeping for the poll loop.
//!
//! Two counters are tracked. `retry_count` is the per-episode fast-retry
//! budget; once spent, failures fall back to the normal interval until a
//! success. `consecutive_errors` spans the whole run and only a success
//! clears it; reaching the ceiling forces an extended cooldown and halves it.

use std::time::Duration;

use serde::Serialize;

use crate::config::SyncConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_retries: u32,
    pub max_consecutive_errors: u32,
    pub cooldown_multiplier: u32,
    pub max_cooldown: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            base_delay: config.retry_base_delay,
            multiplier: config.retry_multiplier,
            max_delay: config.retry_max_delay,
            max_retries: config.max_retries,
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            cooldown_multiplier: config.cooldown_multiplier,
            max_cooldown: config.max_cooldown,
        }
    }

    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn cooldown(&self, interval: Duration) -> Duration {
        interval
            .saturating_mul(self.cooldown_multiplier)
            .min(self.max_cooldown)
    }
}

/// What the loop should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "delayMs", rename_all = "camelCase")]
pub enum NextAttempt {
    Retry(u64),
    Interval,
    Cooldown(u64),
}

impl NextAttempt {
    pub fn delay(&self, interval: Duration) -> Duration {
        match self {
            NextAttempt::Retry(ms) | NextAttempt::Cooldown(ms) => Duration::from_millis(*ms),
            NextAttempt::Interval => interval,
        }
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, NextAttempt::Cooldown(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    policy: BackoffPolicy,
    retry_count: u32,
    consecutive_errors: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            retry_count: 0,
            consecutive_errors: 0,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn on_success(&mut self) {
        self.retry_count = 0;
        self.consecutive_errors = 0;
    }

    pub fn on_failure(&mut self, auth: bool, interval: Duration) -> NextAttempt {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        if self.consecutive_errors >= self.policy.max_consecutive_errors {
            self.consecutive_errors /= 2;
            self.retry_count = 0;
            return NextAttempt::Cooldown(millis(self.policy.cooldown(interval)));
        }

        if auth || self.retry_count >= self.policy.max_retries {
            return NextAttempt::Interval;
        }

        let delay = self.policy.retry_delay(self.retry_count);
        self.retry_count += 1;
        NextAttempt::Retry(millis(delay))
    }

    pub fn reset(&mut self) {
        self.on_success();
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(5);

    #[test]
    fn retry_delays_grow_until_cap() {
        let policy = BackoffPolicy::default();
        let delays: Vec<Duration> = (0..6).map(|n| policy.retry_delay(n)).collect();

        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[1], Duration::from_secs(3));
        assert_eq!(delays[2], Duration::from_millis(4500));
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(delays[5], Duration::from_secs(10));
    }

    #[test]
    fn four_failures_retry_then_fall_back_to_interval() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let steps: Vec<NextAttempt> = (0..4).map(|_| backoff.on_failure(false, INTERVAL)).collect();

        assert_eq!(
            steps,
            vec![
                NextAttempt::Retry(2000),
                NextAttempt::Retry(3000),
                NextAttempt::Retry(4500),
                NextAttempt::Interval,
            ]
        );
        let delays: Vec<Duration> = steps.iter().map(|s| s.delay(INTERVAL)).collect();
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(backoff.consecutive_errors(), 4);
    }

    #[test]
    fn cooldown_fires_at_ceiling_not_before() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        for n in 1..8 {
            let step = backoff.on_failure(false, INTERVAL);
            assert!(!step.is_cooldown(), "cooldown too early at failure {n}");
        }

        let step = backoff.on_failure(false, INTERVAL);
        assert_eq!(step, NextAttempt::Cooldown(15_000));
        assert_eq!(backoff.consecutive_errors(), 4);
        assert_eq!(backoff.retry_count(), 0);

        // Halved, so four more failures reach the ceiling again.
        let next: Vec<bool> = (0..4)
            .map(|_| backoff.on_failure(false, INTERVAL).is_cooldown())
            .collect();
        assert_eq!(next, vec![false, false, false, true]);
    }

    #[test]
    fn cooldown_is_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.cooldown(Duration::from_secs(20)), Duration::from_secs(30));
        assert_eq!(policy.cooldown(Duration::from_secs(1)), Duration::from_secs(3));
    }

    #[test]
    fn auth_failures_wait_interval_but_count() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        assert_eq!(backoff.on_failure(true, INTERVAL), NextAttempt::Interval);
        assert_eq!(backoff.retry_count(), 0);
        assert_eq!(backoff.consecutive_errors(), 1);
    }

    #[test]
    fn success_clears_both_counters() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        backoff.on_failure(false, INTERVAL);
        backoff.on_failure(false, INTERVAL);
        backoff.on_success();
        assert_eq!(backoff.retry_count(), 0);
        assert_eq!(backoff.consecutive_errors(), 0);
        assert_eq!(backoff.on_failure(false, INTERVAL), NextAttempt::Retry(2000));
    }
}
