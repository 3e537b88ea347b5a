//! Consecutive-failure lockout per identifier.
//!
//! Flow Overview:
//! 1) `check` before verifying a secret; a locked identifier is refused outright.
//! 2) `record_failure` after a bad secret; the Nth consecutive failure starts a cooldown.
//! 3) `record_success` clears the counter.
//!
//! State is per process. A `max_failures` of zero disables the policy.
//! Failure counters below the threshold are forgotten once `cooldown_seconds` pass
//! without a new failure, so identifiers that never log in do not accumulate.
//!
//! `check` and `record_failure` are separate critical sections around the secret
//! verification, so concurrent guesses that all pass `check` may each be verified
//! before the lock lands. The bound is `max_failures` plus the in-flight requests.

use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, Default)]
struct Attempts {
    failures: u32,
    last_failure: i64,
    locked_until: Option<i64>,
}

impl Attempts {
    fn is_stale(&self, now: i64, cooldown_seconds: i64) -> bool {
        match self.locked_until {
            Some(until) => until <= now,
            None => now.saturating_sub(self.last_failure) >= cooldown_seconds,
        }
    }
}

#[derive(Debug)]
pub struct Lockout {
    max_failures: u32,
    cooldown_seconds: i64,
    attempts: Mutex<HashMap<String, Attempts>>,
}

impl Lockout {
    #[must_use]
    pub fn new(max_failures: u32, cooldown_seconds: u64) -> Self {
        Self {
            max_failures,
            cooldown_seconds: i64::try_from(cooldown_seconds).unwrap_or(i64::MAX),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining lock time in seconds, or `None` when attempts are allowed.
    pub async fn check(&self, identifier: &str, now: i64) -> Option<u64> {
        if self.max_failures == 0 {
            return None;
        }
        let mut attempts = self.attempts.lock().await;
        let entry = *attempts.get(identifier)?;
        if entry.is_stale(now, self.cooldown_seconds) {
            // Cooldown over; start counting from scratch.
            attempts.remove(identifier);
            return None;
        }
        entry
            .locked_until
            .and_then(|until| u64::try_from(until.saturating_sub(now)).ok())
    }

    /// Record a failed attempt. Returns the lock duration if this failure triggered one.
    pub async fn record_failure(&self, identifier: &str, now: i64) -> Option<u64> {
        if self.max_failures == 0 {
            return None;
        }
        let mut attempts = self.attempts.lock().await;
        let cooldown_seconds = self.cooldown_seconds;
        attempts.retain(|_, entry| !entry.is_stale(now, cooldown_seconds));
        let entry = attempts.entry(identifier.to_string()).or_default();
        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = now;
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now.saturating_add(self.cooldown_seconds));
            return u64::try_from(self.cooldown_seconds).ok();
        }
        None
    }

    pub async fn record_success(&self, identifier: &str) {
        self.attempts.lock().await.remove(identifier);
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.attempts.lock().await.len()
    }
}
