use crate::config::KeyPoolConfig;
use crate::error::CoreError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Health state of a single key:
/// HEALTHY -> (N consecutive failures) -> UNHEALTHY -> (cooldown elapsed)
/// -> PROBING -> (success) -> HEALTHY | (failure) -> UNHEALTHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Healthy,
    Unhealthy,
    Probing,
}

struct KeyEntry {
    id: String,
    credential: String,
    rpm: u32,
    tokens: f64,
    last_refill: Instant,
    state: KeyState,
    consecutive_failures: u32,
    unhealthy_since: Option<Instant>,
    requests_this_minute: u32,
    minute_window_start: Instant,
    daily_requests: u64,
    last_success: Option<chrono::DateTime<chrono::Utc>>,
    last_failure: Option<chrono::DateTime<chrono::Utc>>,
}

impl KeyEntry {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let per_second = self.rpm as f64 / 60.0;
        self.tokens = (self.tokens + elapsed * per_second).min(self.rpm as f64);
        self.last_refill = now;

        if now.duration_since(self.minute_window_start) >= Duration::from_secs(60) {
            self.requests_this_minute = 0;
            self.minute_window_start = now;
        }
    }

    /// Whether this key can currently be leased: healthy or probing (a
    /// probe consumes the single trial slot), with at least one token.
    fn is_available(&self, now: Instant, cooldown: Duration) -> bool {
        match self.state {
            KeyState::Healthy => self.tokens >= 1.0,
            KeyState::Unhealthy => {
                if let Some(since) = self.unhealthy_since {
                    now.duration_since(since) >= cooldown
                } else {
                    false
                }
            }
            KeyState::Probing => false,
        }
    }
}

/// A leased key handle. Dropping it without calling [`Lease::credential`]
/// is fine — leases don't hold a semaphore permit, only a token debit that
/// already happened at acquire time.
pub struct Lease {
    pub key_id: String,
    pub credential: String,
}

/// Rate-limited, health-aware pool of provider API keys. Goes beyond a
/// pure concurrency cap (`Arc<Semaphore>`) with genuine per-key RPM token
/// buckets, since rate limiting needs to be proportional to each key's
/// configured requests-per-minute, not just a concurrency ceiling.
pub struct KeyPool {
    keys: Vec<Mutex<KeyEntry>>,
    notify: Notify,
    cooldown: Duration,
    failure_threshold: u32,
    default_acquire_timeout: Duration,
}

impl KeyPool {
    pub fn new(config: &KeyPoolConfig) -> Self {
        let now = Instant::now();
        let keys = config
            .keys
            .iter()
            .map(|k| {
                Mutex::new(KeyEntry {
                    id: k.id.clone(),
                    credential: k.credential.clone(),
                    rpm: k.rpm,
                    tokens: k.rpm as f64,
                    last_refill: now,
                    state: KeyState::Healthy,
                    consecutive_failures: 0,
                    unhealthy_since: None,
                    requests_this_minute: 0,
                    minute_window_start: now,
                    daily_requests: 0,
                    last_success: None,
                    last_failure: None,
                })
            })
            .collect();

        Self {
            keys,
            notify: Notify::new(),
            cooldown: Duration::from_secs(config.cooldown_seconds),
            failure_threshold: config.consecutive_failure_threshold,
            default_acquire_timeout: Duration::from_secs(config.acquire_timeout_seconds),
        }
    }

    /// The pool-wide default `acquire` timeout from config, for callers
    /// that have no more specific deadline of their own.
    pub fn default_timeout(&self) -> Duration {
        self.default_acquire_timeout
    }

    /// Blocks (FIFO, via `Notify`) until a key has capacity, then debits one
    /// token and returns a lease. A key transitioning UNHEALTHY -> PROBING
    /// is granted at most one in-flight lease at a time. Gives up once
    /// `timeout` has elapsed with no key ever becoming available, returning
    /// `AllKeysUnhealthy` if every key is currently in cooldown or
    /// `NoKeyAvailable` otherwise.
    pub async fn acquire(&self, timeout: Duration) -> Result<Lease, CoreError> {
        let deadline = Instant::now() + timeout;
        const POLL_INTERVAL: Duration = Duration::from_millis(250);

        loop {
            if let Some(lease) = self.try_acquire_once().await {
                return Ok(lease);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timeout_error().await);
            }

            let wait = (deadline - now).min(POLL_INTERVAL);
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {},
                _ = tokio::time::sleep(wait) => {},
            }
        }
    }

    /// Distinguishes "every key is in cooldown" from "keys exist but none
    /// currently have token capacity", per spec's `AllKeysUnhealthy` vs
    /// `NoKeyAvailable` split.
    async fn timeout_error(&self) -> CoreError {
        for entry in &self.keys {
            let guard = entry.lock().await;
            if guard.state != KeyState::Unhealthy {
                return CoreError::no_key_available(
                    "no provider key had spare rate-limit capacity before the acquire timeout elapsed",
                );
            }
        }
        CoreError::all_keys_unhealthy(
            "every provider key is in cooldown; none became available before the acquire timeout elapsed",
        )
    }

    async fn try_acquire_once(&self) -> Option<Lease> {
        let now = Instant::now();
        for entry in &self.keys {
            let mut guard = entry.lock().await;
            guard.refill(now);

            if guard.state == KeyState::Unhealthy
                && guard.is_available(now, self.cooldown)
            {
                guard.state = KeyState::Probing;
                guard.requests_this_minute += 1;
                guard.daily_requests += 1;
                debug!(key_id = %guard.id, "key entering PROBING state");
                return Some(Lease {
                    key_id: guard.id.clone(),
                    credential: guard.credential.clone(),
                });
            }

            if guard.state == KeyState::Healthy && guard.tokens >= 1.0 {
                guard.tokens -= 1.0;
                guard.requests_this_minute += 1;
                guard.daily_requests += 1;
                return Some(Lease {
                    key_id: guard.id.clone(),
                    credential: guard.credential.clone(),
                });
            }
        }
        None
    }

    pub async fn report_success(&self, key_id: &str) {
        for entry in &self.keys {
            let mut guard = entry.lock().await;
            if guard.id != key_id {
                continue;
            }
            guard.consecutive_failures = 0;
            guard.unhealthy_since = None;
            guard.state = KeyState::Healthy;
            guard.last_success = Some(chrono::Utc::now());
            self.notify.notify_waiters();
            return;
        }
    }

    pub async fn report_failure(&self, key_id: &str, credential_invalid: bool) {
        for entry in &self.keys {
            let mut guard = entry.lock().await;
            if guard.id != key_id {
                continue;
            }
            guard.last_failure = Some(chrono::Utc::now());
            if credential_invalid {
                guard.state = KeyState::Unhealthy;
                guard.unhealthy_since = Some(Instant::now());
                warn!(key_id = %guard.id, "key marked UNHEALTHY: invalid credential");
                self.notify.notify_waiters();
                return;
            }

            guard.consecutive_failures += 1;
            if guard.consecutive_failures >= self.failure_threshold
                || guard.state == KeyState::Probing
            {
                guard.state = KeyState::Unhealthy;
                guard.unhealthy_since = Some(Instant::now());
                warn!(key_id = %guard.id, failures = guard.consecutive_failures, "key marked UNHEALTHY");
            }
            self.notify.notify_waiters();
            return;
        }
    }

    pub async fn stats(&self) -> Vec<crate::models::KeyUsageRecord> {
        let mut out = Vec::with_capacity(self.keys.len());
        for entry in &self.keys {
            let guard = entry.lock().await;
            out.push(crate::models::KeyUsageRecord {
                key_id: guard.id.clone(),
                requests_this_minute: guard.requests_this_minute,
                tokens_this_minute: guard.tokens as u64,
                daily_requests: guard.daily_requests,
                last_success: guard.last_success,
                last_failure: guard.last_failure,
                consecutive_failures: guard.consecutive_failures,
            });
        }
        out
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKeyConfig;

    fn pool_with_one_key(rpm: u32) -> KeyPool {
        KeyPool::new(&KeyPoolConfig {
            keys: vec![ProviderKeyConfig {
                id: "k1".into(),
                credential: "secret".into(),
                rpm,
            }],
            cooldown_seconds: 1,
            consecutive_failure_threshold: 2,
        })
    }

    #[tokio::test]
    async fn acquires_when_tokens_available() {
        let pool = pool_with_one_key(60);
        let lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(lease.key_id, "k1");
    }

    #[tokio::test]
    async fn acquire_times_out_when_all_keys_unhealthy() {
        let pool = pool_with_one_key(60);
        pool.report_failure("k1", true).await;
        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CoreError::AllKeysUnhealthy(_)));
    }

    #[tokio::test]
    async fn acquire_times_out_when_no_token_capacity() {
        // rpm=0 means the bucket never refills above zero tokens, so the
        // key stays healthy but never has capacity to lease.
        let pool = pool_with_one_key(0);
        let start = Instant::now();
        let err = pool.acquire(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CoreError::NoKeyAvailable(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn failure_threshold_marks_unhealthy() {
        let pool = pool_with_one_key(60);
        pool.report_failure("k1", false).await;
        pool.report_failure("k1", false).await;
        let stats = pool.stats().await;
        assert_eq!(stats[0].consecutive_failures, 2);
    }

    #[tokio::test]
    async fn credential_invalid_immediately_unhealthy() {
        let pool = pool_with_one_key(60);
        pool.report_failure("k1", true).await;
        let stats = pool.stats().await;
        assert_eq!(stats[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let pool = pool_with_one_key(60);
        pool.report_failure("k1", false).await;
        pool.report_success("k1").await;
        let stats = pool.stats().await;
        assert_eq!(stats[0].consecutive_failures, 0);
    }
}
