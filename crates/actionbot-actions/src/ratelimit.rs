//! Multi-scope token-bucket rate limiter.
//!
//! Buckets are keyed by scope (`user:<id>`, `channel:<id>`, `guild:<id>`,
//! `global`) or by an arbitrary key for per-rule limits. Each bucket refills
//! to its maximum once its window has elapsed since the last refill.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use actionbot_core::config::RateLimitsConfig;
use actionbot_core::error::{ActionBotError, Result};
use tokio::sync::oneshot;

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    max_tokens: u32,
    window: Duration,
    last_reset: Instant,
}

impl Bucket {
    fn new(max_tokens: u32, window: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            window,
            last_reset: Instant::now(),
        }
    }

    fn refill(&mut self) {
        if self.last_reset.elapsed() >= self.window {
            self.tokens = self.max_tokens;
            self.last_reset = Instant::now();
        }
    }

    fn take(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn idle(&self, now: Instant) -> bool {
        now.duration_since(self.last_reset) > self.window
    }
}

/// `max` requests per `window`. A zero max means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Limit {
    max: u32,
    window: Duration,
}

#[derive(Debug, Default)]
struct ScopeLimits {
    user: Option<Limit>,
    channel: Option<Limit>,
    guild: Option<Limit>,
    global: Option<Limit>,
}

#[derive(Default)]
struct Inner {
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
    limits: RwLock<ScopeLimits>,
}

impl Inner {
    fn allow_key(&self, key: &str, max_tokens: u32, window: Duration) -> bool {
        if max_tokens == 0 {
            return true;
        }
        let bucket = self.bucket(key, max_tokens, window);
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.take()
    }

    /// Existing bucket for `key`, or a fresh full one.
    fn bucket(&self, key: &str, max_tokens: u32, window: Duration) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return bucket.clone();
        }
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(max_tokens, window))))
            .clone()
    }

    fn remaining(&self, key: &str) -> Option<u32> {
        let bucket = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill();
        Some(bucket.tokens)
    }

    fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            !bucket
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .idle(now)
        });
        before - buckets.len()
    }

    fn limits(&self) -> std::sync::RwLockReadGuard<'_, ScopeLimits> {
        self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn limits_mut(&self) -> std::sync::RwLockWriteGuard<'_, ScopeLimits> {
        self.limits.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn scoped(limit: Option<Limit>, inner: &Inner, key: &str) -> bool {
    match limit {
        Some(limit) => inner.allow_key(key, limit.max, limit.window),
        None => true,
    }
}

/// Token-bucket rate limiter shared by the dispatcher and the engine.
///
/// Cloning is cheap; clones share buckets, limits and the cleanup task.
#[derive(Clone, Default)]
pub struct RateLimiter {
    inner: Arc<Inner>,
    cleanup: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl RateLimiter {
    /// Limiter with no scope limits configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter with the scope limits from a `[rateLimits]` section.
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        let limiter = Self::new();
        if let Some(l) = &config.user {
            limiter.set_user_limit(l.requests, l.window());
        }
        if let Some(l) = &config.channel {
            limiter.set_channel_limit(l.requests, l.window());
        }
        if let Some(l) = &config.guild {
            limiter.set_guild_limit(l.requests, l.window());
        }
        if let Some(l) = &config.global {
            limiter.set_global_limit(l.requests, l.window());
        }
        limiter
    }

    /// Take one token from the bucket under `key`, creating it on first use.
    pub fn allow_key(&self, key: &str, max_tokens: u32, window: Duration) -> bool {
        self.inner.allow_key(key, max_tokens, window)
    }

    pub fn set_user_limit(&self, max: u32, window: Duration) {
        self.inner.limits_mut().user = Some(Limit { max, window });
        tracing::debug!("🚦 User rate limit: {max} per {window:?}");
    }

    pub fn set_channel_limit(&self, max: u32, window: Duration) {
        self.inner.limits_mut().channel = Some(Limit { max, window });
        tracing::debug!("🚦 Channel rate limit: {max} per {window:?}");
    }

    pub fn set_guild_limit(&self, max: u32, window: Duration) {
        self.inner.limits_mut().guild = Some(Limit { max, window });
        tracing::debug!("🚦 Guild rate limit: {max} per {window:?}");
    }

    pub fn set_global_limit(&self, max: u32, window: Duration) {
        self.inner.limits_mut().global = Some(Limit { max, window });
        tracing::debug!("🚦 Global rate limit: {max} per {window:?}");
    }

    pub fn allow_user(&self, user_id: &str) -> bool {
        let limit = self.inner.limits().user;
        scoped(limit, &self.inner, &format!("user:{user_id}"))
    }

    pub fn allow_channel(&self, channel_id: &str) -> bool {
        let limit = self.inner.limits().channel;
        scoped(limit, &self.inner, &format!("channel:{channel_id}"))
    }

    pub fn allow_guild(&self, guild_id: &str) -> bool {
        let limit = self.inner.limits().guild;
        scoped(limit, &self.inner, &format!("guild:{guild_id}"))
    }

    pub fn allow_global(&self) -> bool {
        let limit = self.inner.limits().global;
        scoped(limit, &self.inner, "global")
    }

    /// All scopes must pass, checked user → channel → guild → global.
    /// Stops at the first denial; tokens already taken are not returned.
    pub fn allow(&self, user_id: &str, channel_id: &str, guild_id: &str) -> bool {
        if !self.allow_user(user_id) {
            tracing::warn!("🚫 User rate limit exceeded: {user_id}");
            return false;
        }
        if !self.allow_channel(channel_id) {
            tracing::warn!("🚫 Channel rate limit exceeded: {channel_id}");
            return false;
        }
        if !self.allow_guild(guild_id) {
            tracing::warn!("🚫 Guild rate limit exceeded: {guild_id}");
            return false;
        }
        if !self.allow_global() {
            tracing::warn!("🚫 Global rate limit exceeded");
            return false;
        }
        true
    }

    /// Drop the bucket under `key`.
    pub fn reset_scope(&self, key: &str) {
        self.inner
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        tracing::debug!("Rate limit reset: {key}");
    }

    pub fn reset_user(&self, user_id: &str) {
        self.reset_scope(&format!("user:{user_id}"));
    }

    /// Tokens left under `key`; `None` when no bucket is tracked.
    pub fn remaining(&self, key: &str) -> Option<u32> {
        self.inner.remaining(key)
    }

    /// Tokens left for a user; `None` when users are unlimited.
    pub fn user_remaining(&self, user_id: &str) -> Option<u32> {
        let limit = self.inner.limits().user.filter(|l| l.max > 0)?;
        Some(
            self.inner
                .remaining(&format!("user:{user_id}"))
                .unwrap_or(limit.max),
        )
    }

    /// Number of tracked buckets.
    pub fn bucket_count(&self) -> usize {
        self.inner
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove buckets idle past their window. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.inner.cleanup();
        if removed > 0 {
            tracing::debug!("🧹 Rate limit cleanup removed {removed} buckets");
        }
        removed
    }

    /// Spawn the periodic sweep. Must be called inside a tokio runtime.
    pub fn start_cleanup(&self, interval: Duration) -> Result<()> {
        let mut slot = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(ActionBotError::Other(
                "rate limit cleanup already running".into(),
            ));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = inner.cleanup();
                        if removed > 0 {
                            tracing::debug!("🧹 Rate limit cleanup removed {removed} buckets");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });
        *slot = Some(stop_tx);

        tracing::info!("🧹 Rate limit cleanup started (every {interval:?})");
        Ok(())
    }

    /// Stop the periodic sweep. No-op if not running.
    pub fn stop_cleanup(&self) {
        let stop_tx = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
            tracing::info!("🧹 Rate limit cleanup stopped");
        }
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionbot_core::config::ScopeLimitConfig;

    const WINDOW: Duration = Duration::from_millis(100);

    #[test]
    fn test_bucket_exhausts_then_refills() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.allow_key("k", 3, WINDOW));
        }
        assert!(!limiter.allow_key("k", 3, WINDOW));
        assert_eq!(limiter.remaining("k"), Some(0));

        std::thread::sleep(WINDOW + Duration::from_millis(20));
        assert!(limiter.allow_key("k", 3, WINDOW));
        assert_eq!(limiter.remaining("k"), Some(2));
    }

    #[test]
    fn test_concurrent_checks_share_one_count() {
        let limiter = RateLimiter::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.allow_key("k", 25, Duration::from_secs(60)))
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 25);
        assert_eq!(limiter.remaining("k"), Some(0));
    }

    #[test]
    fn test_distinct_keys_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow_key("ping:alice", 1, Duration::from_secs(60)));
        assert!(!limiter.allow_key("ping:alice", 1, Duration::from_secs(60)));
        assert!(limiter.allow_key("ping:bob", 1, Duration::from_secs(60)));
        assert!(limiter.allow_key("pong:alice", 1, Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_max_is_unlimited() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.allow_key("free", 0, WINDOW));
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn test_unconfigured_scopes_allow() {
        let limiter = RateLimiter::new();
        for _ in 0..50 {
            assert!(limiter.allow("u1", "c1", "g1"));
        }
        assert_eq!(limiter.user_remaining("u1"), None);
    }

    #[test]
    fn test_combined_denies_when_any_scope_denies() {
        let limiter = RateLimiter::new();
        limiter.set_user_limit(10, Duration::from_secs(60));
        limiter.set_channel_limit(2, Duration::from_secs(60));

        assert!(limiter.allow("u1", "c1", "g1"));
        assert!(limiter.allow("u2", "c1", "g1"));
        // channel c1 is exhausted even for a fresh user
        assert!(!limiter.allow("u3", "c1", "g1"));
        assert!(limiter.allow("u3", "c2", "g1"));
    }

    #[test]
    fn test_combined_short_circuits_without_refund() {
        let limiter = RateLimiter::new();
        limiter.set_user_limit(5, Duration::from_secs(60));
        limiter.set_global_limit(1, Duration::from_secs(60));

        assert!(limiter.allow("u1", "c1", "g1"));
        assert!(!limiter.allow("u1", "c1", "g1"));
        // the denied call still spent a user token
        assert_eq!(limiter.user_remaining("u1"), Some(3));
    }

    #[test]
    fn test_user_remaining_and_reset() {
        let limiter = RateLimiter::new();
        limiter.set_user_limit(3, Duration::from_secs(60));
        assert_eq!(limiter.user_remaining("u1"), Some(3));

        assert!(limiter.allow_user("u1"));
        assert!(limiter.allow_user("u1"));
        assert_eq!(limiter.user_remaining("u1"), Some(1));

        limiter.reset_user("u1");
        assert_eq!(limiter.user_remaining("u1"), Some(3));
        assert_eq!(limiter.remaining("user:u1"), None);
    }

    #[test]
    fn test_from_config() {
        let config = RateLimitsConfig {
            guild: Some(ScopeLimitConfig {
                requests: 1,
                window: 60,
            }),
            ..Default::default()
        };
        let limiter = RateLimiter::from_config(&config);
        assert!(limiter.allow_guild("g1"));
        assert!(!limiter.allow_guild("g1"));
        assert!(limiter.allow_user("anyone"));
    }

    #[test]
    fn test_cleanup_removes_idle_buckets() {
        let limiter = RateLimiter::new();
        limiter.allow_key("short", 1, Duration::from_millis(10));
        limiter.allow_key("long", 1, Duration::from_secs(60));
        assert_eq!(limiter.bucket_count(), 2);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.remaining("short"), None);
        assert_eq!(limiter.remaining("long"), Some(0));
    }

    #[tokio::test]
    async fn test_cleanup_task_lifecycle() {
        let limiter = RateLimiter::new();
        limiter.start_cleanup(Duration::from_millis(20)).unwrap();
        assert!(limiter.is_cleanup_running());
        assert!(limiter.start_cleanup(Duration::from_millis(20)).is_err());

        limiter.allow_key("short", 1, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(limiter.bucket_count(), 0);

        limiter.stop_cleanup();
        assert!(!limiter.is_cleanup_running());
        limiter.stop_cleanup();
    }
}
