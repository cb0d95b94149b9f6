//! Cache handle.
//!
//! [`CacheRepo`] mirrors the subset of Redis commands the dashboard uses.
//! [`MemoryCache`] implements it in process for single-node runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::StdContext;
use crate::depends::DependError;

#[async_trait]
pub trait CacheRepo: Send + Sync {
    /// Store `value`. A zero `ttl` means no expiry.
    async fn set(&self, ctx: &StdContext, key: &str, value: &str, ttl: Duration) -> Result<(), DependError>;

    async fn get(&self, ctx: &StdContext, key: &str) -> Result<String, DependError>;

    /// Remaining lifetime; `None` when the key never expires.
    async fn ttl(&self, ctx: &StdContext, key: &str) -> Result<Option<Duration>, DependError>;

    /// Returns whether the key existed.
    async fn expire(&self, ctx: &StdContext, key: &str, ttl: Duration) -> Result<bool, DependError>;

    /// Returns whether the key existed.
    async fn expire_at(&self, ctx: &StdContext, key: &str, at: SystemTime) -> Result<bool, DependError>;

    /// Returns whether the key existed.
    async fn del(&self, ctx: &StdContext, key: &str) -> Result<bool, DependError>;

    /// True when every key exists.
    async fn exists(&self, ctx: &StdContext, keys: &[&str]) -> Result<bool, DependError>;

    /// Increment an integer value, creating it at 0 first.
    async fn incr(&self, ctx: &StdContext, key: &str) -> Result<i64, DependError>;

    async fn ping(&self, ctx: &StdContext) -> Result<(), DependError>;

    async fn close(&self) -> Result<(), DependError>;

    fn version(&self) -> String;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`CacheRepo`] backed by a [`DashMap`]. Expired keys are
/// evicted lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, ctx: &StdContext) -> Result<(), DependError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DependError::Closed("redis"));
        }
        if ctx.is_cancelled() {
            return Err(crate::core::Cancelled.into());
        }
        Ok(())
    }

    fn evict_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Instant::now().checked_add(ttl)
    }
}

#[async_trait]
impl CacheRepo for MemoryCache {
    async fn set(&self, ctx: &StdContext, key: &str, value: &str, ttl: Duration) -> Result<(), DependError> {
        self.check(ctx)?;
        tracing::debug!(parent: &ctx.span(), key, ?ttl, "cache set");
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, ctx: &StdContext, key: &str) -> Result<String, DependError> {
        self.check(ctx)?;
        self.evict_expired(key);
        tracing::debug!(parent: &ctx.span(), key, "cache get");
        self.entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| DependError::NotFound(key.to_string()))
    }

    async fn ttl(&self, ctx: &StdContext, key: &str) -> Result<Option<Duration>, DependError> {
        self.check(ctx)?;
        self.evict_expired(key);
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| DependError::NotFound(key.to_string()))?;
        Ok(entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn expire(&self, ctx: &StdContext, key: &str, ttl: Duration) -> Result<bool, DependError> {
        self.check(ctx)?;
        self.evict_expired(key);
        if ttl.is_zero() {
            return Ok(self.entries.remove(key).is_some());
        }
        Ok(match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = deadline(ttl);
                true
            }
            None => false,
        })
    }

    async fn expire_at(&self, ctx: &StdContext, key: &str, at: SystemTime) -> Result<bool, DependError> {
        match at.duration_since(SystemTime::now()) {
            Ok(ttl) => self.expire(ctx, key, ttl).await,
            // A deadline in the past deletes the key.
            Err(_) => self.expire(ctx, key, Duration::ZERO).await,
        }
    }

    async fn del(&self, ctx: &StdContext, key: &str) -> Result<bool, DependError> {
        self.check(ctx)?;
        self.evict_expired(key);
        tracing::debug!(parent: &ctx.span(), key, "cache del");
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, ctx: &StdContext, keys: &[&str]) -> Result<bool, DependError> {
        self.check(ctx)?;
        Ok(keys.iter().all(|key| {
            self.evict_expired(key);
            self.entries.contains_key(*key)
        }))
    }

    async fn incr(&self, ctx: &StdContext, key: &str) -> Result<i64, DependError> {
        self.check(ctx)?;
        self.evict_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        let next = entry
            .value
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| DependError::NotInteger(key.to_string()))?;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn ping(&self, ctx: &StdContext) -> Result<(), DependError> {
        self.check(ctx)
    }

    async fn close(&self) -> Result<(), DependError> {
        self.closed.store(true, Ordering::Release);
        self.entries.clear();
        Ok(())
    }

    fn version(&self) -> String {
        format!("memory-cache {}", env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> StdContext {
        StdContext::background()
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = MemoryCache::new();
        cache.set(&ctx(), "job:1", "running", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get(&ctx(), "job:1").await.unwrap(), "running");
        assert_eq!(cache.ttl(&ctx(), "job:1").await.unwrap(), None);

        assert!(cache.del(&ctx(), "job:1").await.unwrap());
        assert!(!cache.del(&ctx(), "job:1").await.unwrap());
        assert!(matches!(cache.get(&ctx(), "job:1").await, Err(DependError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_keys_expire() {
        let cache = MemoryCache::new();
        cache.set(&ctx(), "short", "v", Duration::from_millis(20)).await.unwrap();
        cache.set(&ctx(), "long", "v", Duration::from_secs(60)).await.unwrap();

        let ttl = cache.ttl(&ctx(), "long").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(50));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.exists(&ctx(), &["short", "long"]).await.unwrap());
        assert!(cache.exists(&ctx(), &["long"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_and_expire_at() {
        let cache = MemoryCache::new();
        assert!(!cache.expire(&ctx(), "missing", Duration::from_secs(1)).await.unwrap());

        cache.set(&ctx(), "k", "v", Duration::ZERO).await.unwrap();
        assert!(cache.expire(&ctx(), "k", Duration::from_secs(30)).await.unwrap());
        assert!(cache.ttl(&ctx(), "k").await.unwrap().is_some());

        let past = SystemTime::now() - Duration::from_secs(5);
        assert!(cache.expire_at(&ctx(), "k", past).await.unwrap());
        assert!(!cache.exists(&ctx(), &["k"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr(&ctx(), "hits").await.unwrap(), 1);
        assert_eq!(cache.incr(&ctx(), "hits").await.unwrap(), 2);

        cache.set(&ctx(), "name", "backup", Duration::ZERO).await.unwrap();
        assert!(matches!(cache.incr(&ctx(), "name").await, Err(DependError::NotInteger(_))));
    }

    #[tokio::test]
    async fn test_cancelled_context_and_close() {
        let cache = MemoryCache::new();
        let token = CancellationToken::new();
        let cancelled = StdContext::new(token.clone(), None, None);
        token.cancel();
        assert!(matches!(
            cache.set(&cancelled, "k", "v", Duration::ZERO).await,
            Err(DependError::Cancelled(_))
        ));

        cache.close().await.unwrap();
        assert!(matches!(cache.ping(&ctx()).await, Err(DependError::Closed("redis"))));
    }
}
