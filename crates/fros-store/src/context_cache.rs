use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fros_models::ContextFragment;
use moka::future::Cache;
use moka::Expiry;
use tracing::debug;

/// Cache key: which provider produced the fragment, and about what.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub provider: String,
    pub subject: String,
}

impl FragmentKey {
    pub fn new(provider: &str, subject: &str) -> Self {
        Self {
            provider: provider.to_string(),
            subject: subject.to_string(),
        }
    }
}

/// Each fragment expires after its own TTL, counted from the latest write.
struct FragmentExpiry;

impl Expiry<FragmentKey, Arc<ContextFragment>> for FragmentExpiry {
    fn expire_after_create(
        &self,
        _key: &FragmentKey,
        value: &Arc<ContextFragment>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    fn expire_after_update(
        &self,
        _key: &FragmentKey,
        value: &Arc<ContextFragment>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

/// Short-lived store of context fragments keyed by (provider, subject).
///
/// Backed by moka, so reads and writes on different keys do not contend and
/// writes to the same key are last-write-wins. Expiry is enforced on read;
/// [`ContextCache::sweep`] reclaims memory held by expired entries.
pub struct ContextCache {
    inner: Cache<FragmentKey, Arc<ContextFragment>>,
}

impl ContextCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(FragmentExpiry)
                .build(),
        }
    }

    /// A miss (absent or expired) is a normal outcome, not an error.
    pub async fn get(&self, provider: &str, subject: &str) -> Option<ContextFragment> {
        let key = FragmentKey::new(provider, subject);
        let fragment = self.inner.get(&key).await?;

        // moka's clock and the fragment's wall-clock stamp can disagree by a
        // few ms; the stricter of the two wins.
        if !fragment.is_fresh_at(Utc::now()) {
            self.inner.invalidate(&key).await;
            return None;
        }

        debug!(provider, subject, "Context cache hit");
        Some(fragment.as_ref().clone())
    }

    /// Store a fragment under its own (provider, subject). Zero-TTL fragments are not kept.
    pub async fn put(&self, fragment: ContextFragment) {
        if fragment.ttl_ms == 0 {
            return;
        }
        let key = FragmentKey::new(&fragment.provider, &fragment.subject);
        self.inner.insert(key, Arc::new(fragment)).await;
    }

    pub async fn invalidate(&self, provider: &str, subject: &str) {
        self.inner
            .invalidate(&FragmentKey::new(provider, subject))
            .await;
    }

    /// Evict expired fragments now instead of waiting for moka's housekeeping.
    pub async fn sweep(&self) {
        self.inner.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(provider: &str, subject: &str, ttl: Duration) -> ContextFragment {
        ContextFragment::new(
            provider,
            subject,
            serde_json::json!({"average_amount": 42.0}),
            ttl,
        )
    }

    #[tokio::test]
    async fn put_and_get() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;

        let hit = cache.get("behavior", "acct-1").await.unwrap();
        assert_eq!(hit.value["average_amount"], 42.0);
        assert_eq!(hit.subject, "acct-1");
    }

    #[tokio::test]
    async fn miss_is_none() {
        let cache = ContextCache::new(100);
        assert!(cache.get("behavior", "nobody").await.is_none());
    }

    #[tokio::test]
    async fn keys_are_scoped_by_provider_and_subject() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;

        assert!(cache.get("behavior", "acct-2").await.is_none());
        assert!(cache.get("geolocation", "acct-1").await.is_none());
    }

    #[tokio::test]
    async fn per_entry_ttl_expiration() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("geolocation", "acct-1", Duration::from_millis(50)))
            .await;
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;

        assert!(cache.get("geolocation", "acct-1").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("geolocation", "acct-1").await.is_none());
        assert!(cache.get("behavior", "acct-1").await.is_some());
    }

    #[tokio::test]
    async fn zero_ttl_is_not_cached() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("recent_activity", "acct-1", Duration::ZERO))
            .await;
        assert!(cache.get("recent_activity", "acct-1").await.is_none());
    }

    #[tokio::test]
    async fn last_write_wins() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;

        let mut newer = fragment("behavior", "acct-1", Duration::from_secs(60));
        newer.value = serde_json::json!({"average_amount": 99.0});
        cache.put(newer).await;

        let hit = cache.get("behavior", "acct-1").await.unwrap();
        assert_eq!(hit.value["average_amount"], 99.0);
    }

    #[tokio::test]
    async fn rewrite_resets_ttl() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("behavior", "acct-1", Duration::from_millis(40)))
            .await;
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("behavior", "acct-1").await.is_some());
    }

    #[tokio::test]
    async fn sweep_reclaims_expired_entries() {
        let cache = ContextCache::new(100);
        for i in 0..5 {
            cache
                .put(fragment("behavior", &format!("acct-{i}"), Duration::from_millis(20)))
                .await;
        }
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 5);

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = ContextCache::new(100);
        cache
            .put(fragment("behavior", "acct-1", Duration::from_secs(60)))
            .await;
        cache.invalidate("behavior", "acct-1").await;
        assert!(cache.get("behavior", "acct-1").await.is_none());
    }
}
