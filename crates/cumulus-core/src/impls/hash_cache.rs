//! HashCache - 容量と TTL 付きの値キャッシュ
//!
//! SKU の guest 数や instance spec 集計のメモ化に使います。
//! グローバルには持たず、使う側（ServerSkuManager）に注入します。
//!
//! 容量を超えたら最も長く使われていないエントリから捨て（LRU）、
//! 期限切れのエントリは `get` で見つけた時点で捨てます。

use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: Value,
    expires_at: Instant,
}

pub struct HashCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
}

impl HashCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// 型付きで取り出す（デコードできなければ None）
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.lock().await.put(key.into(), entry);
    }

    pub async fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value).await,
            Err(err) => tracing::warn!(error = %err, "skip caching unserializable value"),
        }
    }

    pub async fn remove(&self, key: &str) {
        self.entries.lock().await.pop(key);
    }

    pub async fn remove_prefix(&self, prefix: &str) {
        let mut entries = self.entries.lock().await;
        let keys: Vec<String> = entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            entries.pop(&key);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get() {
        let cache = HashCache::new(8, Duration::from_secs(300));
        cache.set("sku-1.total_guest_count", json!(3)).await;
        assert_eq!(cache.get_as::<usize>("sku-1.total_guest_count").await, Some(3));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = HashCache::new(8, Duration::from_secs(300));
        cache.set("k", json!("v")).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn capacity_evicts_the_least_recently_used_entry() {
        let cache = HashCache::new(2, Duration::from_secs(300));
        cache.set("a", json!(1)).await;
        cache.set("b", json!(2)).await;
        assert!(cache.get("a").await.is_some());
        cache.set("c", json!(3)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn zero_capacity_still_holds_one_entry() {
        let cache = HashCache::new(0, Duration::from_secs(300));
        cache.set("a", json!(1)).await;
        cache.set("b", json!(2)).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get_as::<u32>("b").await, Some(2));
    }

    #[tokio::test]
    async fn remove_prefix_drops_matching_keys() {
        let cache = HashCache::new(8, Duration::from_secs(300));
        cache.set("InstanceSpecs_a", json!({})).await;
        cache.set("InstanceSpecs_b", json!({})).await;
        cache.set("sku-1.total_guest_count", json!(0)).await;

        cache.remove_prefix("InstanceSpecs_").await;
        assert_eq!(cache.len().await, 1);
    }
}
