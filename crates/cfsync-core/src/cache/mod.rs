// # TTL Cache
//
// In-memory, per-kind caches sitting in front of the remote API.
//
// ## Consistency rules
//
// - An entry that is present and unexpired may replace a live call
// - Expiry is checked lazily on read; expired entries are swept on write
// - After a mutation known to have succeeded, the owner either patches the
//   entry in place ([`TtlCache::update`]) or drops it ([`TtlCache::invalidate`])
// - After a mutation with an unknown outcome the entry is always dropped
//
// Patching never extends an entry's lifetime: the expiry set when the value
// was last fetched live still applies.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::domain::Domain;
use crate::ip::IpFamily;
use crate::traits::{DnsRecord, WafList, WafListItem, Zone};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A keyed map whose entries expire a fixed time after insertion
///
/// Internally synchronized; all locks are released before the returned
/// future completes, so no lock is ever held across a remote call.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a copy of the value for `key` if present and unexpired
    pub async fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().await;
        guard
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace the value for `key`, sweeping expired entries
    pub async fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.expires_at > now);
        guard.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Patch the value for `key` in place
    ///
    /// Returns `false` (and does nothing) when there is no unexpired entry.
    pub async fn update<F>(&self, key: &K, patch: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.expires_at > now);
        match guard.get_mut(key) {
            Some(entry) => {
                patch(&mut entry.value);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `key`
    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop every entry
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included until the next sweep
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Key of a cached record listing: zone ID, domain and family
pub type RecordsKey = (String, Domain, IpFamily);

/// All caches used by a [`Handle`](crate::handle::Handle), one per resource kind
#[derive(Debug)]
pub struct Caches {
    /// Zone name → zones with that name (any status)
    pub zones_by_name: TtlCache<String, Vec<Zone>>,

    /// Domain → ID of the zone owning it
    pub zone_of_domain: TtlCache<Domain, String>,

    /// (zone ID, domain, family) → records in provider order
    pub records: TtlCache<RecordsKey, Vec<DnsRecord>>,

    /// Account ID → IP lists of that account, by name
    pub lists: TtlCache<String, HashMap<String, WafList>>,

    /// List ID → items of that list
    pub list_items: TtlCache<String, Vec<WafListItem>>,
}

impl Caches {
    /// Create empty caches with the configured lifetime
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = config.ttl();
        Self {
            zones_by_name: TtlCache::new(ttl),
            zone_of_domain: TtlCache::new(ttl),
            records: TtlCache::new(ttl),
            lists: TtlCache::new(ttl),
            list_items: TtlCache::new(ttl),
        }
    }

    /// Drop every entry of every kind
    pub async fn flush(&self) {
        self.zones_by_name.invalidate_all().await;
        self.zone_of_domain.invalidate_all().await;
        self.records.invalidate_all().await;
        self.lists.invalidate_all().await;
        self.list_items.invalidate_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_set() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()).await, None);

        cache.set("a".to_string(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        cache.set("a".to_string(), 2).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_lazily() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", 1).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&"a").await, Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"a").await, None);

        // Still stored until a write sweeps it
        assert_eq!(cache.len().await, 1);
        cache.set("b", 2).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_does_not_extend_lifetime() {
        let cache: TtlCache<&'static str, Vec<u32>> = TtlCache::new(Duration::from_secs(10));
        cache.set("a", vec![1]).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.update(&"a", |v| v.push(2)).await);
        assert_eq!(cache.get(&"a").await, Some(vec![1, 2]));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&"a").await, None);
        assert!(!cache.update(&"a", |v| v.push(3)).await);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache: TtlCache<u8, u8> = TtlCache::new(Duration::from_secs(60));
        cache.set(1, 1).await;
        cache.set(2, 2).await;

        cache.invalidate(&1).await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.get(&2).await, Some(2));

        cache.invalidate_all().await;
        assert!(cache.is_empty().await);
    }
}
