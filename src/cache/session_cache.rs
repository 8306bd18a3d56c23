//! # Expiring Resource Cache
//!
//! Time-bounded cache of expensive external contexts (login sessions, tokens)
//! keyed by endpoint identity.
//!
//! ## Guarantees
//!
//! - **Single flight**: concurrent `get_or_create` calls for the same key share
//!   one in-flight load; the loader runs at most once per key at a time. A
//!   failed load leaves the slot empty so the next caller retries.
//! - **Bounded lifetime**: an entry is unreachable once `write time + ttl` has
//!   passed, or earlier when the loader reports a shorter lifetime for the
//!   value it produced (e.g. a token that expires before the cache TTL).
//! - **Proactive sweep**: `sweep` drops every entry whose remaining lifetime is
//!   below the safety margin, even if nobody asked for it. Slots still loading
//!   are never swept.
//! - **Explicit invalidation**: consumers invalidate a key when the external
//!   system rejects a cached session.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

type Slot<V> = Arc<OnceCell<CacheEntry<V>>>;

#[derive(Debug)]
pub struct ExpiringResourceCache<K, V>
where
    K: Eq + Hash,
{
    name: String,
    entries: DashMap<K, Slot<V>>,
    ttl: Duration,
    sweep_margin: Duration,
}

impl<K, V> ExpiringResourceCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: impl Into<String>, ttl: Duration, sweep_margin: Duration) -> Self {
        let name = name.into();
        info!(
            cache = %name,
            ttl_seconds = ttl.as_secs(),
            sweep_margin_seconds = sweep_margin.as_secs(),
            "🗄️ Expiring resource cache initialized"
        );
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            sweep_margin,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sweep_margin(&self) -> Duration {
        self.sweep_margin
    }

    /// Return the live value for `key`, loading it when absent or expired
    pub async fn get_or_create<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ttl = self.ttl;
        self.get_or_create_bounded(key, move || async move {
            loader().await.map(|value| (value, ttl))
        })
        .await
    }

    /// Like `get_or_create`, but the loader also returns how long its value
    /// stays valid; the entry expires at whichever comes first of that
    /// lifetime and the cache TTL
    pub async fn get_or_create_bounded<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(V, Duration), E>>,
    {
        let slot = self.live_slot(&key);
        let ttl = self.ttl;
        let entry = slot
            .get_or_try_init(|| async move {
                debug!(cache = %self.name, key = ?key, "Loading cache entry");
                let (value, lifetime) = loader().await?;
                if lifetime < ttl {
                    debug!(
                        cache = %self.name,
                        key = ?key,
                        lifetime_seconds = lifetime.as_secs(),
                        "Cache entry expires before TTL"
                    );
                }
                Ok::<_, E>(CacheEntry {
                    value,
                    expires_at: Instant::now() + lifetime.min(ttl),
                })
            })
            .await?;
        Ok(entry.value.clone())
    }

    /// Cached value, if present and not expired
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.entries.get(key).map(|slot| Arc::clone(slot.value()))?;
        slot.get()
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Drop the entry so the next `get_or_create` reloads it
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!(cache = %self.name, key = ?key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove entries expired or expiring within the sweep margin; returns how many
    pub fn sweep(&self) -> usize {
        let horizon = Instant::now() + self.sweep_margin;
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot.get() {
            // still loading
            None => true,
            Some(entry) => entry.expires_at > horizon,
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(cache = %self.name, removed, "Swept expiring cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot for `key` that is either still empty/loading or holds a fresh entry
    fn live_slot(&self, key: &K) -> Slot<V> {
        loop {
            let slot = Arc::clone(
                self.entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .value(),
            );
            match slot.get() {
                Some(entry) if entry.expires_at <= Instant::now() => {
                    // only drop the slot we saw; a concurrent reload may already have replaced it
                    self.entries
                        .remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                }
                _ => return slot,
            }
        }
    }
}
