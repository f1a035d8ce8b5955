//! TTL-bounded store of the latest status per server.
//!
//! Entries live in a lock-free `scc::HashMap`. Misses for the same key can be
//! collapsed into one producer call (single-flight), and an optional capacity
//! evicts the least recently used entry.

use scc::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::models::{ServerIdentity, StatusRecord};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of a record before it is re-acquired
    pub ttl: Duration,
    /// Maximum number of entries, `None` for unbounded
    pub capacity: Option<usize>,
    /// Collapse concurrent misses for one key into a single producer call
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            capacity: None,
            single_flight: true,
        }
    }
}

struct CacheEntry {
    record: StatusRecord,
    captured_at: Instant,
    last_used: Instant,
}

type Flight = Arc<OnceCell<StatusRecord>>;

pub struct StatusCache {
    entries: scc::HashMap<ServerIdentity, CacheEntry>,
    in_flight: scc::HashMap<ServerIdentity, Flight>,
    config: CacheConfig,
}

impl StatusCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: scc::HashMap::new(),
            in_flight: scc::HashMap::new(),
            config,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// [`StatusCache::get_with_ttl`] with the configured TTL.
    pub async fn get<F, Fut>(&self, key: &ServerIdentity, producer: F) -> StatusRecord
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StatusRecord>,
    {
        self.get_with_ttl(key, self.config.ttl, producer).await
    }

    /// Return the cached record for `key` if it is younger than `ttl`,
    /// otherwise run `producer`, store its record and return it.
    ///
    /// A hit never calls `producer`. A miss calls it at most once per caller;
    /// with single-flight enabled, concurrent misses share one call.
    pub async fn get_with_ttl<F, Fut>(
        &self,
        key: &ServerIdentity,
        ttl: Duration,
        producer: F,
    ) -> StatusRecord
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StatusRecord>,
    {
        if let Some(record) = self.fresh(key, ttl).await {
            trace!(server = %key, "cache hit");
            return record;
        }

        if !self.config.single_flight {
            return self.produce(key, producer).await;
        }

        let flight = match self.in_flight.entry_async(key.clone()).await {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                let flight = Flight::default();
                vacant.insert_entry(flight.clone());
                flight
            }
        };

        // If the caller that started the flight is dropped mid-way, the next
        // waiter runs its own producer.
        let this = self;
        let record = flight
            .get_or_init(|| async move {
                match this.fresh(key, ttl).await {
                    Some(record) => record,
                    None => this.produce(key, producer).await,
                }
            })
            .await
            .clone();

        if let Entry::Occupied(occupied) = self.in_flight.entry_async(key.clone()).await {
            if Arc::ptr_eq(occupied.get(), &flight) {
                occupied.remove();
            }
        }

        record
    }

    /// Latest record for `key` regardless of age.
    pub async fn peek(&self, key: &ServerIdentity) -> Option<StatusRecord> {
        self.entries
            .read_async(key, |_, entry| entry.record.clone())
            .await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn fresh(&self, key: &ServerIdentity, ttl: Duration) -> Option<StatusRecord> {
        let now = Instant::now();
        self.entries
            .update_async(key, |_, entry| {
                if now.duration_since(entry.captured_at) < ttl {
                    entry.last_used = now;
                    Some(entry.record.clone())
                } else {
                    None
                }
            })
            .await
            .flatten()
    }

    async fn produce<F, Fut>(&self, key: &ServerIdentity, producer: F) -> StatusRecord
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StatusRecord>,
    {
        trace!(server = %key, "cache miss");
        let record = producer().await;
        self.store(key, record.clone()).await;
        record
    }

    /// Overwrite the entry for `key`; newer always wins, success or failure.
    async fn store(&self, key: &ServerIdentity, record: StatusRecord) {
        let now = Instant::now();
        let entry = CacheEntry {
            record,
            captured_at: now,
            last_used: now,
        };
        match self.entries.entry_async(key.clone()).await {
            Entry::Occupied(mut occupied) => *occupied.get_mut() = entry,
            Entry::Vacant(vacant) => {
                vacant.insert_entry(entry);
            }
        }
        self.evict_overflow().await;
    }

    async fn evict_overflow(&self) {
        let Some(capacity) = self.config.capacity else {
            return;
        };

        while self.entries.len() > capacity {
            let mut oldest: Option<(ServerIdentity, Instant)> = None;
            self.entries
                .retain_async(|key, entry| {
                    if oldest.as_ref().is_none_or(|(_, at)| entry.last_used < *at) {
                        oldest = Some((key.clone(), entry.last_used));
                    }
                    true
                })
                .await;

            let Some((victim, _)) = oldest else {
                break;
            };
            let _ = self.entries.remove_async(&victim).await;
            debug!(server = %victim, capacity, "evicted least recently used status");
        }
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
