// ABOUTME: Bounded, time-expiring in-memory cache for recently seen message payloads.
// ABOUTME: Evicts the least recently used entry past capacity and drops entries older than the TTL.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default maximum number of cached messages
pub const DEFAULT_MESSAGE_CAPACITY: usize = 1000;

/// Default time-to-live of a cached message, measured from its last write
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry<V> {
    value: V,
    written_at: Instant,
}

/// LRU + TTL cache keyed by message id.
///
/// Memory only: a restart empties it. Reads count as a use for recency, but only
/// writes reset the expiry timer.
pub struct MessageCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> MessageCache<V> {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Insert or overwrite. At capacity, the least recently used entry goes first.
    pub fn set(&self, id: impl Into<String>, value: V) {
        let id = id.into();
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(
            id.clone(),
            Entry {
                value,
                written_at: Instant::now(),
            },
        ) {
            if evicted != id {
                tracing::trace!(message_id = %evicted, "Evicted least recently used message");
            }
        }
    }

    /// Returns the payload when present and not expired
    pub fn get(&self, id: &str) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(id) {
            Some(entry) if entry.written_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(id);
            tracing::debug!(message_id = %id, "Dropped expired message from cache");
        }
        None
    }

    /// Presence check that neither touches recency nor returns expired entries
    pub fn contains(&self, id: &str) -> bool {
        self.lock()
            .peek(id)
            .is_some_and(|entry| entry.written_at.elapsed() < self.ttl)
    }

    /// Number of stored entries, expired ones included until they are touched
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
