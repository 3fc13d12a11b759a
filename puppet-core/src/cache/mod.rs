// ABOUTME: Raw payload caching: bounded message cache, durable key-value stores, and the facade.
// ABOUTME: The facade is what adapters hold; the stores are exposed for direct testing and reuse.

pub mod kv_store;
pub mod message_cache;
pub mod raw_cache;

pub use kv_store::KvStore;
pub use message_cache::{MessageCache, DEFAULT_MESSAGE_CAPACITY, DEFAULT_MESSAGE_TTL};
pub use raw_cache::{
    store_version_tag, CacheConfig, CacheNamespace, RawCache, Stores, CONTACT_STORE_DIR,
    ROOM_STORE_DIR,
};
