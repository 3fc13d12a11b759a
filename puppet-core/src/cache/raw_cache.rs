// ABOUTME: Raw payload cache facade owning the contact, room, and message stores for one account.
// ABOUTME: Scopes on-disk state by namespace and enforces the stopped -> started -> stopped lifecycle.

use super::kv_store::KvStore;
use super::message_cache::{MessageCache, DEFAULT_MESSAGE_CAPACITY, DEFAULT_MESSAGE_TTL};
use crate::error::{PuppetError, Result};
use crate::{metrics, paths};
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const CONTACT_STORE_DIR: &str = "contact-raw-payload";
pub const ROOM_STORE_DIR: &str = "room-raw-payload";

/// Version tag of the on-disk store format: `kv-store-v<major>.<minor>`.
///
/// Patch releases keep the format, so only major and minor take part.
pub fn store_version_tag() -> String {
    format!("kv-store-v{}", major_minor(env!("CARGO_PKG_VERSION")))
}

fn major_minor(version: &str) -> &str {
    let mut dots = version.match_indices('.');
    match (dots.next(), dots.next()) {
        (Some(_), Some((second, _))) => &version[..second],
        _ => version,
    }
}

/// Identifies one cache's on-disk footprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheNamespace {
    pub adapter_instance_id: String,
    pub account_id: String,
    pub store_version: String,
}

impl CacheNamespace {
    /// Namespace with the current store version tag
    pub fn new(
        adapter_instance_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self> {
        Self::with_version(adapter_instance_id, account_id, store_version_tag())
    }

    pub fn with_version(
        adapter_instance_id: impl Into<String>,
        account_id: impl Into<String>,
        store_version: impl Into<String>,
    ) -> Result<Self> {
        let namespace = Self {
            adapter_instance_id: adapter_instance_id.into(),
            account_id: account_id.into(),
            store_version: store_version.into(),
        };
        for segment in namespace.segments() {
            validate_segment(segment)?;
        }
        Ok(namespace)
    }

    fn segments(&self) -> [&str; 3] {
        [
            &self.adapter_instance_id,
            &self.account_id,
            &self.store_version,
        ]
    }

    /// `<root>/<adapterInstanceId>/<accountId>/<storeVersion>`
    pub fn dir(&self, root: &Path) -> PathBuf {
        self.segments()
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

/// Each namespace segment becomes one directory level, so it must stay one
fn validate_segment(segment: &str) -> Result<()> {
    if segment.trim().is_empty() {
        return Err(PuppetError::InvalidNamespace(
            "segment must not be empty".to_string(),
        ));
    }
    if segment == "." || segment == ".." || segment.contains(['/', '\\', '\0']) {
        tracing::error!(segment = %segment, "Rejected cache namespace segment");
        return Err(PuppetError::InvalidNamespace(format!(
            "segment {:?} is not a single path component",
            segment
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory under which namespaces are laid out
    pub root: PathBuf,
    pub message_capacity: NonZeroUsize,
    pub message_ttl: Duration,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: paths::cache_root(),
            message_capacity: NonZeroUsize::new(DEFAULT_MESSAGE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            message_ttl: DEFAULT_MESSAGE_TTL,
        }
    }
}

/// The three stores owned by a started cache
pub struct Stores<C, R, M> {
    pub contacts: KvStore<C>,
    pub rooms: KvStore<R>,
    pub messages: MessageCache<M>,
}

enum CacheState<C, R, M> {
    Idle,
    Starting,
    Started(Arc<Stores<C, R, M>>),
    Stopping,
    Stopped,
}

/// Cache of raw provider payloads for one (adapter instance, account) pair.
///
/// Contacts and rooms persist on disk across restarts; messages live in a bounded
/// in-memory cache. An instance starts at most once: after `stop()` a new
/// instance must be constructed.
pub struct RawCache<C, R, M> {
    namespace: CacheNamespace,
    config: CacheConfig,
    state: Mutex<CacheState<C, R, M>>,
}

impl<C, R, M> RawCache<C, R, M>
where
    C: Serialize + DeserializeOwned,
    R: Serialize + DeserializeOwned,
    M: Clone,
{
    pub fn new(namespace: CacheNamespace, config: CacheConfig) -> Self {
        tracing::debug!(
            adapter = %namespace.adapter_instance_id,
            account = %namespace.account_id,
            "Constructing raw cache"
        );
        Self {
            namespace,
            config,
            state: Mutex::new(CacheState::Idle),
        }
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    /// Directory holding the durable stores of this namespace
    pub fn dir(&self) -> PathBuf {
        self.namespace.dir(&self.config.root)
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.lock(), CacheState::Started(_))
    }

    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.lock();
            match *state {
                CacheState::Idle => *state = CacheState::Starting,
                CacheState::Starting | CacheState::Started(_) => {
                    return Err(PuppetError::AlreadyStarted)
                }
                CacheState::Stopping | CacheState::Stopped => return Err(PuppetError::Terminated),
            }
        }

        match self.open_stores() {
            Ok(stores) => {
                *self.lock() = CacheState::Started(Arc::new(stores));
                tracing::info!(dir = %self.dir().display(), "Raw cache started");
                Ok(())
            }
            Err(e) => {
                *self.lock() = CacheState::Stopped;
                tracing::error!(
                    error = %e,
                    dir = %self.dir().display(),
                    "Raw cache failed to start"
                );
                Err(e)
            }
        }
    }

    fn open_stores(&self) -> Result<Stores<C, R, M>> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;

        let contacts = KvStore::open(dir.join(CONTACT_STORE_DIR))?;
        let rooms = match KvStore::open(dir.join(ROOM_STORE_DIR)) {
            Ok(rooms) => rooms,
            Err(e) => {
                if let Err(close_err) = contacts.close() {
                    tracing::warn!(
                        error = %close_err,
                        "Failed to close contact store after open failure"
                    );
                }
                return Err(e);
            }
        };
        let messages = MessageCache::new(self.config.message_capacity, self.config.message_ttl);

        Ok(Stores {
            contacts,
            rooms,
            messages,
        })
    }

    /// Close both durable stores and drop the message cache.
    ///
    /// Both stores are closed even if the first close fails; the first error is returned.
    pub fn stop(&self) -> Result<()> {
        let stores = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, CacheState::Stopping) {
                CacheState::Started(stores) => stores,
                previous @ (CacheState::Idle | CacheState::Starting) => {
                    *state = previous;
                    return Err(PuppetError::NotStarted);
                }
                previous @ (CacheState::Stopping | CacheState::Stopped) => {
                    *state = previous;
                    return Err(PuppetError::Terminated);
                }
            }
        };

        let contacts = stores.contacts.close();
        let rooms = stores.rooms.close();
        drop(stores);

        *self.lock() = CacheState::Stopped;
        tracing::info!(dir = %self.dir().display(), "Raw cache stopped");

        contacts.and(rooms)
    }

    /// The open stores; fails unless the cache is started
    pub fn stores(&self) -> Result<Arc<Stores<C, R, M>>> {
        match &*self.lock() {
            CacheState::Started(stores) => Ok(Arc::clone(stores)),
            CacheState::Idle | CacheState::Starting => Err(PuppetError::NotStarted),
            CacheState::Stopping | CacheState::Stopped => Err(PuppetError::Terminated),
        }
    }

    pub fn contact(&self, id: &str) -> Result<Option<C>> {
        let found = self.stores()?.contacts.get(id)?;
        metrics::record_cache_lookup("contact", found.is_some());
        Ok(found)
    }

    pub fn set_contact(&self, id: &str, payload: &C) -> Result<()> {
        self.stores()?.contacts.set(id, payload)
    }

    pub fn has_contact(&self, id: &str) -> Result<bool> {
        self.stores()?.contacts.has(id)
    }

    pub fn contact_ids(&self) -> Result<Vec<String>> {
        self.stores()?.contacts.keys()
    }

    pub fn room(&self, id: &str) -> Result<Option<R>> {
        let found = self.stores()?.rooms.get(id)?;
        metrics::record_cache_lookup("room", found.is_some());
        Ok(found)
    }

    pub fn set_room(&self, id: &str, payload: &R) -> Result<()> {
        self.stores()?.rooms.set(id, payload)
    }

    pub fn room_ids(&self) -> Result<Vec<String>> {
        self.stores()?.rooms.keys()
    }

    pub fn message(&self, id: &str) -> Result<Option<M>> {
        let found = self.stores()?.messages.get(id);
        metrics::record_cache_lookup("message", found.is_some());
        Ok(found)
    }

    pub fn set_message(&self, id: &str, payload: M) -> Result<()> {
        self.stores()?.messages.set(id, payload);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<C, R, M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
