// ABOUTME: PuppetGitter, the Gitter adapter exposed to the host framework.
// ABOUTME: Owns the provider client, the per-account raw cache, and the event bridge between them.

use crate::bridge::{EventBridge, GitterRawCache};
use crate::config::Config;
use crate::gitter::{
    GitterApi, GitterConnector, GitterRoom, GitterUser, HttpConnector, RoomMessagePayload,
};
use crate::parsers;
use async_trait::async_trait;
use puppet_core::{
    metrics, CacheConfig, CacheNamespace, ContactPayload, EventEmitter, EventStream,
    LifecycleState, MessagePayload, PayloadKind, Puppet, PuppetError, PuppetEvent, RawCache,
    Result, RoomPayload, StateSwitch,
};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

pub const PUPPET_NAME: &str = "PuppetGitter";

const DONG_DELAY: Duration = Duration::from_secs(1);

pub struct PuppetGitter {
    cache_config: CacheConfig,
    connector: Arc<dyn GitterConnector>,
    state: StateSwitch,
    emitter: EventEmitter,
    self_id: RwLock<Option<String>>,
    raw_cache: RwLock<Option<Arc<GitterRawCache>>>,
    api: RwLock<Option<Arc<dyn GitterApi>>>,
    bridge: Mutex<EventBridge>,
}

impl PuppetGitter {
    pub fn new(connector: Arc<dyn GitterConnector>, cache_config: CacheConfig) -> Self {
        Self {
            cache_config,
            connector,
            state: StateSwitch::new(),
            emitter: EventEmitter::new(),
            self_id: RwLock::new(None),
            raw_cache: RwLock::new(None),
            api: RwLock::new(None),
            bridge: Mutex::new(EventBridge::new()),
        }
    }

    /// Puppet talking to the Gitter HTTP API described by `config`
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let cache_config = config.cache.to_cache_config()?;
        let connector = HttpConnector::new(config.gitter.clone());
        Ok(Self::new(Arc::new(connector), cache_config))
    }

    /// The started raw cache; requires login
    fn cache(&self) -> Result<Arc<GitterRawCache>> {
        self.raw_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PuppetError::NotLoggedIn)
    }

    /// The connected provider client; requires start
    fn api(&self) -> Result<Arc<dyn GitterApi>> {
        self.api
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PuppetError::NotStarted)
    }

    fn set_api(&self, api: Option<Arc<dyn GitterApi>>) -> Option<Arc<dyn GitterApi>> {
        let mut slot = self.api.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, api)
    }

    fn set_cache(&self, cache: Option<Arc<GitterRawCache>>) -> Option<Arc<GitterRawCache>> {
        let mut slot = self.raw_cache.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, cache)
    }

    fn set_self_id(&self, id: Option<String>) -> Option<String> {
        let mut slot = self.self_id.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, id)
    }

    async fn try_start(&self) -> Result<()> {
        let api = self.connector.connect().await?;
        self.set_api(Some(Arc::clone(&api)));

        let me: GitterUser = api.current_user().await?;
        tracing::info!(user_id = %me.id, username = %me.username, "Authenticated with Gitter");
        self.login(&me.id).await?;

        let cache = self.cache()?;
        cache.set_contact(&me.id, &me)?;

        self.bridge
            .lock()
            .await
            .attach(api, cache, self.emitter.clone())
            .await?;
        Ok(())
    }

    /// Detach the bridge, disconnect the client, then log out.
    ///
    /// Only a logout failure is returned; everything else is logged.
    async fn teardown(&self) -> Result<()> {
        self.bridge.lock().await.detach().await;

        let api = self.set_api(None);
        if let Some(api) = api {
            if let Err(e) = api.disconnect().await {
                metrics::record_error("provider");
                tracing::warn!(error = %e, "Failed to disconnect Gitter client");
            }
        }

        if self.is_logged_in() {
            self.logout().await?;
        }
        Ok(())
    }

    /// Image URL of an image message, NotFound when the message is not an image
    pub async fn message_image_url(&self, message_id: &str) -> Result<String> {
        let raw = self.message_raw_payload(message_id).await?;
        parsers::image_url(&raw.message.text)
            .map(str::to_string)
            .ok_or_else(|| PuppetError::not_found(PayloadKind::Message, message_id))
    }
}

#[async_trait]
impl Puppet for PuppetGitter {
    type ContactRaw = GitterUser;
    type RoomRaw = GitterRoom;
    type MessageRaw = RoomMessagePayload;

    fn name(&self) -> &'static str {
        PUPPET_NAME
    }

    fn state(&self) -> LifecycleState {
        self.state.current()
    }

    fn self_id(&self) -> Option<String> {
        self.self_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<PuppetEvent> {
        self.emitter.subscribe()
    }

    fn event_stream(&self) -> EventStream {
        self.emitter.stream()
    }

    async fn start(&self) -> Result<()> {
        if self.state.is_on() {
            tracing::warn!("start() on a puppet that is already on, waiting for it to settle");
            self.state.ready().await;
            return Ok(());
        }

        self.state.set(LifecycleState::PendingOn);
        tracing::info!("Starting Gitter puppet");

        match self.try_start().await {
            Ok(()) => {
                self.state.set(LifecycleState::On);
                tracing::info!(self_id = ?self.self_id(), "Gitter puppet started");
                Ok(())
            }
            Err(e) => {
                metrics::record_error(e.kind_label());
                tracing::error!(error = %e, "Gitter puppet failed to start");
                self.emitter.emit(PuppetEvent::Error {
                    data: e.to_string(),
                });
                if let Err(cleanup_err) = self.teardown().await {
                    tracing::warn!(error = %cleanup_err, "Cleanup after failed start also failed");
                }
                self.state.set(LifecycleState::Off);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        if self.state.is_off() {
            tracing::warn!("stop() on a puppet that is already off, waiting for it to settle");
            self.state.ready().await;
            return Ok(());
        }

        self.state.set(LifecycleState::PendingOff);
        tracing::info!("Stopping Gitter puppet");

        let result = self.teardown().await;
        self.state.set(LifecycleState::Off);
        match &result {
            Ok(()) => tracing::info!("Gitter puppet stopped"),
            Err(e) => tracing::error!(error = %e, "Gitter puppet stopped with errors"),
        }
        result
    }

    async fn login(&self, account_id: &str) -> Result<()> {
        tracing::debug!(account_id = %account_id, "Logging in");

        if let Some(current) = self.self_id() {
            tracing::warn!(current = %current, account_id = %account_id, "login() while logged in");
            return Err(PuppetError::AlreadyLoggedIn(current));
        }

        let namespace = CacheNamespace::new(PUPPET_NAME, account_id)?;
        let cache = Arc::new(RawCache::new(namespace, self.cache_config.clone()));
        cache.start()?;

        self.set_cache(Some(cache));
        self.set_self_id(Some(account_id.to_string()));

        tracing::info!(account_id = %account_id, "Logged in");
        self.emitter.emit(PuppetEvent::Login {
            contact_id: account_id.to_string(),
        });
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let contact_id = self.set_self_id(None).ok_or(PuppetError::NotLoggedIn)?;

        tracing::info!(account_id = %contact_id, "Logged out");
        self.emitter.emit(PuppetEvent::Logout {
            contact_id,
            data: "logout".to_string(),
        });

        match self.set_cache(None) {
            Some(cache) => cache.stop(),
            None => Ok(()),
        }
    }

    fn ding(&self, data: Option<String>) {
        let data = data.unwrap_or_default();
        tracing::trace!(data = %data, "ding");
        let emitter = self.emitter.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(DONG_DELAY).await;
                    emitter.emit(PuppetEvent::Dong { data });
                });
            }
            Err(_) => {
                tracing::warn!("ding() outside a Tokio runtime, answering immediately");
                emitter.emit(PuppetEvent::Dong { data });
            }
        }
    }

    // =========================================================================
    // Contact
    // =========================================================================

    async fn contact_raw_payload(&self, contact_id: &str) -> Result<GitterUser> {
        tracing::debug!(contact_id = %contact_id, "contact_raw_payload");
        let cache = self.cache()?;
        if let Some(raw) = cache.contact(contact_id)? {
            return Ok(raw);
        }

        let raw = self
            .api()?
            .find_user(contact_id)
            .await?
            .ok_or_else(|| PuppetError::not_found(PayloadKind::Contact, contact_id))?;
        cache.set_contact(contact_id, &raw)?;
        Ok(raw)
    }

    fn contact_raw_payload_parser(&self, raw: &GitterUser) -> Result<ContactPayload> {
        Ok(parsers::contact_payload(raw))
    }

    async fn contact_list(&self) -> Result<Vec<String>> {
        self.cache()?.contact_ids()
    }

    // =========================================================================
    // Room
    // =========================================================================

    async fn room_raw_payload(&self, room_id: &str) -> Result<GitterRoom> {
        tracing::debug!(room_id = %room_id, "room_raw_payload");
        let cache = self.cache()?;
        if let Some(raw) = cache.room(room_id)? {
            return Ok(raw);
        }

        let raw = self
            .api()?
            .find_room(room_id)
            .await?
            .ok_or_else(|| PuppetError::not_found(PayloadKind::Room, room_id))?;
        cache.set_room(room_id, &raw)?;
        Ok(raw)
    }

    fn room_raw_payload_parser(&self, raw: &GitterRoom) -> Result<RoomPayload> {
        Ok(parsers::room_payload(raw))
    }

    async fn room_list(&self) -> Result<Vec<String>> {
        let rooms = self.api()?.list_rooms().await?;
        Ok(rooms.into_iter().map(|room| room.id).collect())
    }

    // =========================================================================
    // Message
    // =========================================================================

    async fn message_raw_payload(&self, message_id: &str) -> Result<RoomMessagePayload> {
        tracing::debug!(message_id = %message_id, "message_raw_payload");
        self.cache()?
            .message(message_id)?
            .ok_or_else(|| PuppetError::not_found(PayloadKind::Message, message_id))
    }

    fn message_raw_payload_parser(&self, raw: &RoomMessagePayload) -> Result<MessagePayload> {
        Ok(parsers::message_payload(raw))
    }

    async fn message_send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        if !self.is_logged_in() {
            return Err(PuppetError::NotLoggedIn);
        }
        let api = self.api()?;
        let room = api
            .find_room(conversation_id)
            .await?
            .ok_or_else(|| PuppetError::not_found(PayloadKind::Room, conversation_id))?;
        api.send_text(&room.id, text).await?;
        tracing::debug!(room_id = %room.id, "Sent text message");
        Ok(())
    }
}
