// ABOUTME: Bridges Gitter room message streams into the raw cache and the puppet event channel.
// ABOUTME: Every subscription registers cleanup handles that detach() runs in reverse order.

use crate::gitter::{
    GitterApi, GitterMessage, GitterRoom, GitterUser, MessageOperation, RoomEvents,
    RoomMessageEvent, RoomMessagePayload,
};
use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use puppet_core::{metrics, EventEmitter, PuppetEvent, RawCache};
use std::future::Future;
use std::sync::Arc;

pub type GitterRawCache = RawCache<GitterUser, GitterRoom, RoomMessagePayload>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Cached and announced
    Bridged,
    /// Not a create operation
    Ignored,
}

struct CleanupHandle {
    label: String,
    run: Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>,
}

/// Room subscriptions for one started puppet
#[derive(Default)]
pub struct EventBridge {
    cleanups: Vec<CleanupHandle>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cleanup handles waiting for detach()
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }

    pub fn push_cleanup<F, Fut>(&mut self, label: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.cleanups.push(CleanupHandle {
            label: label.into(),
            run: Box::new(move || Box::pin(cleanup())),
        });
    }

    /// Subscribe to every room the account can see.
    ///
    /// Fails if the room listing or any subscription fails. Handles registered
    /// before the failure stay queued so the caller can still detach().
    pub async fn attach(
        &mut self,
        api: Arc<dyn GitterApi>,
        cache: Arc<GitterRawCache>,
        emitter: EventEmitter,
    ) -> Result<()> {
        let listed = api.list_rooms().await.context("Failed to list rooms")?;
        tracing::info!(rooms = listed.len(), "Bridging room message events");

        for summary in listed {
            let room = match api
                .find_room(&summary.id)
                .await
                .with_context(|| format!("Failed to load room {}", summary.id))?
            {
                Some(room) => room,
                None => {
                    tracing::warn!(room_id = %summary.id, "Listed room not found, skipping");
                    continue;
                }
            };

            let events = api
                .subscribe(&room)
                .await
                .with_context(|| format!("Failed to subscribe to room {}", room.id))?;

            let unsubscribe_api = Arc::clone(&api);
            let room_id = room.id.clone();
            self.push_cleanup(format!("unsubscribe {}", room.id), move || async move {
                unsubscribe_api.unsubscribe(&room_id).await
            });

            let listener = tokio::spawn(listen(
                room.id.clone(),
                events,
                Arc::clone(&cache),
                emitter.clone(),
            ));
            self.push_cleanup(format!("listener {}", room.id), move || async move {
                listener.abort();
                match listener.await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_cancelled() => Ok(()),
                    Err(e) => Err(anyhow::anyhow!("room listener panicked: {}", e)),
                }
            });
        }
        Ok(())
    }

    /// Run every cleanup handle, newest first. Failures are logged and skipped.
    ///
    /// Returns how many handles failed.
    pub async fn detach(&mut self) -> usize {
        let mut failures = 0;
        while let Some(handle) = self.cleanups.pop() {
            tracing::trace!(cleanup = %handle.label, "Running cleanup");
            if let Err(e) = (handle.run)().await {
                failures += 1;
                metrics::record_error("cleanup");
                tracing::warn!(cleanup = %handle.label, error = %e, "Cleanup failed, continuing");
            }
        }
        if failures > 0 {
            tracing::warn!(failures, "Event bridge detached with cleanup failures");
        } else {
            tracing::debug!("Event bridge detached");
        }
        failures
    }
}

async fn listen(
    room_id: String,
    mut events: RoomEvents,
    cache: Arc<GitterRawCache>,
    emitter: EventEmitter,
) {
    while let Some(event) = events.recv().await {
        match handle_room_message(&cache, &emitter, &room_id, event) {
            Ok(BridgeOutcome::Bridged) => metrics::record_bridge_message("bridged"),
            Ok(BridgeOutcome::Ignored) => metrics::record_bridge_message("ignored"),
            Err(e) => {
                metrics::record_bridge_message("failed");
                metrics::record_error(e.kind_label());
                tracing::warn!(room_id = %room_id, error = %e, "Failed to bridge room message");
            }
        }
    }
    tracing::debug!(room_id = %room_id, "Room event channel closed");
}

/// Handle one room message notification.
///
/// Only `create` is bridged: the message is cached with `room_id` attached,
/// a `Message` event announces its id, and the sender is cached as a contact
/// unless already known.
pub fn handle_room_message(
    cache: &GitterRawCache,
    emitter: &EventEmitter,
    room_id: &str,
    event: RoomMessageEvent,
) -> puppet_core::Result<BridgeOutcome> {
    if event.operation != MessageOperation::Create {
        tracing::trace!(
            room_id = %room_id,
            operation = ?event.operation,
            "Ignoring message operation"
        );
        return Ok(BridgeOutcome::Ignored);
    }

    let message: GitterMessage = serde_json::from_value(event.model)?;
    let message_id = message.id.clone();
    let sender = message.from_user.clone();

    cache.set_message(&message_id, RoomMessagePayload::new(room_id, message))?;
    tracing::debug!(room_id = %room_id, message_id = %message_id, "Bridged room message");
    emitter.emit(PuppetEvent::Message { message_id });

    if let Some(user) = sender {
        if let Err(e) = cache_sender(cache, &user) {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to cache message sender");
        }
    }

    Ok(BridgeOutcome::Bridged)
}

fn cache_sender(cache: &GitterRawCache, user: &GitterUser) -> puppet_core::Result<()> {
    if !cache.has_contact(&user.id)? {
        cache.set_contact(&user.id, user)?;
    }
    Ok(())
}
