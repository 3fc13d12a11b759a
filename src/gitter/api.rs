// ABOUTME: Provider client contract consumed by the puppet: REST lookups, send, and room subscriptions.
// ABOUTME: A connector builds one client per puppet start so no connection state outlives stop().

use super::model::{GitterRoom, GitterUser, RoomMessageEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving end of one room's real-time message channel. Single consumer.
pub type RoomEvents = mpsc::Receiver<RoomMessageEvent>;

#[async_trait]
pub trait GitterApi: Send + Sync {
    /// The authenticated account
    async fn current_user(&self) -> Result<GitterUser>;

    /// Every room visible to the authenticated account
    async fn list_rooms(&self) -> Result<Vec<GitterRoom>>;

    /// Ok(None) when the provider does not know the room
    async fn find_room(&self, room_id: &str) -> Result<Option<GitterRoom>>;

    /// Ok(None) when the provider does not know the user
    async fn find_user(&self, user_id: &str) -> Result<Option<GitterUser>>;

    /// Start delivering the room's message events, in provider order
    async fn subscribe(&self, room: &GitterRoom) -> Result<RoomEvents>;

    async fn unsubscribe(&self, room_id: &str) -> Result<()>;

    async fn send_text(&self, room_id: &str, text: &str) -> Result<()>;

    /// Tear down every remaining subscription and background task
    async fn disconnect(&self) -> Result<()>;
}

/// Builds a fresh provider client on each puppet start
#[async_trait]
pub trait GitterConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn GitterApi>>;
}

/// Rooms visible to the account, using a short-lived client with no subscriptions
pub async fn list_visible_rooms(connector: &dyn GitterConnector) -> Result<Vec<GitterRoom>> {
    let api = connector.connect().await.context("Failed to connect to Gitter")?;
    let rooms = api.list_rooms().await.context("Failed to list rooms");
    if let Err(e) = api.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect Gitter client");
    }
    rooms
}
