// ABOUTME: Host framework contract that every puppet adapter implements.
// ABOUTME: Defines normalized payload shapes and the lifecycle, lookup, and send operations.

use crate::error::Result;
use crate::events::{EventStream, PuppetEvent};
use crate::state::LifecycleState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// =============================================================================
// Normalized Payloads
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactGender {
    Unknown,
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Unknown,
    Individual,
    Official,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub id: String,
    pub name: String,
    /// Provider-side handle (login/username)
    pub handle: String,
    pub avatar: String,
    pub gender: ContactGender,
    pub contact_type: ContactType,
    pub phone: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub id: String,
    pub topic: String,
    pub avatar: Option<String>,
    pub member_ids: Vec<String>,
    pub admin_ids: Vec<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Unknown,
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub from_id: String,
    pub room_id: Option<String>,
    pub text: String,
    pub mention_ids: Vec<String>,
    /// Milliseconds since Unix epoch
    pub timestamp: i64,
    pub message_type: MessageType,
}

// =============================================================================
// Puppet
// =============================================================================

/// A provider adapter driven by the host framework.
///
/// Raw lookups return the provider's own payload shape; the `*_payload` methods
/// chain a raw lookup with its parser so payload translation has one source.
#[async_trait]
pub trait Puppet: Send + Sync {
    type ContactRaw: Send + Sync;
    type RoomRaw: Send + Sync;
    type MessageRaw: Send + Sync;

    /// Adapter instance identifier, also the first cache namespace segment
    fn name(&self) -> &'static str;

    fn state(&self) -> LifecycleState;

    /// Logged-in account id
    fn self_id(&self) -> Option<String>;

    fn subscribe(&self) -> broadcast::Receiver<PuppetEvent>;

    fn event_stream(&self) -> EventStream;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn login(&self, account_id: &str) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// Ask for a `dong` event carrying `data`
    fn ding(&self, data: Option<String>);

    fn is_logged_in(&self) -> bool {
        self.self_id().is_some()
    }

    // --- Contact ---

    async fn contact_raw_payload(&self, contact_id: &str) -> Result<Self::ContactRaw>;

    fn contact_raw_payload_parser(&self, raw: &Self::ContactRaw) -> Result<ContactPayload>;

    async fn contact_payload(&self, contact_id: &str) -> Result<ContactPayload> {
        let raw = self.contact_raw_payload(contact_id).await?;
        self.contact_raw_payload_parser(&raw)
    }

    async fn contact_list(&self) -> Result<Vec<String>>;

    // --- Room ---

    async fn room_raw_payload(&self, room_id: &str) -> Result<Self::RoomRaw>;

    fn room_raw_payload_parser(&self, raw: &Self::RoomRaw) -> Result<RoomPayload>;

    async fn room_payload(&self, room_id: &str) -> Result<RoomPayload> {
        let raw = self.room_raw_payload(room_id).await?;
        self.room_raw_payload_parser(&raw)
    }

    async fn room_list(&self) -> Result<Vec<String>>;

    // --- Message ---

    async fn message_raw_payload(&self, message_id: &str) -> Result<Self::MessageRaw>;

    fn message_raw_payload_parser(&self, raw: &Self::MessageRaw) -> Result<MessagePayload>;

    async fn message_payload(&self, message_id: &str) -> Result<MessagePayload> {
        let raw = self.message_raw_payload(message_id).await?;
        self.message_raw_payload_parser(&raw)
    }

    async fn message_send_text(&self, conversation_id: &str, text: &str) -> Result<()>;
}
