// ABOUTME: Gitter REST and streaming payload shapes, kept verbatim as raw payloads.
// ABOUTME: Adds RoomMessagePayload, a message model tagged with the room it arrived in.

use serde::{Deserialize, Serialize};

/// User resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitterUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub avatar_url_small: String,
    #[serde(default)]
    pub avatar_url_medium: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,
}

/// Owner summary embedded in one-to-one rooms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub avatar_url_small: String,
    #[serde(default)]
    pub avatar_url_medium: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GithubType {
    /// A room that represents a GitHub organisation
    Org,
    /// A room that represents a GitHub repository
    Repo,
    #[serde(rename = "ONETOONE")]
    OneToOne,
    OrgChannel,
    RepoChannel,
    UserChannel,
    #[serde(other)]
    Unknown,
}

/// Room resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitterRoom {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub one_to_one: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<RoomUser>,
    #[serde(default)]
    pub unread_items: u64,
    #[serde(default)]
    pub mentions: u64,
    #[serde(default)]
    pub lurk: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_type: Option<GithubType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    #[serde(default)]
    pub screen_name: String,
    /// Absent for group mentions such as @all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUrl {
    pub url: String,
}

/// Chat message resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitterMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub html: String,
    /// ISO 8601 send time
    #[serde(default)]
    pub sent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user: Option<GitterUser>,
    #[serde(default)]
    pub read_by: u64,
    #[serde(default)]
    pub urls: Vec<MessageUrl>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
    #[serde(default)]
    pub meta: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOperation {
    Create,
    Update,
    Patch,
    Remove,
    #[serde(other)]
    Unknown,
}

/// One real-time notification on a room's message channel.
///
/// The model stays undecoded so a malformed message fails only its own handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessageEvent {
    pub operation: MessageOperation,
    pub model: serde_json::Value,
}

impl RoomMessageEvent {
    pub fn create(model: serde_json::Value) -> Self {
        Self {
            operation: MessageOperation::Create,
            model,
        }
    }
}

/// Cached message: the provider model plus the id of the room it arrived in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessagePayload {
    pub room_id: String,
    #[serde(flatten)]
    pub message: GitterMessage,
}

impl RoomMessagePayload {
    pub fn new(room_id: impl Into<String>, message: GitterMessage) -> Self {
        Self {
            room_id: room_id.into(),
            message,
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_deserializes_camel_case() {
        let user: GitterUser = serde_json::from_value(json!({
            "id": "U1",
            "username": "alice",
            "displayName": "Alice",
            "url": "/alice",
            "avatarUrl": "https://avatars/alice",
            "avatarUrlSmall": "https://avatars/alice?s=60",
            "avatarUrlMedium": "https://avatars/alice?s=128",
            "gv": "4",
            "v": 12
        }))
        .unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.avatar_url_medium, "https://avatars/alice?s=128");
        assert_eq!(user.v, Some(12));
    }

    #[test]
    fn test_room_github_type_variants() {
        let room: GitterRoom = serde_json::from_value(json!({
            "id": "R1",
            "name": "wechaty/ChatOps",
            "githubType": "ONETOONE"
        }))
        .unwrap();
        assert_eq!(room.github_type, Some(GithubType::OneToOne));

        let room: GitterRoom = serde_json::from_value(json!({
            "id": "R2",
            "githubType": "REPO_CHANNEL"
        }))
        .unwrap();
        assert_eq!(room.github_type, Some(GithubType::RepoChannel));

        let room: GitterRoom = serde_json::from_value(json!({
            "id": "R3",
            "githubType": "SOMETHING_NEW"
        }))
        .unwrap();
        assert_eq!(room.github_type, Some(GithubType::Unknown));
    }

    #[test]
    fn test_message_requires_id_and_text() {
        let missing_text = serde_json::from_value::<GitterMessage>(json!({ "id": "M1" }));
        assert!(missing_text.is_err());

        let minimal: GitterMessage =
            serde_json::from_value(json!({ "id": "M1", "text": "hi" })).unwrap();
        assert!(minimal.from_user.is_none());
        assert!(minimal.mentions.is_empty());
    }

    #[test]
    fn test_operation_parsing() {
        let event: RoomMessageEvent = serde_json::from_value(json!({
            "operation": "patch",
            "model": { "id": "M1" }
        }))
        .unwrap();
        assert_eq!(event.operation, MessageOperation::Patch);

        let event: RoomMessageEvent = serde_json::from_value(json!({
            "operation": "bogus",
            "model": {}
        }))
        .unwrap();
        assert_eq!(event.operation, MessageOperation::Unknown);
    }

    #[test]
    fn test_room_message_payload_flattens_model() {
        let message: GitterMessage =
            serde_json::from_value(json!({ "id": "M1", "text": "hi" })).unwrap();
        let payload = RoomMessagePayload::new("R1", message);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["roomId"], "R1");
        assert_eq!(value["id"], "M1");
        assert_eq!(value["text"], "hi");
        assert_eq!(payload.id(), "M1");
    }
}
