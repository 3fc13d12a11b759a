// ABOUTME: Maps raw Gitter payloads onto the normalized contact, room, and message shapes.
// ABOUTME: Also detects image messages from the markdown Gitter renders for uploads and inline images.

use crate::gitter::{GitterRoom, GitterUser, RoomMessagePayload};
use once_cell::sync::Lazy;
use puppet_core::{
    ContactGender, ContactPayload, ContactType, MessagePayload, MessageType, RoomPayload,
};
use regex::Regex;

// =============================================================================
// Image detection
// =============================================================================

/// Upload links: thumbnail on files.gitter.im wrapped in a link to the full image
static GITTER_UPLOAD_IMAGE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\[!\[[^\]]+\]\(https://files\.gitter\.im/[^)]+\)\]\(([^)]+)\)$").ok()
});

/// `[![alt](IMG)](LINK)`
static LINKED_MARKDOWN_IMAGE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\[!\[[^\]]*\]\(([^)]+)\)\]\([^)]+\)$").ok());

/// `![alt](IMG)`
static MARKDOWN_IMAGE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^!\[[^\]]*\]\(([^)]+)\)$").ok());

/// Image URL carried by a message text, if the whole text is an image.
///
/// Matchers run in order; the first hit wins.
pub fn image_url(text: &str) -> Option<&str> {
    let text = text.trim();
    let matchers: [&Option<Regex>; 3] =
        [&GITTER_UPLOAD_IMAGE, &LINKED_MARKDOWN_IMAGE, &MARKDOWN_IMAGE];
    matchers
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// =============================================================================
// Payload parsers
// =============================================================================

pub fn contact_payload(raw: &GitterUser) -> ContactPayload {
    ContactPayload {
        id: raw.id.clone(),
        name: raw.display_name.clone(),
        handle: raw.username.clone(),
        avatar: raw.avatar_url_medium.clone(),
        gender: ContactGender::Unknown,
        contact_type: ContactType::Individual,
        phone: Vec::new(),
    }
}

pub fn room_payload(raw: &GitterRoom) -> RoomPayload {
    RoomPayload {
        id: raw.id.clone(),
        topic: raw.name.clone(),
        avatar: None,
        member_ids: Vec::new(),
        admin_ids: Vec::new(),
        owner_id: None,
    }
}

pub fn message_payload(raw: &RoomMessagePayload) -> MessagePayload {
    let message = &raw.message;
    let message_type = if image_url(&message.text).is_some() {
        MessageType::Image
    } else {
        MessageType::Text
    };
    MessagePayload {
        id: message.id.clone(),
        from_id: message
            .from_user
            .as_ref()
            .map(|user| user.id.clone())
            .unwrap_or_default(),
        room_id: Some(raw.room_id.clone()),
        text: message.text.clone(),
        mention_ids: message
            .mentions
            .iter()
            .filter_map(|mention| mention.user_id.clone())
            .collect(),
        timestamp: sent_millis(&message.sent),
        message_type,
    }
}

/// Milliseconds since epoch of an RFC 3339 send time; now when absent or malformed
fn sent_millis(sent: &str) -> i64 {
    match chrono::DateTime::parse_from_rfc3339(sent) {
        Ok(time) => time.timestamp_millis(),
        Err(_) => {
            if !sent.is_empty() {
                tracing::debug!(sent = %sent, "Unparseable message send time, using now");
            }
            chrono::Utc::now().timestamp_millis()
        }
    }
}
