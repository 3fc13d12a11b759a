// ABOUTME: Scriptable in-memory Gitter provider shared by the integration tests
// ABOUTME: Records subscriptions, sends, and lookups; lets tests inject room message events

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use puppet_gitter::gitter::{
    GitterApi, GitterConnector, GitterRoom, GitterUser, RoomEvents, RoomMessageEvent,
};
use puppet_gitter::puppet_core::PuppetEvent;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn user(id: &str, name: &str) -> GitterUser {
    serde_json::from_value(json!({
        "id": id,
        "username": name.to_lowercase(),
        "displayName": name,
        "url": format!("/{}", name.to_lowercase()),
        "avatarUrl": format!("https://avatars.example/{}", id),
        "avatarUrlSmall": format!("https://avatars.example/{}?s=60", id),
        "avatarUrlMedium": format!("https://avatars.example/{}?s=128", id),
    }))
    .unwrap()
}

pub fn room(id: &str, name: &str) -> GitterRoom {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "topic": "",
        "uri": name,
        "url": format!("/{}", name),
        "githubType": "REPO",
    }))
    .unwrap()
}

/// Message model as the streaming API delivers it
pub fn message_model(id: &str, text: &str, from: Option<&GitterUser>) -> serde_json::Value {
    let mut model = json!({
        "id": id,
        "text": text,
        "html": text,
        "sent": "2020-08-08T10:00:00.000Z",
        "readBy": 0,
        "urls": [],
        "mentions": [],
        "issues": [],
        "meta": [],
        "v": 1
    });
    if let Some(user) = from {
        model["fromUser"] = serde_json::to_value(user).unwrap();
    }
    model
}

#[derive(Default)]
struct MockState {
    rooms: Vec<GitterRoom>,
    hidden_rooms: Vec<String>,
    users: HashMap<String, GitterUser>,
    senders: HashMap<String, mpsc::Sender<RoomMessageEvent>>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    sent: Vec<(String, String)>,
    fail_list_rooms: bool,
}

pub struct MockGitter {
    me: GitterUser,
    state: Mutex<MockState>,
    find_user_calls: AtomicUsize,
    find_room_calls: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockGitter {
    pub fn new(me: GitterUser) -> Arc<Self> {
        Arc::new(Self {
            me,
            state: Mutex::new(MockState::default()),
            find_user_calls: AtomicUsize::new(0),
            find_room_calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn add_room(&self, room: GitterRoom) {
        self.state.lock().unwrap().rooms.push(room);
    }

    /// Listed by list_rooms but unknown to find_room
    pub fn add_hidden_room(&self, room: GitterRoom) {
        let mut state = self.state.lock().unwrap();
        state.hidden_rooms.push(room.id.clone());
        state.rooms.push(room);
    }

    pub fn add_user(&self, user: GitterUser) {
        self.state.lock().unwrap().users.insert(user.id.clone(), user);
    }

    pub fn clear_users(&self) {
        self.state.lock().unwrap().users.clear();
    }

    pub fn clear_rooms(&self) {
        self.state.lock().unwrap().rooms.clear();
    }

    pub fn fail_list_rooms(&self, fail: bool) {
        self.state.lock().unwrap().fail_list_rooms = fail;
    }

    /// Deliver an event on a subscribed room's channel
    pub async fn push(&self, room_id: &str, event: RoomMessageEvent) -> bool {
        let sender = self.state.lock().unwrap().senders.get(room_id).cloned();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn sender(&self, room_id: &str) -> Option<mpsc::Sender<RoomMessageEvent>> {
        self.state.lock().unwrap().senders.get(room_id).cloned()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribed.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn find_user_calls(&self) -> usize {
        self.find_user_calls.load(Ordering::SeqCst)
    }

    pub fn find_room_calls(&self) -> usize {
        self.find_room_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitterApi for MockGitter {
    async fn current_user(&self) -> Result<GitterUser> {
        Ok(self.me.clone())
    }

    async fn list_rooms(&self) -> Result<Vec<GitterRoom>> {
        let state = self.state.lock().unwrap();
        if state.fail_list_rooms {
            anyhow::bail!("list_rooms failed");
        }
        Ok(state.rooms.clone())
    }

    async fn find_room(&self, room_id: &str) -> Result<Option<GitterRoom>> {
        self.find_room_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.hidden_rooms.iter().any(|id| id == room_id) {
            return Ok(None);
        }
        Ok(state.rooms.iter().find(|room| room.id == room_id).cloned())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<GitterUser>> {
        self.find_user_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().users.get(user_id).cloned())
    }

    async fn subscribe(&self, room: &GitterRoom) -> Result<RoomEvents> {
        let (tx, rx) = mpsc::channel(16);
        let mut state = self.state.lock().unwrap();
        state.senders.insert(room.id.clone(), tx);
        state.subscribed.push(room.id.clone());
        Ok(rx)
    }

    async fn unsubscribe(&self, room_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.senders.remove(room_id);
        state.unsubscribed.push(room_id.to_string());
        Ok(())
    }

    async fn send_text(&self, room_id: &str, text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .sent
            .push((room_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().senders.clear();
        Ok(())
    }
}

/// Hands out the same MockGitter on every connect
pub struct MockConnector {
    api: Arc<MockGitter>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(api: Arc<MockGitter>) -> Arc<Self> {
        Arc::new(Self {
            api,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitterConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn GitterApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.api) as Arc<dyn GitterApi>)
    }
}

/// Wait for the first event matching `pred`, skipping others
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PuppetEvent>,
    mut pred: F,
) -> PuppetEvent
where
    F: FnMut(&PuppetEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for puppet event")
}

/// Poll `check` until it returns true or five seconds pass
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
