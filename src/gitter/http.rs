// ABOUTME: reqwest-backed Gitter client: REST calls plus one streaming task per subscribed room.
// ABOUTME: Streams are newline-delimited JSON and reconnect with exponential backoff until unsubscribed.

use super::api::{GitterApi, GitterConnector, RoomEvents};
use super::model::{GitterMessage, GitterRoom, GitterUser, RoomMessageEvent};
use crate::config::GitterConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const ROOM_CHANNEL_CAPACITY: usize = 64;
const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

pub struct GitterClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    config: GitterConfig,
    streams: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl GitterClient {
    pub fn new(config: GitterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build Gitter HTTP client")?;
        // Streaming responses never finish, so no overall timeout here
        let stream_http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to build Gitter streaming client")?;
        Ok(Self {
            http,
            stream_http,
            config,
            streams: Mutex::new(HashMap::new()),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.api_url(path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;
        resp.json()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    /// GET that maps 404 to Ok(None)
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.api_url(path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("GET {} returned an error status", url))?;
        let value = resp
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))?;
        Ok(Some(value))
    }

    fn lock_streams(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GitterApi for GitterClient {
    async fn current_user(&self) -> Result<GitterUser> {
        self.get_json("user/me").await
    }

    async fn list_rooms(&self) -> Result<Vec<GitterRoom>> {
        self.get_json("rooms").await
    }

    async fn find_room(&self, room_id: &str) -> Result<Option<GitterRoom>> {
        self.get_optional(&format!("rooms/{}", room_id)).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<GitterUser>> {
        self.get_optional(&format!("users/{}", user_id)).await
    }

    async fn subscribe(&self, room: &GitterRoom) -> Result<RoomEvents> {
        let (tx, rx) = mpsc::channel(ROOM_CHANNEL_CAPACITY);
        let url = format!(
            "{}/v1/rooms/{}/chatMessages",
            self.config.stream_url, room.id
        );
        let task = tokio::spawn(stream_room(
            self.stream_http.clone(),
            url,
            self.config.token.clone(),
            room.id.clone(),
            tx,
        ));
        if let Some(previous) = self.lock_streams().insert(room.id.clone(), task) {
            tracing::debug!(room_id = %room.id, "Replacing existing room stream");
            previous.abort();
        }
        tracing::info!(room_id = %room.id, room = %room.name, "Subscribed to room messages");
        Ok(rx)
    }

    async fn unsubscribe(&self, room_id: &str) -> Result<()> {
        match self.lock_streams().remove(room_id) {
            Some(task) => {
                task.abort();
                tracing::debug!(room_id = %room_id, "Unsubscribed from room messages");
            }
            None => tracing::debug!(room_id = %room_id, "Unsubscribe for unknown room"),
        }
        Ok(())
    }

    async fn send_text(&self, room_id: &str, text: &str) -> Result<()> {
        let url = self.api_url(&format!("rooms/{}/chatMessages", room_id));
        let body = serde_json::json!({ "text": text });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, room_id = %room_id, "Gitter send failed: {}", body_text);
            anyhow::bail!("Gitter send to room {} failed with status {}", room_id, status);
        }
        let sent: GitterMessage = resp.json().await.context("Failed to decode sent message")?;
        tracing::debug!(room_id = %room_id, message_id = %sent.id, "Message sent");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let streams: Vec<_> = self.lock_streams().drain().collect();
        for (room_id, task) in streams {
            task.abort();
            tracing::debug!(room_id = %room_id, "Aborted room stream");
        }
        tracing::info!("Gitter client disconnected");
        Ok(())
    }
}

/// Follow one room's message stream until the receiver goes away
async fn stream_room(
    http: reqwest::Client,
    url: String,
    token: String,
    room_id: String,
    tx: mpsc::Sender<RoomMessageEvent>,
) {
    let mut backoff = RECONNECT_INITIAL;
    loop {
        match read_stream(&http, &url, &token, &tx).await {
            Ok(true) => {
                tracing::debug!(room_id = %room_id, "Room receiver dropped, ending stream");
                return;
            }
            Ok(false) => {
                tracing::info!(room_id = %room_id, "Room stream ended, reconnecting");
                backoff = RECONNECT_INITIAL;
            }
            Err(e) => {
                tracing::warn!(
                    room_id = %room_id,
                    error = %e,
                    retry_in_secs = backoff.as_secs(),
                    "Room stream failed"
                );
            }
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

/// Returns Ok(true) once the receiver is closed, Ok(false) when the server ends the stream
async fn read_stream(
    http: &reqwest::Client,
    url: &str,
    token: &str,
    tx: &mpsc::Sender<RoomMessageEvent>,
) -> Result<bool> {
    let resp = http
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?
        .error_for_status()?;

    let mut body = resp.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
        for line in drain_lines(&mut buffer) {
            let Some(event) = parse_stream_line(&line) else {
                continue;
            };
            if tx.send(event).await.is_err() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Split complete lines off the front of `buffer`, leaving any partial tail
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim().to_string());
    }
    lines
}

/// Blank lines are heartbeats; every other line is one message model
fn parse_stream_line(line: &str) -> Option<RoomMessageEvent> {
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(model) => Some(RoomMessageEvent::create(model)),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping undecodable stream line");
            None
        }
    }
}

/// Builds a fresh [`GitterClient`] per puppet start
pub struct HttpConnector {
    config: GitterConfig,
}

impl HttpConnector {
    pub fn new(config: GitterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl GitterConnector for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn GitterApi>> {
        let client = GitterClient::new(self.config.clone())?;
        Ok(Arc::new(client))
    }
}
