//! Avatar speech providers.

use super::{SpeechKind, SpeechService};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

/// Speaks through the streaming-avatar proxy.
///
/// The proxy accepts `{"action": ..., "data": {...}}` POSTs and forwards them
/// to the avatar provider. A stream session is created on `connect` and its id
/// accompanies every later call.
pub struct AvatarProxySpeechService {
    http: reqwest::Client,
    endpoint: String,
    avatar_id: String,
    voice_id: String,
    stream_session: AsyncMutex<Option<String>>,
}

impl AvatarProxySpeechService {
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client.
    /// * `endpoint` - Full URL of the avatar proxy function.
    /// * `avatar_id` / `voice_id` - Which avatar and voice the stream uses.
    pub fn new(http: reqwest::Client, endpoint: String, avatar_id: String, voice_id: String) -> Self {
        Self {
            http,
            endpoint,
            avatar_id,
            voice_id,
            stream_session: AsyncMutex::new(None),
        }
    }

    async fn call(&self, action: &str, data: Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&proxy_request(action, data))
            .send()
            .await
            .with_context(|| format!("Avatar proxy unreachable for '{action}'"))?
            .error_for_status()
            .with_context(|| format!("Avatar proxy rejected '{action}'"))?;
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Avatar proxy sent an unreadable '{action}' response"))
    }
}

fn proxy_request(action: &str, data: Value) -> Value {
    json!({ "action": action, "data": data })
}

/// Reads the stream session id out of a `create_session` response.
fn stream_session_id(response: &Value) -> Option<String> {
    response
        .pointer("/data/session_id")
        .or_else(|| response.get("session_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl SpeechService for AvatarProxySpeechService {
    async fn connect(&self) -> Result<()> {
        let response = self
            .call(
                "create_session",
                json!({ "avatarId": self.avatar_id, "voiceId": self.voice_id }),
            )
            .await?;
        let session_id =
            stream_session_id(&response).context("Avatar proxy returned no stream session id")?;
        info!(stream_session = %session_id, "Avatar stream session created");
        *self.stream_session.lock().await = Some(session_id);
        Ok(())
    }

    async fn speak(&self, text: &str, kind: SpeechKind) -> Result<()> {
        let Some(session_id) = self.stream_session.lock().await.clone() else {
            bail!("Avatar stream is not connected");
        };
        self.call(
            "speak",
            json!({ "sessionId": session_id, "text": text, "type": kind.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(session_id) = self.stream_session.lock().await.take() {
            self.call("close_session", json!({ "sessionId": session_id }))
                .await?;
        }
        Ok(())
    }
}

/// A line the tutor spoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpokenLine {
    pub text: String,
    pub kind: SpeechKind,
}

/// A `SpeechService` for development and testing.
///
/// Logs and records every line instead of driving an avatar. An optional
/// connect latency simulates the stream handshake.
#[derive(Default)]
pub struct RecordingSpeechService {
    lines: Mutex<Vec<SpokenLine>>,
    connected: AtomicBool,
    connect_latency: Duration,
}

impl RecordingSpeechService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Every line spoken so far, oldest first.
    pub fn lines(&self) -> Vec<SpokenLine> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechService for RecordingSpeechService {
    async fn connect(&self) -> Result<()> {
        if !self.connect_latency.is_zero() {
            tokio::time::sleep(self.connect_latency).await;
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("Recording speech service connected");
        Ok(())
    }

    async fn speak(&self, text: &str, kind: SpeechKind) -> Result<()> {
        info!(kind = kind.as_str(), %text, "Tutor says");
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SpokenLine {
                text: text.to_string(),
                kind,
            });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        info!("Recording speech service disconnected");
        Ok(())
    }
}
