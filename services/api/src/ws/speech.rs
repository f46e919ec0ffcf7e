use super::protocol::ServerMessage;
use anyhow::Result;
use async_trait::async_trait;
use medtutor_core::tutor::{SpeechKind, SpeechService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Wraps a connection's speech provider and mirrors every spoken line to the
/// browser as a `tutor_speech` message.
///
/// Lines are mirrored before the provider is called, so captions still
/// appear when the avatar is offline.
pub(crate) struct EchoSpeechService {
    inner: Arc<dyn SpeechService>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl EchoSpeechService {
    pub(crate) fn new(
        inner: Arc<dyn SpeechService>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self { inner, outbound }
    }
}

#[async_trait]
impl SpeechService for EchoSpeechService {
    async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    async fn speak(&self, text: &str, kind: SpeechKind) -> Result<()> {
        let caption = ServerMessage::TutorSpeech {
            text: text.to_string(),
            kind,
        };
        if self.outbound.send(caption).is_err() {
            debug!("Connection gone; caption dropped");
        }
        self.inner.speak(text, kind).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }
}
