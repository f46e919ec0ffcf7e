//! Manages the WebSocket connection lifecycle for one learner's quiz.

use super::{
    protocol::{ClientMessage, ServerMessage},
    speech::EchoSpeechService,
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use medtutor_core::session::{AdvanceResult, SessionHandle, SessionOrchestrator};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one quiz connection until the client goes away.
///
/// The connection gets its own orchestrator and speech provider. Three
/// sources feed the socket: replies to client requests, tutor captions, and
/// snapshot changes.
#[instrument(name = "quiz_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("New quiz connection");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let speech = Arc::new(EchoSpeechService::new(
        state.speech_service(),
        outbound_tx.clone(),
    ));
    let handle = SessionOrchestrator::spawn(
        state.config.session_settings(),
        state.question_bank.clone(),
        state.tutor(speech),
    );
    let mut snapshots = handle.subscribe();

    let initial = ServerMessage::Snapshot {
        snapshot: snapshots.borrow_and_update().clone(),
    };
    if let Err(e) = send_msg(&mut socket_tx, initial).await {
        error!(error = ?e, "Failed to send initial snapshot");
        handle.shutdown().await;
        return;
    }

    loop {
        tokio::select! {
            msg = socket_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => {
                        if let Some(reply) = handle_client_message(&handle, request).await {
                            let _ = outbound_tx.send(reply);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Unrecognised client message");
                        let _ = outbound_tx.send(ServerMessage::Error {
                            message: format!("Unrecognised message: {e}"),
                        });
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    break;
                }
            },
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = send_msg(&mut socket_tx, message).await {
                    warn!(error = ?e, "Failed to send to client");
                    break;
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Err(e) = send_msg(&mut socket_tx, ServerMessage::Snapshot { snapshot }).await {
                    warn!(error = ?e, "Failed to send snapshot");
                    break;
                }
            },
        }
    }

    handle.shutdown().await;
    info!("Quiz connection closed and session shut down");
}

/// Forwards one client request to the orchestrator and builds the reply, if any.
async fn handle_client_message(
    handle: &SessionHandle,
    request: ClientMessage,
) -> Option<ServerMessage> {
    let reply = match request {
        ClientMessage::Start => handle.start().await.map(|session_id| {
            info!(%session_id, "Quiz started");
            None
        }),
        ClientMessage::End => handle
            .end()
            .await
            .map(|summary| Some(ServerMessage::SessionSummary { summary })),
        ClientMessage::Reset => handle.reset().await.map(|()| None),
        ClientMessage::Submit { option_id } => handle
            .submit(option_id)
            .await
            .map(|outcome| Some(ServerMessage::answer_result(&outcome))),
        ClientMessage::Advance => handle.advance().await.map(|result| match result {
            AdvanceResult::Finished(summary) => Some(ServerMessage::SessionSummary { summary }),
            AdvanceResult::Next { .. } => None,
        }),
    };

    reply.unwrap_or_else(|e| {
        info!(reason = e.code(), "Request rejected");
        Some(ServerMessage::rejected(&e))
    })
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
