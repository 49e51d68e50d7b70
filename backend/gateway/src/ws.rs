//! WebSocket entrypoint and per-connection loop for the terminal relay.
//!
//! One task drains an outbound queue onto the socket; the connection loop
//! reads client frames inline so the membership map needs no locking. Each
//! joined session gets a forwarder task that pipes broadcast frames into the
//! outbound queue.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dockhand_core::SessionId;

use crate::server::GatewayState;
use crate::ws_protocol::WsMessage;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// One joined session on this connection: the token it joined with, and the
/// task forwarding its broadcast frames to the socket.
struct Membership {
    token: String,
    forwarder: JoinHandle<()>,
}

async fn handle_connection(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // Drain queued replies onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else { continue };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashMap<SessionId, Membership> = HashMap::new();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<WsMessage>(&text) {
                Ok(ws_msg) => handle_client_message(ws_msg, &tx, &state, &mut joined).await,
                Err(_) => {
                    warn!("unparseable relay frame");
                    let _ = tx.send(WsMessage::Error {
                        session_id: None,
                        message: "malformed message".to_string(),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    for (id, membership) in joined.drain() {
        membership.forwarder.abort();
        let _ = membership.forwarder.await;
        state.relay.leave(&id).await;
    }
    send_task.abort();
    info!("relay connection closed");
}

async fn handle_client_message(
    msg: WsMessage,
    reply_tx: &mpsc::UnboundedSender<WsMessage>,
    state: &GatewayState,
    joined: &mut HashMap<SessionId, Membership>,
) {
    match msg {
        WsMessage::Ping => {
            let _ = reply_tx.send(WsMessage::Pong);
        }
        WsMessage::Join { session_id, token } => {
            if joined.contains_key(&session_id) {
                let _ = reply_tx.send(WsMessage::Joined { session_id });
                return;
            }
            match state.relay.join(&session_id, &token).await {
                Ok(frames) => {
                    let forwarder = spawn_forwarder(session_id, frames, reply_tx.clone());
                    joined.insert(session_id, Membership { token, forwarder });
                    let _ = reply_tx.send(WsMessage::Joined { session_id });
                }
                Err(e) => {
                    debug!(session = %session_id, error = %e, "join refused");
                    let _ = reply_tx.send(WsMessage::Error {
                        session_id: Some(session_id),
                        message: e.to_string(),
                    });
                }
            }
        }
        WsMessage::Input { session_id, command } => {
            let Some(membership) = joined.get(&session_id) else {
                let _ = reply_tx.send(WsMessage::Error {
                    session_id: Some(session_id),
                    message: "join the session first".to_string(),
                });
                return;
            };
            if let Err(e) = state.relay.submit(&session_id, &membership.token, &command).await {
                let _ = reply_tx.send(WsMessage::Error {
                    session_id: Some(session_id),
                    message: e.to_string(),
                });
            }
        }
        WsMessage::Leave { session_id } => {
            if let Some(membership) = joined.remove(&session_id) {
                membership.forwarder.abort();
                let _ = membership.forwarder.await;
                state.relay.leave(&session_id).await;
            }
        }
        _ => warn!("unexpected server frame from client"),
    }
}

fn spawn_forwarder(
    session_id: SessionId,
    mut frames: broadcast::Receiver<crate::relay::TerminalFrame>,
    tx: mpsc::UnboundedSender<WsMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    let sent = tx.send(WsMessage::Output {
                        session_id,
                        output: frame.output,
                        exit_code: frame.exit_code,
                    });
                    if sent.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session = %session_id, skipped, "observer lagging, output dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
