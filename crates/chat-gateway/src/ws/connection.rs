use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chat_auth::Decision;
use chat_hub::{HubMessage, WsEvent};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// Inbound application frames the Hub itself understands (§4.6). Anything
/// else is ignored — writes happen exclusively through the REST surface.
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    frame_type: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, conversation_id, query.token))
}

/// Per-connection task, lives for the entire socket session.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, conversation_id: String, token: String) {
    let (mut tx, mut rx) = socket.split();

    let ctx = match authorize(&state, &conversation_id, &token).await {
        Ok(ctx) => ctx,
        Err(reason) => {
            warn!(conversation_id, reason, "socket upgrade rejected");
            let _ = tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };

    let conn_id = Uuid::new_v4().to_string();
    let (msg_tx, mut msg_rx) = mpsc::channel::<HubMessage>(chat_hub::OUTBOUND_CHANNEL_CAPACITY);

    let connected = WsEvent::Connected {
        conversation_id: conversation_id.clone(),
        user_id: ctx.user_id.clone(),
        org_id: ctx.org_id.clone(),
    };
    if tx.send(Message::Text(connected.to_json().into())).await.is_err() {
        return;
    }

    info!(conversation_id, conn_id, user_id = ctx.user_id.as_str(), "socket connected");
    state
        .hub
        .register(&conversation_id, &conn_id, &ctx.user_id, msg_tx)
        .await;

    loop {
        tokio::select! {
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &conversation_id, &ctx.user_id, &text, &mut tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            outgoing = msg_rx.recv() => {
                match outgoing {
                    Some(HubMessage::Event(json)) => {
                        if tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(HubMessage::Close { code, reason }) => {
                        let _ = tx
                            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.hub.deregister(&conversation_id, &conn_id, "client_closed").await;
    info!(conversation_id, conn_id, "socket disconnected");
}

async fn handle_inbound(
    state: &Arc<AppState>,
    conversation_id: &str,
    user_id: &str,
    text: &str,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) {
    let Ok(frame) = serde_json::from_str::<InboundFrame>(text) else {
        return;
    };
    match frame.frame_type.as_str() {
        "ping" => {
            let _ = tx.send(Message::Text(WsEvent::Pong.to_json().into())).await;
        }
        "typing" => {
            state
                .hub
                .broadcast(
                    conversation_id,
                    &WsEvent::UserTyping {
                        user_id: user_id.to_string(),
                    },
                )
                .await;
        }
        _ => {}
    }
}

/// Socket authorization at upgrade (§4.6): validate the token, require
/// `chat:read` scope, then confirm the resolver allows it for this
/// conversation. Returns the close reason string on any failure.
async fn authorize(
    state: &AppState,
    conversation_id: &str,
    token: &str,
) -> Result<chat_core::types::AuthContext, &'static str> {
    let ctx = chat_auth::validate(token, &state.jwt_secret).map_err(|_| "invalid token")?;
    if !ctx.has_scope("chat:read") {
        return Err("missing chat:read scope");
    }
    match state
        .resolver
        .check(&ctx.org_id, &ctx.user_id, "chat:read", Some(conversation_id))
        .await
    {
        Decision::Allowed { .. } => Ok(ctx),
        Decision::Denied => Err("permission denied"),
        Decision::Unavailable => Err("authorization service unavailable"),
    }
}
