// Path: crates/gateway/src/bridge.rs

//! The optional WebSocket bridge.
//!
//! Re-exports the control plane to browser clients on a separate TCP
//! port. A client must authenticate with `{"type":"auth","token":...}`
//! first unless the configured token is empty, in which case anyone is
//! auto-authenticated. After that, any control command may be issued as
//! `{"type":"<cmd>", "id"?: ..., ...args}`; events stream in alongside.
//!
//! The bridge holds no identity state and never forwards a client-chosen
//! message id into routing: `send` ids are always daemon-generated.

use crate::control;
use crate::state::Gateway;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use claw_types::config::WsBridgeConfig;
use claw_types::ipc::{Event, Request};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::sync::Arc;

#[derive(Clone)]
struct BridgeState {
    gw: Gateway,
    token: Option<String>,
}

/// Binds the bridge listener and serves until shutdown.
pub async fn start(
    gw: Gateway,
    cfg: WsBridgeConfig,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    let token = cfg.token.clone().filter(|t| !t.is_empty());
    let state = BridgeState {
        gw: gw.clone(),
        token,
    };

    let mut app = Router::new().route("/ws", get(ws_handler)).with_state(Arc::new(state));
    if let Some(dir) = cfg.static_dir.clone() {
        app = app.fallback_service(tower_http::services::ServeDir::new(dir));
    }

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cfg.port)).await?;
    tracing::info!(target: "bridge", event = "listening", port = cfg.port);

    let mut shutdown = gw.shutdown_signal();
    Ok(tokio::spawn(async move {
        let serve = axum::serve(listener, app).into_future();
        tokio::select! {
            res = serve => {
                if let Err(e) = res {
                    tracing::warn!(target: "bridge", event = "serve_fail", error = %e);
                }
            }
            _ = shutdown.changed() => {}
        }
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BridgeState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bridge-facing event names differ from the IPC ones.
fn event_to_ws(event: &Event) -> Option<Value> {
    let value = match event {
        Event::Message { message } => json!({
            "type": "message",
            "message": message,
        }),
        Event::Connected { identity, peer } => json!({
            "type": "peer_connected",
            "identity": identity,
            "peer": peer,
        }),
        Event::Disconnected { identity, peer } => json!({
            "type": "peer_disconnected",
            "identity": identity,
            "peer": peer,
        }),
        Event::Error { error } => json!({
            "type": "error",
            "error": error,
        }),
        Event::Started { .. } => return None,
    };
    Some(value)
}

async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>) {
    let (mut tx, mut rx) = socket.split();
    // Auto-authenticate when no token is configured.
    let mut authenticated = state.token.is_none();
    let mut events = state.gw.subscribe_events();
    let mut shutdown = state.gw.shutdown_signal();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv(), if authenticated => {
                match event {
                    Ok(ev) => {
                        if let Some(value) = event_to_ws(&ev) {
                            if tx.send(WsMessage::Text(value.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            incoming = rx.next() => {
                let Some(Ok(msg)) = incoming else { break };
                let text = match msg {
                    WsMessage::Text(t) => t,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                let reply = handle_client_message(&state, &mut authenticated, &text).await;
                if let Some(reply) = reply {
                    if tx.send(WsMessage::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_client_message(
    state: &Arc<BridgeState>,
    authenticated: &mut bool,
    text: &str,
) -> Option<Value> {
    let envelope: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return Some(json!({ "type": "error", "error": format!("malformed message: {e}") }))
        }
    };
    let msg_type = envelope.get("type").and_then(Value::as_str).unwrap_or("");
    let id = envelope.get("id").cloned();

    match msg_type {
        "auth" => {
            let offered = envelope.get("token").and_then(Value::as_str).unwrap_or("");
            match &state.token {
                Some(expected) if offered != expected => {
                    tracing::warn!(target: "bridge", event = "auth_fail");
                    Some(json!({ "type": "auth_fail" }))
                }
                _ => {
                    *authenticated = true;
                    Some(json!({ "type": "auth_ok" }))
                }
            }
        }
        "ping" => Some(json!({ "type": "pong" })),
        "" => Some(json!({ "type": "error", "error": "missing type" })),
        _ => {
            if !*authenticated {
                return Some(json!({ "type": "auth_fail" }));
            }
            // Re-shape the envelope into a control request: the bridge
            // vocabulary is the IPC vocabulary under `type`.
            let mut body = envelope.clone();
            if let Some(obj) = body.as_object_mut() {
                obj.remove("id");
                let t = obj.remove("type");
                obj.insert("cmd".into(), t.unwrap_or(Value::Null));
            }
            let request: Request = match serde_json::from_value(body) {
                Ok(r) => r,
                Err(e) => {
                    return Some(json!({
                        "type": "result",
                        "id": id,
                        "ok": false,
                        "error": format!("unknown or malformed command: {e}"),
                    }))
                }
            };
            let is_stop = matches!(request, Request::Stop);
            let response = control::dispatch(&state.gw, request).await;
            if is_stop {
                state.gw.begin_shutdown();
            }
            Some(json!({
                "type": "result",
                "id": id,
                "ok": response.ok,
                "data": response.data,
                "error": response.error,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_types::{Message, MessageStatus, Principal};

    fn p(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    #[test]
    fn bridge_event_names_differ_from_ipc() {
        let ev = Event::Connected {
            identity: p(1),
            peer: p(2),
        };
        let ws = event_to_ws(&ev).unwrap();
        assert_eq!(ws["type"], "peer_connected");

        let ev = Event::Message {
            message: Message {
                id: "m".repeat(32),
                from: p(2),
                from_nick: None,
                to: p(1),
                content: "hi".into(),
                timestamp: 5,
                status: MessageStatus::Delivered,
            },
        };
        assert_eq!(event_to_ws(&ev).unwrap()["type"], "message");
    }
}
