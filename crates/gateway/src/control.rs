// Path: crates/gateway/src/control.rs

//! The local control plane: newline-delimited JSON over a unix socket.
//!
//! One request line in, exactly one response line out, per connection, in
//! order. Connections that issue `subscribe` additionally receive event
//! lines (tagged with `type` instead of `ok`) as they happen. The
//! WebSocket bridge reuses [`dispatch`] for its command envelope.

use crate::delivery;
use crate::exchange;
use crate::router;
use crate::sessions;
use crate::state::Gateway;
use claw_types::error::{ControlError, ErrorCode};
use claw_types::ipc::{Event, Request, Response, StatusData};
use claw_types::{addr, Principal};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{sleep_until, Duration, Instant};

pub fn socket_path(root: &Path) -> PathBuf {
    root.join("clawchat.sock")
}

pub fn pid_path(root: &Path) -> PathBuf {
    root.join("daemon.pid")
}

/// Binds the control socket and starts serving. The socket and pid file
/// are removed by the daemon's shutdown path.
pub async fn start(gw: Gateway) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    let (sock, pid) = gw.with_state(|state| {
        (socket_path(&state.root), pid_path(&state.root))
    });
    // A stale socket from an unclean shutdown would fail the bind.
    let _ = std::fs::remove_file(&sock);
    let listener = UnixListener::bind(&sock)?;
    std::fs::write(&pid, format!("{}\n", std::process::id()))?;
    tracing::info!(target: "control", event = "listening", path = %sock.display());

    let mut shutdown = gw.shutdown_signal();
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let gw = gw.clone();
                            tokio::spawn(async move {
                                handle_connection(gw, stream).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(target: "control", event = "accept_fail", error = %e);
                        }
                    }
                }
            }
        }
    }))
}

async fn handle_connection(gw: Gateway, stream: UnixStream) {
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(write_half));
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let resp = Response::err(format!("malformed request: {e}"), "IPC_BAD_REQUEST");
                if write_line(&writer, &resp).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let is_stop = matches!(request, Request::Stop);
        let response = match request {
            Request::Subscribe => {
                spawn_event_forwarder(&gw, writer.clone());
                Response::ok(json!({ "subscribed": true }))
            }
            other => dispatch(&gw, other).await,
        };
        if write_line(&writer, &response).await.is_err() {
            break;
        }
        if is_stop {
            gw.begin_shutdown();
            break;
        }
    }
}

fn spawn_event_forwarder(
    gw: &Gateway,
    writer: Arc<tokio::sync::Mutex<tokio::net::unix::OwnedWriteHalf>>,
) {
    let mut events = gw.subscribe_events();
    let mut shutdown = gw.shutdown_signal();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let event = match event {
                        Ok(e) => e,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(target: "control", event = "subscriber_lagged", skipped);
                            continue;
                        }
                        Err(_) => break,
                    };
                    let Ok(line) = serde_json::to_string(&event) else { continue };
                    let mut w = writer.lock().await;
                    if w.write_all(line.as_bytes()).await.is_err()
                        || w.write_all(b"\n").await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}

async fn write_line(
    writer: &Arc<tokio::sync::Mutex<tokio::net::unix::OwnedWriteHalf>>,
    response: &Response,
) -> std::io::Result<()> {
    let line = serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"ok":false,"error":"response serialization failed"}"#.to_string()
    });
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await
}

fn err_response(e: ControlError) -> Response {
    Response::err(e.to_string(), e.code())
}

/// Executes one control command. Shared by the unix socket and the
/// WebSocket bridge.
pub async fn dispatch(gw: &Gateway, request: Request) -> Response {
    match request {
        Request::Send {
            to,
            content,
            as_identity,
        } => handle_send(gw, &to, content, as_identity.as_deref()).await,
        Request::Recv {
            as_identity,
            since,
            timeout,
        } => handle_recv(gw, as_identity.as_deref(), since.unwrap_or(0), timeout.unwrap_or(0)).await,
        Request::Inbox { as_identity } => {
            with_identity(gw, as_identity.as_deref(), |state, principal| {
                let entry = state.entry(&principal)?;
                Ok(serde_json::to_value(entry.inbox.messages()).unwrap_or_default())
            })
        }
        Request::Outbox { as_identity } => {
            with_identity(gw, as_identity.as_deref(), |state, principal| {
                let entry = state.entry(&principal)?;
                Ok(serde_json::to_value(entry.outbox.messages()).unwrap_or_default())
            })
        }
        Request::Peers { as_identity } => {
            with_identity(gw, as_identity.as_deref(), |state, principal| {
                let entry = state.entry(&principal)?;
                let peers: Vec<serde_json::Value> = entry
                    .peers
                    .records()
                    .values()
                    .map(|rec| {
                        let connected = state.sessions.find(&principal, &rec.principal).is_some();
                        let mut value = serde_json::to_value(rec).unwrap_or_default();
                        if let Some(obj) = value.as_object_mut() {
                            obj.insert("connected".into(), json!(connected));
                        }
                        value
                    })
                    .collect();
                Ok(serde_json::Value::Array(peers))
            })
        }
        Request::PeerAdd {
            principal,
            address,
            alias,
            as_identity,
        } => {
            let parsed = match Principal::parse(&principal) {
                Ok(p) => p,
                Err(_) => {
                    return err_response(ControlError::BadRequest(format!(
                        "invalid principal: {principal}"
                    )))
                }
            };
            let normalized = match addr::normalize(&address) {
                Ok(a) => a,
                Err(e) => return err_response(ControlError::BadRequest(e.to_string())),
            };
            with_identity(gw, as_identity.as_deref(), move |state, identity| {
                let entry = state.entry_mut(&identity)?;
                entry
                    .peers
                    .add(parsed.clone(), &normalized, alias.clone())
                    .map_err(|e| ControlError::Internal(e.to_string()))?;
                Ok(json!({ "added": parsed }))
            })
        }
        Request::PeerRemove {
            principal,
            as_identity,
        } => {
            let parsed = match Principal::parse(&principal) {
                Ok(p) => p,
                Err(_) => {
                    return err_response(ControlError::BadRequest(format!(
                        "invalid principal: {principal}"
                    )))
                }
            };
            with_identity(gw, as_identity.as_deref(), move |state, identity| {
                let entry = state.entry_mut(&identity)?;
                let removed = entry
                    .peers
                    .remove(&parsed)
                    .map_err(|e| ControlError::Internal(e.to_string()))?;
                if removed {
                    Ok(json!({ "removed": parsed }))
                } else {
                    Err(ControlError::NoSuchPeer(parsed.as_str().to_string()))
                }
            })
        }
        Request::PeerResolve {
            principal,
            through,
            as_identity,
        } => handle_peer_resolve(gw, &principal, through.as_deref(), as_identity.as_deref()).await,
        Request::Status { as_identity } => {
            with_identity(gw, as_identity.as_deref(), |state, principal| {
                let entry = state.entry(&principal)?;
                let status = StatusData {
                    principal: principal.clone(),
                    peer_id: hex::encode(state.node_public_key),
                    p2p_port: state.listen_port,
                    multiaddrs: state.multiaddrs(),
                    connected_peers: state.sessions.connected_peers(&principal),
                    inbox_count: entry.inbox.len(),
                    outbox_count: entry.outbox.len(),
                    loaded_identities: state.local_principals(),
                };
                Ok(serde_json::to_value(status).unwrap_or_default())
            })
        }
        Request::Multiaddrs => {
            let addrs = gw.with_state(|state| state.multiaddrs());
            Response::ok(json!(addrs))
        }
        Request::Connect { multiaddr } => handle_connect(gw, &multiaddr).await,
        Request::Ping => Response::ok(json!({ "pong": true })),
        Request::Subscribe => Response::ok(json!({ "subscribed": true })),
        Request::Stop => Response::ok(json!({ "stopping": true })),
    }
}

/// Runs a closure against the resolved identity under the state lock.
fn with_identity(
    gw: &Gateway,
    name: Option<&str>,
    f: impl FnOnce(&mut crate::state::GatewayState, Principal) -> Result<serde_json::Value, ControlError>,
) -> Response {
    gw.with_state(|state| {
        let principal = match state.resolve_identity(name) {
            Ok(p) => p,
            Err(e) => return err_response(e),
        };
        match f(state, principal) {
            Ok(data) => Response::ok(data),
            Err(e) => err_response(e),
        }
    })
}

async fn handle_send(gw: &Gateway, to: &str, content: String, as_identity: Option<&str>) -> Response {
    let to = match Principal::parse(to) {
        Ok(p) => p,
        Err(_) => {
            return err_response(ControlError::BadRecipient(to.to_string()));
        }
    };
    let queued = gw.with_state(|state| {
        let from = state.resolve_identity(as_identity)?;
        let entry = state.entry(&from)?;
        // The allow list bounds this identity's correspondents in both
        // directions.
        if !entry.acl_allows(&to) {
            return Err(ControlError::Denied(format!(
                "{} is not an allowed peer of {}",
                to, from
            )));
        }
        Ok(from)
    });
    let from = match queued {
        Ok(f) => f,
        Err(e) => return err_response(e),
    };
    let message = match router::queue_outbound(gw, &from, &to, content) {
        Ok(m) => m,
        Err(e) => return err_response(e),
    };

    // Immediate attempt; the retry tick owns it afterwards.
    let spawn_gw = gw.clone();
    let spawn_local = from.clone();
    let spawn_msg = message.clone();
    tokio::spawn(async move {
        delivery::deliver_now(&spawn_gw, &spawn_local, spawn_msg).await;
    });

    Response::ok(json!({ "id": message.id, "status": "queued" }))
}

async fn handle_recv(
    gw: &Gateway,
    as_identity: Option<&str>,
    since: u64,
    timeout_ms: u64,
) -> Response {
    // Subscribe before snapshotting so a delivery racing the snapshot is
    // seen on one side or the other.
    let mut events = gw.subscribe_events();
    let snapshot = gw.with_state(|state| {
        let principal = state.resolve_identity(as_identity)?;
        let entry = state.entry(&principal)?;
        Ok::<_, ControlError>((principal, entry.inbox.since(since)))
    });
    let (principal, messages) = match snapshot {
        Ok(pair) => pair,
        Err(e) => return err_response(e),
    };
    if !messages.is_empty() || timeout_ms == 0 {
        return Response::ok(serde_json::to_value(messages).unwrap_or_default());
    }

    // Long poll: resolve on the first matching delivery or at the
    // deadline, whichever comes first.
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {
                return Response::ok(json!([]));
            }
            event = events.recv() => {
                match event {
                    Ok(Event::Message { message })
                        if message.to == principal && message.timestamp > since =>
                    {
                        return Response::ok(
                            serde_json::to_value(vec![message]).unwrap_or_default(),
                        );
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Fall back to the inbox itself after a lag.
                        let caught_up = gw.with_state(|state| {
                            state
                                .entry(&principal)
                                .map(|e| e.inbox.since(since))
                                .unwrap_or_default()
                        });
                        if !caught_up.is_empty() {
                            return Response::ok(
                                serde_json::to_value(caught_up).unwrap_or_default(),
                            );
                        }
                    }
                    Err(_) => return Response::ok(json!([])),
                }
            }
        }
    }
}

async fn handle_peer_resolve(
    gw: &Gateway,
    principal: &str,
    through: Option<&str>,
    as_identity: Option<&str>,
) -> Response {
    let target = match Principal::parse(principal) {
        Ok(p) => p,
        Err(_) => {
            return err_response(ControlError::BadRequest(format!(
                "invalid principal: {principal}"
            )))
        }
    };
    let through = match through {
        Some(s) => match Principal::parse(s) {
            Ok(p) => Some(p),
            Err(_) => {
                return err_response(ControlError::BadRequest(format!(
                    "invalid principal: {s}"
                )))
            }
        },
        None => None,
    };
    let local = match gw.with_state(|state| state.resolve_identity(as_identity)) {
        Ok(p) => p,
        Err(e) => return err_response(e),
    };
    match exchange::resolve(gw, &local, &target, through.as_ref()).await {
        Some(peer) => Response::ok(serde_json::to_value(peer).unwrap_or_default()),
        None => Response::ok(serde_json::Value::Null),
    }
}

async fn handle_connect(gw: &Gateway, multiaddr: &str) -> Response {
    let normalized = match addr::normalize(multiaddr) {
        Ok(a) => a,
        Err(e) => return err_response(ControlError::BadRequest(e.to_string())),
    };
    let local = match gw.with_state(|state| state.default_principal()) {
        Ok(p) => p,
        Err(e) => return err_response(e),
    };
    match sessions::connect_outbound(gw, &local, &normalized, None).await {
        Ok(handle) => Response::ok(json!({ "peer": handle.remote })),
        Err(e) => err_response(ControlError::Internal(e.to_string())),
    }
}
