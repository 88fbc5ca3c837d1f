// Path: crates/gateway/tests/bridge_e2e.rs

//! WebSocket bridge scenarios: token auth, command pass-through, events.

use claw_crypto::{Identity, IdentityStore};
use claw_gateway::{Daemon, DaemonOpts, Passphrases};
use claw_types::config::{GatewayConfig, IdentityConfig, WsBridgeConfig, ACL_WILDCARD};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const PASS: &str = "a passphrase twelve chars long";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_bridged(token: Option<&str>) -> (Daemon, tempfile::TempDir, u16) {
    let root = tempfile::tempdir().unwrap();
    let store = IdentityStore::new(root.path());
    let identity = Identity::create_local(Some("alice".into()));
    store.save(&identity, PASS, false).unwrap();
    let principal = identity.principal();

    let ws_port = free_port();
    let config = GatewayConfig {
        version: 1,
        p2p_port: 0,
        ws_bridge: Some(WsBridgeConfig {
            port: ws_port,
            token: token.map(str::to_string),
            static_dir: None,
        }),
        identities: vec![IdentityConfig {
            principal: principal.clone(),
            nick: Some("alice".into()),
            autoload: true,
            allow_local: false,
            allowed_remote_peers: vec![ACL_WILDCARD.to_string()],
            openclaw_wake: false,
        }],
    };
    config.save(&root.path().join("gateway-config.json")).unwrap();

    let mut passes = HashMap::new();
    passes.insert(principal, PASS.to_string());
    let daemon = Daemon::start(DaemonOpts {
        root: root.path().to_path_buf(),
        passphrases: Passphrases::Fixed(passes),
        default_p2p_port: 0,
    })
    .await
    .unwrap();
    (daemon, root, ws_port)
}

async fn next_json(
    socket: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
) -> Value {
    loop {
        match socket.next().await.expect("socket open").expect("frame") {
            WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn bridge_requires_the_configured_token() {
    let (daemon, _root, ws_port) = spawn_bridged(Some("sekrit")).await;
    let url = format!("ws://127.0.0.1:{ws_port}/ws");
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // Commands before auth are refused.
    socket
        .send(WsMessage::Text(json!({"type": "status"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "auth_fail");

    socket
        .send(WsMessage::Text(
            json!({"type": "auth", "token": "wrong"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "auth_fail");

    socket
        .send(WsMessage::Text(
            json!({"type": "auth", "token": "sekrit"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "auth_ok");

    socket
        .send(WsMessage::Text(
            json!({"type": "status", "id": 7}).to_string(),
        ))
        .await
        .unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "result");
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["ok"], true);
    assert!(reply["data"]["principal"]
        .as_str()
        .unwrap()
        .starts_with("local:"));

    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn empty_token_auto_authenticates() {
    let (daemon, _root, ws_port) = spawn_bridged(None).await;
    let url = format!("ws://127.0.0.1:{ws_port}/ws");
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    socket
        .send(WsMessage::Text(json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "pong");

    // Straight to commands, no auth round.
    socket
        .send(WsMessage::Text(
            json!({"type": "multiaddrs", "id": 1}).to_string(),
        ))
        .await
        .unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["ok"], true);
    assert!(reply["data"].as_array().unwrap()[0]
        .as_str()
        .unwrap()
        .starts_with("/ip4/"));

    daemon.stop().await.unwrap();
}
