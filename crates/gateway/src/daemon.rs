// Path: crates/gateway/src/daemon.rs

//! Daemon assembly and lifecycle.
//!
//! Startup: config, identities, transport, control socket, bridge,
//! tickers, `started` event. Shutdown (on `stop`, INT or TERM): stop
//! accepting, stop tickers, close sessions, remove the pid file and
//! control socket.

use crate::control;
use crate::delivery;
use crate::exchange;
use crate::identities::{self, IdentityEntry};
pub use crate::identities::Passphrases;
use crate::sessions;
use crate::state::{Gateway, GatewayState};
use anyhow::{anyhow, Context, Result};
use claw_crypto::IdentityStore;
use claw_network::Transport;
use claw_types::config::{GatewayConfig, IdentityConfig, ACL_WILDCARD};
use claw_types::ipc::Event;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const CONFIG_FILE: &str = "gateway-config.json";

/// How a daemon gets its bearings.
pub struct DaemonOpts {
    /// Data-directory root; explicit, never ambient.
    pub root: PathBuf,
    pub passphrases: Passphrases,
    /// Listen port when no gateway config exists (legacy layout).
    pub default_p2p_port: u16,
}

impl DaemonOpts {
    pub fn new(root: impl Into<PathBuf>, passphrases: Passphrases) -> Self {
        Self {
            root: root.into(),
            passphrases,
            default_p2p_port: 4001,
        }
    }
}

/// A running gateway daemon.
pub struct Daemon {
    gw: Gateway,
    handles: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub async fn start(opts: DaemonOpts) -> Result<Self> {
        std::fs::create_dir_all(&opts.root)
            .with_context(|| format!("creating data dir {}", opts.root.display()))?;
        let store = IdentityStore::new(&opts.root);

        let config_path = opts.root.join(CONFIG_FILE);
        let (config, entries) = if config_path.exists() {
            let config = GatewayConfig::load(&config_path)
                .map_err(|e| anyhow!("config error: {e}"))?;
            let entries = identities::load_all(&store, &config, &opts.passphrases)
                .map_err(|e| anyhow!("identity load failed: {e}"))?;
            (config, entries)
        } else {
            legacy_bootstrap(&store, &opts)?
        };
        if entries.is_empty() {
            return Err(anyhow!("config error: no autoload identities"));
        }

        let default_principal = config
            .default_identity()
            .map(|c| c.principal.clone())
            .unwrap_or_else(|| entries[0].identity.principal());
        let node_key = entries
            .iter()
            .find(|e| e.identity.principal() == default_principal)
            .unwrap_or(&entries[0])
            .identity
            .node_key()
            .clone();

        let (events, _) = broadcast::channel(256);
        let (shutdown, _) = watch::channel(false);

        let (transport, mut inbound) = Transport::bind(node_key, config.p2p_port)
            .await
            .map_err(|e| anyhow!("transport bind failed: {e}"))?;
        let listen_port = transport.port();
        let node_public_key = transport.node_public_key();

        let mut state = GatewayState::new(
            opts.root.clone(),
            config.clone(),
            node_public_key,
            listen_port,
            events.clone(),
        );
        for entry in entries {
            state.identities.insert(entry.identity.principal(), entry);
        }

        let gw = Gateway {
            state: Arc::new(Mutex::new(state)),
            transport: Arc::new(transport),
            events,
            shutdown: Arc::new(shutdown),
        };

        // Inbound connection pump.
        let mut handles = Vec::new();
        {
            let gw = gw.clone();
            let mut shutdown = gw.shutdown_signal();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                        conn = inbound.recv() => {
                            let Some(conn) = conn else { break };
                            let gw = gw.clone();
                            tokio::spawn(async move {
                                sessions::run_inbound(gw, conn).await;
                            });
                        }
                    }
                }
            }));
        }

        handles.push(
            control::start(gw.clone())
                .await
                .context("control socket bind failed")?,
        );

        if let Some(bridge_cfg) = config.ws_bridge.clone() {
            handles.push(
                crate::bridge::start(gw.clone(), bridge_cfg)
                    .await
                    .context("ws bridge bind failed")?,
            );
        }

        handles.push(delivery::spawn_retry(gw.clone()));
        handles.push(exchange::spawn_broadcast(gw.clone()));

        gw.with_state(|state| {
            state.emit(Event::Started {
                principal: default_principal.clone(),
            });
        });
        tracing::info!(
            target: "daemon",
            event = "started",
            principal = %default_principal,
            port = listen_port,
        );

        Ok(Self { gw, handles })
    }

    /// Handle for tests and in-process callers.
    pub fn gateway(&self) -> Gateway {
        self.gw.clone()
    }

    /// Blocks until a `stop` command or INT/TERM, then shuts down cleanly.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.gw.shutdown_signal();
        #[cfg(unix)]
        {
            let mut term =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .context("installing SIGTERM handler")?;
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::signal::ctrl_c() => self.gw.begin_shutdown(),
                _ = term.recv() => self.gw.begin_shutdown(),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::signal::ctrl_c() => self.gw.begin_shutdown(),
            }
        }
        self.finish().await
    }

    /// Programmatic stop, for tests.
    pub async fn stop(self) -> Result<()> {
        self.gw.begin_shutdown();
        self.finish().await
    }

    async fn finish(self) -> Result<()> {
        // Close every live session so peers observe the shutdown.
        let sessions = self.gw.with_state(|state| state.sessions.all());
        for s in &sessions {
            s.close();
        }
        // Give tasks a beat to observe the shutdown signal, then reap.
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        for handle in self.handles {
            handle.abort();
            let _ = handle.await;
        }
        // Dropping the inbound pump released the transport listener; let
        // its accept loop observe that so the port is free for a rebind.
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        let (sock, pid) = self.gw.with_state(|state| {
            (
                control::socket_path(&state.root),
                control::pid_path(&state.root),
            )
        });
        let _ = std::fs::remove_file(sock);
        let _ = std::fs::remove_file(pid);
        tracing::info!(target: "daemon", event = "stopped");
        Ok(())
    }
}

/// Boots from the legacy single-identity layout: `identity.enc` and
/// mailboxes at the data root, no gateway config file.
fn legacy_bootstrap(
    store: &IdentityStore,
    opts: &DaemonOpts,
) -> Result<(GatewayConfig, Vec<IdentityEntry>)> {
    let pass = opts
        .passphrases
        .lookup_any()
        .ok_or_else(|| anyhow!("no passphrase available for legacy identity"))?;
    let identity = store
        .load_legacy(&pass)
        .map_err(|e| anyhow!("legacy identity load failed: {e}"))?;
    let cfg = IdentityConfig {
        principal: identity.principal(),
        nick: identity.nick().map(str::to_string),
        autoload: true,
        allow_local: false,
        allowed_remote_peers: vec![ACL_WILDCARD.to_string()],
        openclaw_wake: false,
    };
    let config = GatewayConfig {
        version: 1,
        p2p_port: opts.default_p2p_port,
        ws_bridge: None,
        identities: vec![cfg.clone()],
    };
    let entry = identities::open_entry_at(store.root(), identity, cfg)
        .map_err(|e| anyhow!("legacy state open failed: {e}"))?;
    Ok((config, vec![entry]))
}
