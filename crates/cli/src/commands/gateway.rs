// Path: crates/cli/src/commands/gateway.rs

//! Gateway configuration management (`gateway-config.json`).

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use claw_types::config::{GatewayConfig, IdentityConfig, WsBridgeConfig, ACL_WILDCARD};
use claw_types::Principal;
use serde_json::json;
use std::path::Path;

const CONFIG_FILE: &str = "gateway-config.json";

#[derive(Parser, Debug)]
pub struct GatewayArgs {
    #[clap(subcommand)]
    pub command: GatewayCommands,
}

#[derive(Subcommand, Debug)]
pub enum GatewayCommands {
    /// Write a fresh gateway config.
    Init {
        #[clap(long, default_value_t = 4001)]
        p2p_port: u16,
        /// Enable the WebSocket bridge on this port.
        #[clap(long)]
        ws_port: Option<u16>,
        /// Bridge auth token (empty means any client authenticates).
        #[clap(long)]
        ws_token: Option<String>,
    },
    /// Manage the identities the gateway hosts.
    Identity {
        #[clap(subcommand)]
        command: GatewayIdentityCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum GatewayIdentityCommands {
    /// Add an identity entry to the gateway config.
    Add {
        principal: String,
        #[clap(long)]
        nick: Option<String>,
        /// Allowed remote principals; repeatable. Defaults to "*".
        #[clap(long = "allow")]
        allowed: Vec<String>,
        /// Additionally admit any local: principal.
        #[clap(long)]
        allow_local: bool,
        /// Invoke the wake hook on inbound deliveries.
        #[clap(long)]
        wake: bool,
        /// Do not autoload this identity at daemon start.
        #[clap(long)]
        no_autoload: bool,
    },
    /// List configured identities.
    List,
}

pub fn run(root: &Path, args: GatewayArgs) -> Result<serde_json::Value> {
    let path = root.join(CONFIG_FILE);
    match args.command {
        GatewayCommands::Init {
            p2p_port,
            ws_port,
            ws_token,
        } => {
            if path.exists() {
                return Err(anyhow!("config already exists at {}", path.display()));
            }
            std::fs::create_dir_all(root)?;
            let config = GatewayConfig {
                version: 1,
                p2p_port,
                ws_bridge: ws_port.map(|port| WsBridgeConfig {
                    port,
                    token: ws_token,
                    static_dir: None,
                }),
                identities: Vec::new(),
            };
            config.save(&path).map_err(|e| anyhow!("{e}"))?;
            Ok(json!({ "created": path.display().to_string(), "p2pPort": p2p_port }))
        }
        GatewayCommands::Identity { command } => match command {
            GatewayIdentityCommands::Add {
                principal,
                nick,
                allowed,
                allow_local,
                wake,
                no_autoload,
            } => {
                let principal = Principal::parse(&principal).map_err(|e| anyhow!("{e}"))?;
                let mut config = GatewayConfig::load(&path).map_err(|e| anyhow!("{e}"))?;
                if config.identities.iter().any(|i| i.principal == principal) {
                    return Err(anyhow!("identity {principal} already configured"));
                }
                let allowed = if allowed.is_empty() {
                    vec![ACL_WILDCARD.to_string()]
                } else {
                    allowed
                };
                config.identities.push(IdentityConfig {
                    principal: principal.clone(),
                    nick,
                    autoload: !no_autoload,
                    allow_local,
                    allowed_remote_peers: allowed,
                    openclaw_wake: wake,
                });
                config.validate().map_err(|e| anyhow!("{e}"))?;
                config.save(&path).map_err(|e| anyhow!("{e}"))?;
                Ok(json!({ "added": principal }))
            }
            GatewayIdentityCommands::List => {
                let config = GatewayConfig::load(&path).map_err(|e| anyhow!("{e}"))?;
                Ok(serde_json::to_value(&config.identities)?)
            }
        },
    }
}
