// Path: crates/cli/src/commands/daemon.rs

//! Daemon lifecycle commands: spawn, probe, stop.

use crate::util;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use claw_types::ipc::Request;
use serde_json::json;
use std::path::Path;

#[derive(Parser, Debug)]
pub struct DaemonArgs {
    #[clap(subcommand)]
    pub command: DaemonCommands,
}

#[derive(Subcommand, Debug)]
pub enum DaemonCommands {
    /// Spawn `clawchatd` detached from this shell.
    Start {
        /// Listen port when no gateway config exists.
        #[clap(long, default_value_t = 4001)]
        p2p_port: u16,
    },
    /// Probe the daemon and report its status.
    Status,
    /// Ask the daemon to shut down cleanly.
    Stop,
}

pub async fn run(root: &Path, args: DaemonArgs) -> Result<serde_json::Value> {
    match args.command {
        DaemonCommands::Start { p2p_port } => {
            let exe = daemon_binary();
            let child = std::process::Command::new(&exe)
                .arg("--data-dir")
                .arg(root)
                .arg("--p2p-port")
                .arg(p2p_port.to_string())
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
                .with_context(|| format!("spawning {exe}"))?;
            Ok(json!({ "started": true, "pid": child.id() }))
        }
        DaemonCommands::Status => match util::ipc_call(root, &Request::Status { as_identity: None }).await {
            Ok(mut status) => {
                if let Some(obj) = status.as_object_mut() {
                    obj.insert("running".into(), json!(true));
                }
                Ok(status)
            }
            Err(_) => Ok(json!({ "running": false })),
        },
        DaemonCommands::Stop => {
            util::ipc_call(root, &Request::Stop).await?;
            Ok(json!({ "stopped": true }))
        }
    }
}

/// The daemon binary: a sibling of this executable when present (cargo
/// layouts), else whatever `clawchatd` resolves to on PATH.
fn daemon_binary() -> String {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("clawchatd");
            if sibling.exists() {
                return sibling.display().to_string();
            }
        }
    }
    "clawchatd".to_string()
}
