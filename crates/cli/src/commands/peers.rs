// Path: crates/cli/src/commands/peers.rs

//! Peer book commands.

use crate::util;
use anyhow::Result;
use clap::{Parser, Subcommand};
use claw_types::ipc::Request;
use std::path::Path;

#[derive(Parser, Debug)]
pub struct PeersArgs {
    #[clap(subcommand)]
    pub command: PeersCommands,
}

#[derive(Subcommand, Debug)]
pub enum PeersCommands {
    /// List known peers with live connection state.
    List {
        #[clap(long = "as")]
        as_identity: Option<String>,
    },
    /// Add or merge a peer contact.
    Add {
        principal: String,
        /// Multiaddr, or legacy host:port.
        address: String,
        #[clap(long)]
        alias: Option<String>,
        #[clap(long = "as")]
        as_identity: Option<String>,
    },
    /// Remove a peer outright.
    Remove {
        principal: String,
        #[clap(long = "as")]
        as_identity: Option<String>,
    },
    /// Ask connected peers for a principal's current contact record.
    Resolve {
        principal: String,
        /// Only ask the session with this remote principal.
        #[clap(long)]
        through: Option<String>,
        #[clap(long = "as")]
        as_identity: Option<String>,
    },
}

pub async fn run(root: &Path, args: PeersArgs) -> Result<serde_json::Value> {
    let request = match args.command {
        PeersCommands::List { as_identity } => Request::Peers { as_identity },
        PeersCommands::Add {
            principal,
            address,
            alias,
            as_identity,
        } => Request::PeerAdd {
            principal,
            address,
            alias,
            as_identity,
        },
        PeersCommands::Remove {
            principal,
            as_identity,
        } => Request::PeerRemove {
            principal,
            as_identity,
        },
        PeersCommands::Resolve {
            principal,
            through,
            as_identity,
        } => Request::PeerResolve {
            principal,
            through,
            as_identity,
        },
    };
    util::ipc_call(root, &request).await
}
