// Path: crates/cli/src/main.rs
#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # clawchat CLI
//!
//! Thin front end over the daemon's control socket, plus the offline
//! identity and gateway-config management commands. Every invocation
//! prints exactly one JSON value on stdout and exits 0 on success,
//! nonzero on error.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::*;

#[derive(Parser, Debug)]
#[clap(
    name = "clawchat",
    version,
    about = "Peer-to-peer, end-to-end encrypted messaging for autonomous agents."
)]
struct Cli {
    /// Data directory (default: $CLAWCHAT_HOME, else ~/.clawchat).
    #[clap(long, global = true)]
    data_dir: Option<std::path::PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, recover and manage identities.
    Identity(identity::IdentityArgs),

    /// Manage the multi-identity gateway configuration.
    Gateway(gateway::GatewayArgs),

    /// Start, query and stop the daemon.
    Daemon(daemon::DaemonArgs),

    /// Send a message.
    Send(msg::SendArgs),

    /// Receive messages, optionally long-polling.
    Recv(msg::RecvArgs),

    /// Show the inbox.
    Inbox(msg::InboxArgs),

    /// Show the outbox.
    Outbox(msg::OutboxArgs),

    /// Manage the peer book.
    Peers(peers::PeersArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let root = util::resolve_root(cli.data_dir.clone());
    let outcome: Result<serde_json::Value> = match cli.command {
        Commands::Identity(args) => identity::run(&root, args),
        Commands::Gateway(args) => gateway::run(&root, args),
        Commands::Daemon(args) => daemon::run(&root, args).await,
        Commands::Send(args) => msg::send(&root, args).await,
        Commands::Recv(args) => msg::recv(&root, args).await,
        Commands::Inbox(args) => msg::inbox(&root, args).await,
        Commands::Outbox(args) => msg::outbox(&root, args).await,
        Commands::Peers(args) => peers::run(&root, args).await,
    };
    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        }
        Err(e) => {
            println!(
                "{}",
                serde_json::json!({ "error": e.to_string() })
            );
            std::process::exit(1);
        }
    }
}
