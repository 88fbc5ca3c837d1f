// Path: crates/gateway/src/bin/clawchatd.rs
#![forbid(unsafe_code)]

//! The clawchat gateway daemon binary.
//!
//! Identity passphrases are taken from `CLAWCHAT_PASS` /
//! `CLAWCHAT_PASS_<NICK>`; service scripts export them before exec.

use anyhow::Result;
use clap::Parser;
use claw_gateway::{Daemon, DaemonOpts, Passphrases};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "clawchatd",
    version,
    about = "The clawchat gateway daemon: authenticated, end-to-end encrypted agent messaging."
)]
struct Opts {
    /// Data directory (default: $CLAWCHAT_HOME, else ~/.clawchat).
    #[clap(long)]
    data_dir: Option<PathBuf>,

    /// Listen port when no gateway config exists.
    #[clap(long, default_value_t = 4001)]
    p2p_port: u16,
}

fn default_root() -> PathBuf {
    if let Ok(home) = std::env::var("CLAWCHAT_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".clawchat")
}

#[tokio::main]
async fn main() -> Result<()> {
    claw_telemetry::init::init_tracing()?;
    let opts = Opts::parse();

    let root = opts.data_dir.unwrap_or_else(default_root);
    let daemon = Daemon::start(DaemonOpts {
        root,
        passphrases: Passphrases::Env,
        default_p2p_port: opts.p2p_port,
    })
    .await?;
    daemon.run().await
}
