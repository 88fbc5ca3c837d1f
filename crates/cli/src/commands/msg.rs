// Path: crates/cli/src/commands/msg.rs

//! Message commands: send, recv, inbox, outbox.

use crate::util;
use anyhow::Result;
use clap::Parser;
use claw_types::ipc::Request;
use std::path::Path;

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Recipient principal.
    pub to: String,
    /// Message body.
    pub content: String,
    /// Identity to send as (principal or nick); default identity otherwise.
    #[clap(long = "as")]
    pub as_identity: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RecvArgs {
    /// Only messages with timestamp strictly greater than this (ms).
    #[clap(long)]
    pub since: Option<u64>,
    /// Long-poll budget in milliseconds.
    #[clap(long)]
    pub timeout: Option<u64>,
    #[clap(long = "as")]
    pub as_identity: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InboxArgs {
    #[clap(long = "as")]
    pub as_identity: Option<String>,
}

#[derive(Parser, Debug)]
pub struct OutboxArgs {
    #[clap(long = "as")]
    pub as_identity: Option<String>,
}

pub async fn send(root: &Path, args: SendArgs) -> Result<serde_json::Value> {
    util::ipc_call(
        root,
        &Request::Send {
            to: args.to,
            content: args.content,
            as_identity: args.as_identity,
        },
    )
    .await
}

pub async fn recv(root: &Path, args: RecvArgs) -> Result<serde_json::Value> {
    util::ipc_call(
        root,
        &Request::Recv {
            as_identity: args.as_identity,
            since: args.since,
            timeout: args.timeout,
        },
    )
    .await
}

pub async fn inbox(root: &Path, args: InboxArgs) -> Result<serde_json::Value> {
    util::ipc_call(
        root,
        &Request::Inbox {
            as_identity: args.as_identity,
        },
    )
    .await
}

pub async fn outbox(root: &Path, args: OutboxArgs) -> Result<serde_json::Value> {
    util::ipc_call(
        root,
        &Request::Outbox {
            as_identity: args.as_identity,
        },
    )
    .await
}
