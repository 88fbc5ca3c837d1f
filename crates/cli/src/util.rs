// Path: crates/cli/src/util.rs

//! Shared CLI plumbing: data-root resolution, passphrase acquisition and
//! the IPC client.

use anyhow::{anyhow, Context, Result};
use claw_types::ipc::{Request, Response};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Resolves the data directory: flag, then `CLAWCHAT_HOME`, then
/// `~/.clawchat`.
pub fn resolve_root(flag: Option<PathBuf>) -> PathBuf {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(home) = std::env::var("CLAWCHAT_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".clawchat")
}

/// Reads a passphrase: `CLAWCHAT_PASS` when set, otherwise an interactive
/// prompt on stderr (stdout carries only JSON).
pub fn passphrase(confirm: bool) -> Result<String> {
    if let Ok(p) = std::env::var("CLAWCHAT_PASS") {
        return Ok(p);
    }
    eprint!("Passphrase: ");
    let pass = rpassword::read_password().context("reading passphrase")?;
    if confirm {
        eprint!("Confirm passphrase: ");
        let again = rpassword::read_password().context("reading confirmation")?;
        if pass != again {
            return Err(anyhow!("passphrases do not match"));
        }
    }
    Ok(pass)
}

/// Sends one request to the daemon and returns its data payload, mapping
/// `{ok:false}` to an error.
pub async fn ipc_call(root: &Path, request: &Request) -> Result<serde_json::Value> {
    let response = ipc_call_raw(root, request).await?;
    if response.ok {
        Ok(response.data.unwrap_or(serde_json::Value::Null))
    } else {
        Err(anyhow!(
            "{}",
            response.error.unwrap_or_else(|| "daemon error".to_string())
        ))
    }
}

/// Sends one request and returns the raw response line.
pub async fn ipc_call_raw(root: &Path, request: &Request) -> Result<Response> {
    let sock = root.join("clawchat.sock");
    let stream = UnixStream::connect(&sock)
        .await
        .with_context(|| format!("daemon not reachable at {}", sock.display()))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    write_half.write_all(line.as_bytes()).await?;

    let mut reader = BufReader::new(read_half).lines();
    let reply = reader
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("daemon closed the connection"))?;
    serde_json::from_str(&reply).context("malformed daemon response")
}
