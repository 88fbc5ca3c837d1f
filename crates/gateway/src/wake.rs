// Path: crates/gateway/src/wake.rs

//! The external wake hook.
//!
//! Identities with `openclawWake` set get the external `openclaw` process
//! poked on every inbound delivery: "immediate" mode when the content
//! starts with an urgency prefix, "deferred" otherwise. The hook is
//! fire-and-forget with a five second kill; it must never affect message
//! delivery.

use claw_types::Message;
use tokio::time::{timeout, Duration};

const HOOK_TIMEOUT: Duration = Duration::from_secs(5);
const URGENT_PREFIXES: [&str; 3] = ["URGENT:", "ALERT:", "CRITICAL:"];

fn hook_command() -> String {
    std::env::var("CLAWCHAT_WAKE_CMD").unwrap_or_else(|_| "openclaw".to_string())
}

/// "immediate" for urgency-prefixed content (ASCII case-sensitive),
/// "deferred" otherwise.
pub fn mode_for(content: &str) -> &'static str {
    if URGENT_PREFIXES.iter().any(|p| content.starts_with(p)) {
        "immediate"
    } else {
        "deferred"
    }
}

/// Spawns the hook for a delivered message. Never blocks the caller.
pub fn spawn_hook(message: &Message) {
    let mode = mode_for(&message.content);
    let from = message.from.as_str().to_string();
    let to = message.to.as_str().to_string();
    let cmd = hook_command();
    tokio::spawn(async move {
        let child = tokio::process::Command::new(&cmd)
            .arg("wake")
            .arg("--mode")
            .arg(mode)
            .arg("--from")
            .arg(&from)
            .arg("--to")
            .arg(&to)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(target: "wake", event = "spawn_fail", cmd = %cmd, error = %e);
                return;
            }
        };
        match timeout(HOOK_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(target: "wake", event = "done", mode, success = status.success());
            }
            Ok(Err(e)) => {
                tracing::debug!(target: "wake", event = "wait_fail", error = %e);
            }
            Err(_) => {
                let _ = child.kill().await;
                tracing::debug!(target: "wake", event = "timeout", mode);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_prefixes_select_immediate_mode() {
        assert_eq!(mode_for("URGENT: disk full"), "immediate");
        assert_eq!(mode_for("ALERT: intruder"), "immediate");
        assert_eq!(mode_for("CRITICAL: meltdown"), "immediate");
        assert_eq!(mode_for("hello there"), "deferred");
        // ASCII case-sensitive: lowercase does not trigger.
        assert_eq!(mode_for("urgent: disk full"), "deferred");
        // The prefix must lead.
        assert_eq!(mode_for(" URGENT: nope"), "deferred");
    }
}
