// Path: crates/types/src/config.rs

//! Gateway configuration (`gateway-config.json`).

use crate::error::ConfigError;
use crate::principal::Principal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// The wildcard ACL element: permits every remote principal.
pub const ACL_WILDCARD: &str = "*";

/// Per-identity settings inside the gateway config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    pub principal: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    /// Load this identity when the daemon starts.
    #[serde(default = "default_true")]
    pub autoload: bool,
    /// Accept inbound messages from any `local:` principal, in addition to
    /// the explicit allow list.
    #[serde(default)]
    pub allow_local: bool,
    /// Allow list of remote principals, or the `"*"` wildcard element.
    #[serde(default)]
    pub allowed_remote_peers: Vec<String>,
    /// Invoke the external wake hook on inbound deliveries.
    #[serde(default)]
    pub openclaw_wake: bool,
}

fn default_true() -> bool {
    true
}

/// WebSocket bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsBridgeConfig {
    pub port: u16,
    /// Shared auth token. Empty or absent means any client auto-authenticates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Directory of static files to serve alongside the WebSocket endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
}

/// Process-wide gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub p2p_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_bridge: Option<WsBridgeConfig>,
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
}

fn default_version() -> u32 {
    1
}

impl GatewayConfig {
    /// Reads and validates the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let cfg: GatewayConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        let mut nicks = HashSet::new();
        for id in &self.identities {
            // Principal shape was already checked by the Principal
            // deserializer being transparent; re-check the prefix here so a
            // hand-edited file fails loudly.
            let p = id.principal.as_str();
            if !p.starts_with("local:") && !p.starts_with("stacks:") {
                return Err(ConfigError::Invalid(format!("bad principal: {p}")));
            }
            for allowed in &id.allowed_remote_peers {
                if allowed != ACL_WILDCARD && Principal::parse(allowed).is_err() {
                    return Err(ConfigError::Invalid(format!(
                        "bad allowed peer {allowed} for {p}"
                    )));
                }
            }
            if id.autoload {
                if let Some(nick) = &id.nick {
                    if !nicks.insert(nick.clone()) {
                        return Err(ConfigError::DuplicateNick(nick.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// The first autoloaded identity, which acts as the default.
    pub fn default_identity(&self) -> Option<&IdentityConfig> {
        self.identities.iter().find(|i| i.autoload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    fn identity(n: u8, nick: Option<&str>) -> IdentityConfig {
        IdentityConfig {
            principal: local(n),
            nick: nick.map(str::to_string),
            autoload: true,
            allow_local: false,
            allowed_remote_peers: vec![ACL_WILDCARD.to_string()],
            openclaw_wake: false,
        }
    }

    #[test]
    fn accepts_a_plain_config() {
        let cfg = GatewayConfig {
            version: 1,
            p2p_port: 19000,
            ws_bridge: None,
            identities: vec![identity(1, Some("alice")), identity(2, Some("bob"))],
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.default_identity().unwrap().principal, local(1));
    }

    #[test]
    fn rejects_duplicate_nicks() {
        let cfg = GatewayConfig {
            version: 1,
            p2p_port: 19000,
            ws_bridge: None,
            identities: vec![identity(1, Some("alice")), identity(2, Some("alice"))],
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateNick(_))
        ));
    }

    #[test]
    fn rejects_bad_allow_list_entries() {
        let mut id = identity(1, None);
        id.allowed_remote_peers = vec!["bogus".to_string()];
        let cfg = GatewayConfig {
            version: 1,
            p2p_port: 19000,
            ws_bridge: None,
            identities: vec![id],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json_with_camel_case() {
        let cfg = GatewayConfig {
            version: 1,
            p2p_port: 19000,
            ws_bridge: Some(WsBridgeConfig {
                port: 8080,
                token: Some("secret".into()),
                static_dir: None,
            }),
            identities: vec![identity(1, Some("alice"))],
        };
        let raw = serde_json::to_string(&cfg).unwrap();
        assert!(raw.contains("\"p2pPort\""));
        assert!(raw.contains("\"allowedRemotePeers\""));
        assert!(raw.contains("\"openclawWake\""));
        let back: GatewayConfig = serde_json::from_str(&raw).unwrap();
        back.validate().unwrap();
        assert_eq!(back.identities.len(), 1);
    }
}
