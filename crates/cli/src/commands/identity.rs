// Path: crates/cli/src/commands/identity.rs

//! Identity lifecycle: create, recover, show, nick management.
//!
//! These commands work directly against the encrypted identity store and
//! never require a running daemon.

use crate::util;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use claw_crypto::{Identity, IdentityStore};
use claw_types::Principal;
use serde_json::json;
use std::path::Path;

#[derive(Parser, Debug)]
pub struct IdentityArgs {
    #[clap(subcommand)]
    pub command: IdentityCommands,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum Mode {
    Local,
    Stacks,
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommands {
    /// Generate a new identity and store it encrypted.
    Create {
        #[clap(long, value_enum, default_value = "local")]
        mode: Mode,
        #[clap(long)]
        nick: Option<String>,
        /// Stacks testnet addressing (stacks mode only).
        #[clap(long)]
        testnet: bool,
    },
    /// Rebuild a stacks identity from its 24-word mnemonic.
    Recover {
        /// The full 24-word phrase, quoted.
        #[clap(long)]
        mnemonic: String,
        #[clap(long)]
        nick: Option<String>,
        #[clap(long)]
        testnet: bool,
    },
    /// Decrypt and display an identity's public fields.
    Show {
        /// Principal to show; optional when exactly one identity exists.
        principal: Option<String>,
    },
    /// Set the display nick (re-encrypts the identity file).
    SetNick {
        nick: String,
        #[clap(long)]
        principal: Option<String>,
    },
    /// Clear the display nick.
    ClearNick {
        #[clap(long)]
        principal: Option<String>,
    },
}

pub fn run(root: &Path, args: IdentityArgs) -> Result<serde_json::Value> {
    let store = IdentityStore::new(root);
    match args.command {
        IdentityCommands::Create { mode, nick, testnet } => {
            let pass = util::passphrase(true)?;
            match mode {
                Mode::Local => {
                    let identity = Identity::create_local(nick);
                    store.save(&identity, &pass, false)?;
                    Ok(json!({
                        "principal": identity.principal(),
                        "nick": identity.nick(),
                        "mode": "local",
                    }))
                }
                Mode::Stacks => {
                    let (identity, mnemonic) = Identity::create_stacks(testnet, nick)?;
                    store.save(&identity, &pass, false)?;
                    // The phrase is shown exactly once and never persisted
                    // in plaintext.
                    Ok(json!({
                        "principal": identity.principal(),
                        "nick": identity.nick(),
                        "mode": "stacks",
                        "testnet": testnet,
                        "mnemonic": mnemonic,
                    }))
                }
            }
        }
        IdentityCommands::Recover { mnemonic, nick, testnet } => {
            let pass = util::passphrase(true)?;
            let identity = Identity::recover_stacks(&mnemonic, testnet, nick)?;
            store.save(&identity, &pass, false)?;
            Ok(json!({
                "principal": identity.principal(),
                "nick": identity.nick(),
                "mode": "stacks",
                "testnet": testnet,
            }))
        }
        IdentityCommands::Show { principal } => {
            let identity = load(&store, principal.as_deref())?;
            Ok(json!({
                "principal": identity.principal(),
                "nick": identity.nick(),
                "mode": identity.mode().to_string(),
            }))
        }
        IdentityCommands::SetNick { nick, principal } => {
            let pass = util::passphrase(false)?;
            let mut identity = load_with(&store, principal.as_deref(), &pass)?;
            identity.set_nick(Some(nick));
            store.save(&identity, &pass, true)?;
            Ok(json!({
                "principal": identity.principal(),
                "nick": identity.nick(),
            }))
        }
        IdentityCommands::ClearNick { principal } => {
            let pass = util::passphrase(false)?;
            let mut identity = load_with(&store, principal.as_deref(), &pass)?;
            identity.set_nick(None);
            store.save(&identity, &pass, true)?;
            Ok(json!({
                "principal": identity.principal(),
                "nick": null,
            }))
        }
    }
}

fn load(store: &IdentityStore, principal: Option<&str>) -> Result<Identity> {
    let pass = util::passphrase(false)?;
    load_with(store, principal, &pass)
}

fn load_with(store: &IdentityStore, principal: Option<&str>, pass: &str) -> Result<Identity> {
    let principal = match principal {
        Some(s) => Principal::parse(s).map_err(|e| anyhow!("{e}"))?,
        None => {
            let all = store.list();
            match all.len() {
                0 => return Ok(store.load_legacy(pass)?),
                1 => all.into_iter().next().unwrap_or_else(|| unreachable!()),
                n => {
                    return Err(anyhow!(
                        "{n} identities exist; pass --principal to pick one"
                    ))
                }
            }
        }
    };
    Ok(store.load(&principal, pass)?)
}
