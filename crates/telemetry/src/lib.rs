// Path: crates/telemetry/src/lib.rs
#![forbid(unsafe_code)]

//! Observability for the clawchat gateway: structured logging setup.

pub mod init;
