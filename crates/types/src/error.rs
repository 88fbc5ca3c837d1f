// Path: crates/types/src/error.rs

//! Core error types for the clawchat gateway.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised by the identity store and attestation machinery.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No identity file exists at the expected location.
    #[error("No identity found")]
    NotFound,
    /// The passphrase was wrong or the file is corrupt; the two cases are
    /// indistinguishable by construction of the AEAD.
    #[error("Bad passphrase or corrupt identity file")]
    BadPassphrase,
    /// The passphrase does not meet the minimum length.
    #[error("Passphrase must be at least {min} characters")]
    WeakPassphrase { min: usize },
    /// The identity file carries a version this build cannot read.
    #[error("Unsupported identity file version: {0}")]
    UnsupportedVersion(u8),
    /// An identity already exists where a new one would be written.
    #[error("Identity already exists: {0}")]
    AlreadyExists(String),
    /// The mnemonic failed validation.
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    /// The requested operation needs a feature this build lacks.
    #[error("Stacks identity support is not enabled in this build")]
    StacksDisabled,
    /// An attestation failed verification.
    #[error("Attestation invalid: {0}")]
    AttestationInvalid(String),
    /// Key material or a signature failed to parse or verify.
    #[error("Crypto error: {0}")]
    Crypto(String),
    /// Filesystem failure while reading or writing identity material.
    #[error("Identity storage I/O: {0}")]
    Io(String),
}

impl ErrorCode for IdentityError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "IDENTITY_NOT_FOUND",
            Self::BadPassphrase => "AUTH_BAD_PASSPHRASE",
            Self::WeakPassphrase { .. } => "AUTH_WEAK_PASSPHRASE",
            Self::UnsupportedVersion(_) => "IDENTITY_UNSUPPORTED_VERSION",
            Self::AlreadyExists(_) => "IDENTITY_EXISTS",
            Self::InvalidMnemonic(_) => "IDENTITY_BAD_MNEMONIC",
            Self::StacksDisabled => "CONFIG_STACKS_DISABLED",
            Self::AttestationInvalid(_) => "AUTH_ATTESTATION_INVALID",
            Self::Crypto(_) => "CRYPTO_ERROR",
            Self::Io(_) => "IDENTITY_IO",
        }
    }
}

/// Errors local to a transport connection or session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Dial failed: {0}")]
    Dial(String),
    #[error("Dial or handshake timed out")]
    Timeout,
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Record exceeds size limit ({got} > {max} bytes)")]
    Oversize { got: usize, max: usize },
    #[error("Node-key handshake failed: {0}")]
    Handshake(String),
    #[error("Unsupported multiaddr: {0}")]
    BadAddress(String),
    #[error("Transport is shutting down")]
    Closed,
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Dial(_) => "TRANSPORT_DIAL_FAILED",
            Self::Timeout => "TRANSPORT_TIMEOUT",
            Self::Stream(_) => "TRANSPORT_STREAM",
            Self::Oversize { .. } => "TRANSPORT_OVERSIZE",
            Self::Handshake(_) => "TRANSPORT_HANDSHAKE",
            Self::BadAddress(_) => "TRANSPORT_BAD_ADDRESS",
            Self::Closed => "TRANSPORT_CLOSED",
        }
    }
}

/// Protocol-level errors: malformed frames, bad versions, bad principals.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Unexpected frame {got} in phase {phase}")]
    UnexpectedFrame { got: String, phase: String },
    #[error("Peer attestation rejected: {0}")]
    AttestationRejected(String),
    #[error("Session closed by peer")]
    PeerClosed,
}

impl ErrorCode for ProtocolError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrincipal(_) => "PROTOCOL_BAD_PRINCIPAL",
            Self::MalformedFrame(_) => "PROTOCOL_MALFORMED_FRAME",
            Self::UnexpectedFrame { .. } => "PROTOCOL_UNEXPECTED_FRAME",
            Self::AttestationRejected(_) => "AUTH_ATTESTATION_INVALID",
            Self::PeerClosed => "PROTOCOL_PEER_CLOSED",
        }
    }
}

/// Errors in gateway configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Duplicate nick across autoloaded identities: {0}")]
    DuplicateNick(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CONFIG_NOT_FOUND",
            Self::Parse(_) => "CONFIG_PARSE",
            Self::Invalid(_) => "CONFIG_INVALID",
            Self::DuplicateNick(_) => "CONFIG_DUPLICATE_NICK",
        }
    }
}

/// Errors surfaced across the IPC boundary to control-plane callers.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No such identity: {0}")]
    NoSuchIdentity(String),
    #[error("No such peer: {0}")]
    NoSuchPeer(String),
    #[error("Recipient rejected: {0}")]
    BadRecipient(String),
    #[error("Not permitted: {0}")]
    Denied(String),
    #[error("Malformed request: {0}")]
    BadRequest(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0}")]
    Internal(String),
}

impl ErrorCode for ControlError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoSuchIdentity(_) => "IDENTITY_NOT_FOUND",
            Self::NoSuchPeer(_) => "PEER_NOT_FOUND",
            Self::BadRecipient(_) => "SEND_BAD_RECIPIENT",
            Self::Denied(_) => "AUTH_DENIED",
            Self::BadRequest(_) => "IPC_BAD_REQUEST",
            Self::UnknownCommand(_) => "IPC_UNKNOWN_COMMAND",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Mailbox persistence failures. Persistent write failure is fatal to the
/// daemon: data integrity overrides availability.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox read failed: {0}")]
    Read(String),
    #[error("Mailbox write failed after retries: {0}")]
    WriteFatal(String),
}

impl ErrorCode for MailboxError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read(_) => "MAILBOX_READ",
            Self::WriteFatal(_) => "MAILBOX_WRITE_FATAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(IdentityError::NotFound.code(), "IDENTITY_NOT_FOUND");
        assert_eq!(IdentityError::BadPassphrase.code(), "AUTH_BAD_PASSPHRASE");
        assert_eq!(TransportError::Timeout.code(), "TRANSPORT_TIMEOUT");
        assert_eq!(
            ProtocolError::PeerClosed.code(),
            "PROTOCOL_PEER_CLOSED"
        );
    }
}
