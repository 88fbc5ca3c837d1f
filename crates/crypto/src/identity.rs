// Path: crates/crypto/src/identity.rs

//! Identity key material and mode-dispatched signing.
//!
//! Dispatch over the identity mode is a tagged-enum concern: signing and
//! verification are pure functions selected by the variant, not an
//! inheritance hierarchy.

use claw_types::error::IdentityError;
use claw_types::{IdentityMode, Principal};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// The canonical JSON object stored (encrypted) in `identity.enc`.
/// No `Debug`: half these fields are key material.
#[derive(Clone, Serialize, Deserialize, zeroize::ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    #[zeroize(skip)]
    pub principal: String,
    /// Stacks address without the principal prefix; empty in local mode.
    #[serde(default)]
    #[zeroize(skip)]
    pub address: String,
    /// Hex of the node/identity Ed25519 public key.
    #[zeroize(skip)]
    pub public_key: String,
    /// Hex of the node/identity Ed25519 secret key.
    pub private_key: String,
    /// BIP39 phrase; empty in local mode. Lives only inside the AEAD envelope.
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub wallet_public_key_hex: String,
    #[serde(default)]
    pub wallet_private_key_hex: String,
    #[serde(default)]
    #[zeroize(skip)]
    pub testnet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub nick: Option<String>,
    #[zeroize(skip)]
    pub mode: IdentityMode,
}

/// A `local:` identity: one Ed25519 pair doubles as identity and node key.
#[derive(Clone)]
pub struct LocalIdentity {
    pub signing: SigningKey,
    pub nick: Option<String>,
}

/// A `stacks:` identity: BIP39-derived secp256k1 wallet pair for
/// attestations plus a distinct Ed25519 node key for transport.
#[cfg(feature = "stacks")]
#[derive(Clone)]
pub struct StacksIdentity {
    pub node: SigningKey,
    pub wallet: crate::stacks::Wallet,
    pub mnemonic: String,
    pub address: String,
    pub testnet: bool,
    pub nick: Option<String>,
}

/// A loaded identity, tagged by mode.
#[derive(Clone)]
pub enum Identity {
    Local(LocalIdentity),
    #[cfg(feature = "stacks")]
    Stacks(StacksIdentity),
}

impl Identity {
    /// Generates a fresh `local:` identity.
    pub fn create_local(nick: Option<String>) -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        Identity::Local(LocalIdentity { signing, nick })
    }

    /// Generates a fresh `stacks:` identity. Returns the identity and its
    /// 24-word mnemonic; the phrase is handed to the caller exactly once.
    #[cfg(feature = "stacks")]
    pub fn create_stacks(
        testnet: bool,
        nick: Option<String>,
    ) -> Result<(Self, String), IdentityError> {
        let (phrase, wallet) = crate::stacks::generate_wallet();
        let address = crate::stacks::address(&wallet.public_key(), testnet);
        let identity = Identity::Stacks(StacksIdentity {
            node: SigningKey::generate(&mut OsRng),
            wallet,
            mnemonic: phrase.clone(),
            address,
            testnet,
            nick,
        });
        Ok((identity, phrase))
    }

    #[cfg(not(feature = "stacks"))]
    pub fn create_stacks(
        _testnet: bool,
        _nick: Option<String>,
    ) -> Result<(Self, String), IdentityError> {
        Err(IdentityError::StacksDisabled)
    }

    #[cfg(not(feature = "stacks"))]
    pub fn recover_stacks(
        _mnemonic: &str,
        _testnet: bool,
        _nick: Option<String>,
    ) -> Result<Self, IdentityError> {
        Err(IdentityError::StacksDisabled)
    }

    /// Rebuilds a `stacks:` identity from its 24-word mnemonic.
    #[cfg(feature = "stacks")]
    pub fn recover_stacks(
        mnemonic: &str,
        testnet: bool,
        nick: Option<String>,
    ) -> Result<Self, IdentityError> {
        let wallet = crate::stacks::wallet_from_mnemonic(mnemonic)?;
        let address = crate::stacks::address(&wallet.public_key(), testnet);
        Ok(Identity::Stacks(StacksIdentity {
            node: SigningKey::generate(&mut OsRng),
            wallet,
            mnemonic: mnemonic.to_string(),
            address,
            testnet,
            nick,
        }))
    }

    pub fn mode(&self) -> IdentityMode {
        match self {
            Identity::Local(_) => IdentityMode::Local,
            #[cfg(feature = "stacks")]
            Identity::Stacks(_) => IdentityMode::Stacks,
        }
    }

    pub fn principal(&self) -> Principal {
        match self {
            Identity::Local(id) => {
                Principal::local_from_key(&id.signing.verifying_key().to_bytes())
            }
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => Principal::stacks_from_address(&id.address),
        }
    }

    pub fn nick(&self) -> Option<&str> {
        match self {
            Identity::Local(id) => id.nick.as_deref(),
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => id.nick.as_deref(),
        }
    }

    pub fn set_nick(&mut self, nick: Option<String>) {
        match self {
            Identity::Local(id) => id.nick = nick,
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => id.nick = nick,
        }
    }

    /// The Ed25519 key that terminates transport sessions for this identity.
    pub fn node_key(&self) -> &SigningKey {
        match self {
            Identity::Local(id) => &id.signing,
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => &id.node,
        }
    }

    /// Signs arbitrary bytes with the mode-selected identity key.
    ///
    /// Local: 64-byte Ed25519 signature by the identity key. Stacks:
    /// 65-byte recoverable secp256k1 signature by the wallet key over
    /// SHA-256 of the bytes.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, IdentityError> {
        match self {
            Identity::Local(id) => Ok(id.signing.sign(message).to_bytes().to_vec()),
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => crate::stacks::sign_recoverable(&id.wallet, message),
        }
    }

    /// Verifies a signature produced by [`Identity::sign`] against a bare
    /// principal, without any loaded key material.
    pub fn verify(principal: &Principal, message: &[u8], signature: &[u8]) -> Result<bool, IdentityError> {
        match principal.mode() {
            IdentityMode::Local => {
                let key = principal
                    .embedded_key()
                    .ok_or_else(|| IdentityError::Crypto("principal embeds no key".into()))?;
                let key = VerifyingKey::from_bytes(&key)
                    .map_err(|e| IdentityError::Crypto(e.to_string()))?;
                let sig_bytes: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| IdentityError::Crypto("bad signature length".into()))?;
                let sig = Signature::from_bytes(&sig_bytes);
                Ok(key.verify(message, &sig).is_ok())
            }
            IdentityMode::Stacks => {
                #[cfg(feature = "stacks")]
                {
                    let recovered =
                        crate::stacks::recover_address(message, signature, principal.suffix())?;
                    Ok(recovered == principal.suffix())
                }
                #[cfg(not(feature = "stacks"))]
                {
                    Err(IdentityError::StacksDisabled)
                }
            }
        }
    }

    /// Serializes to the on-disk document form.
    pub fn to_document(&self) -> IdentityDocument {
        match self {
            Identity::Local(id) => IdentityDocument {
                principal: self.principal().as_str().to_string(),
                address: String::new(),
                public_key: hex::encode(id.signing.verifying_key().to_bytes()),
                private_key: hex::encode(id.signing.to_bytes()),
                mnemonic: String::new(),
                wallet_public_key_hex: String::new(),
                wallet_private_key_hex: String::new(),
                testnet: false,
                nick: id.nick.clone(),
                mode: IdentityMode::Local,
            },
            #[cfg(feature = "stacks")]
            Identity::Stacks(id) => IdentityDocument {
                principal: self.principal().as_str().to_string(),
                address: id.address.clone(),
                public_key: hex::encode(id.node.verifying_key().to_bytes()),
                private_key: hex::encode(id.node.to_bytes()),
                mnemonic: id.mnemonic.clone(),
                wallet_public_key_hex: hex::encode(id.wallet.public_key()),
                wallet_private_key_hex: hex::encode(id.wallet.secret_bytes()),
                testnet: id.testnet,
                nick: id.nick.clone(),
                mode: IdentityMode::Stacks,
            },
        }
    }

    /// Rebuilds an identity from its document form.
    pub fn from_document(doc: &IdentityDocument) -> Result<Self, IdentityError> {
        let secret: [u8; 32] = hex::decode(&doc.private_key)
            .map_err(|e| IdentityError::Crypto(e.to_string()))?
            .try_into()
            .map_err(|_| IdentityError::Crypto("bad private key length".into()))?;
        let signing = SigningKey::from_bytes(&secret);
        match doc.mode {
            IdentityMode::Local => Ok(Identity::Local(LocalIdentity {
                signing,
                nick: doc.nick.clone(),
            })),
            IdentityMode::Stacks => {
                #[cfg(feature = "stacks")]
                {
                    let wallet =
                        crate::stacks::Wallet::from_secret_hex(&doc.wallet_private_key_hex)?;
                    Ok(Identity::Stacks(StacksIdentity {
                        node: signing,
                        wallet,
                        mnemonic: doc.mnemonic.clone(),
                        address: doc.address.clone(),
                        testnet: doc.testnet,
                        nick: doc.nick.clone(),
                    }))
                }
                #[cfg(not(feature = "stacks"))]
                {
                    Err(IdentityError::StacksDisabled)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_identity_round_trips_through_document() {
        let id = Identity::create_local(Some("alice".into()));
        let doc = id.to_document();
        assert_eq!(doc.mode, IdentityMode::Local);
        assert!(doc.mnemonic.is_empty());
        let back = Identity::from_document(&doc).unwrap();
        assert_eq!(back.principal(), id.principal());
        assert_eq!(back.nick(), Some("alice"));
    }

    #[test]
    fn local_sign_verify_round_trip() {
        let id = Identity::create_local(None);
        let sig = id.sign(b"hello mesh").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(Identity::verify(&id.principal(), b"hello mesh", &sig).unwrap());
        assert!(!Identity::verify(&id.principal(), b"tampered", &sig).unwrap());
    }

    #[test]
    fn local_verify_rejects_foreign_signature() {
        let a = Identity::create_local(None);
        let b = Identity::create_local(None);
        let sig = a.sign(b"payload").unwrap();
        assert!(!Identity::verify(&b.principal(), b"payload", &sig).unwrap());
    }

    #[cfg(feature = "stacks")]
    #[test]
    fn stacks_identity_round_trips_through_document() {
        let (id, phrase) = Identity::create_stacks(false, Some("bob".into())).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        let doc = id.to_document();
        assert_eq!(doc.mode, IdentityMode::Stacks);
        assert!(doc.principal.starts_with("stacks:SP"));
        let back = Identity::from_document(&doc).unwrap();
        assert_eq!(back.principal(), id.principal());
    }

    #[cfg(feature = "stacks")]
    #[test]
    fn stacks_sign_verify_round_trip() {
        let (id, _) = Identity::create_stacks(true, None).unwrap();
        assert!(id.principal().as_str().starts_with("stacks:ST"));
        let sig = id.sign(b"attest me").unwrap();
        assert_eq!(sig.len(), 65);
        assert!(Identity::verify(&id.principal(), b"attest me", &sig).unwrap());
        assert!(!Identity::verify(&id.principal(), b"other", &sig).unwrap());
    }

    #[cfg(feature = "stacks")]
    #[test]
    fn stacks_recovery_reproduces_the_wallet() {
        let (id, phrase) = Identity::create_stacks(false, None).unwrap();
        let recovered = Identity::recover_stacks(&phrase, false, None).unwrap();
        // Node keys are fresh on recovery; the wallet (and so the
        // principal) must be identical.
        assert_eq!(recovered.principal(), id.principal());
    }
}
