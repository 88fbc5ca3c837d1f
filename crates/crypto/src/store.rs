// Path: crates/crypto/src/store.rs

//! Encrypted at-rest storage for identities.
//!
//! File format:
//! [ Version: u8 (2 or 3) ]
//! [ Salt: 16B ]
//! [ Nonce: 12B ]
//! [ Ciphertext + Tag: N + 16 ]
//!
//! The key is Argon2id of the passphrase with the stored salt; the
//! ciphertext is ChaCha20-Poly1305 over the canonical JSON identity
//! document. Version 3 is written; version 2 (the previous, lighter work
//! factor) is still read. Files are owner read/write only.
//!
//! The store's root directory is explicit configuration: tests run several
//! stores side by side in one process.

use crate::identity::{Identity, IdentityDocument};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use claw_types::error::IdentityError;
use claw_types::Principal;
use rand::RngCore;
use std::fs;
use std::path::{Path, PathBuf};

const VERSION_CURRENT: u8 = 3;
const VERSION_LEGACY: u8 = 2;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;
const KEY_LEN: usize = 32;
const MIN_PASSPHRASE_LEN: usize = 12;

const IDENTITY_FILE: &str = "identity.enc";
const IDENTITIES_DIR: &str = "identities";

/// Argon2id cost parameters per format version, `(memory KiB, iterations,
/// lanes)`.
#[cfg(not(any(test, feature = "test-constants")))]
fn kdf_params(version: u8) -> (u32, u32, u32) {
    match version {
        VERSION_LEGACY => (64 * 1024, 3, 4),
        _ => (128 * 1024, 3, 4),
    }
}

#[cfg(any(test, feature = "test-constants"))]
fn kdf_params(_version: u8) -> (u32, u32, u32) {
    (8 * 1024, 1, 1)
}

/// Filesystem-backed identity storage under one data-directory root.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    root: PathBuf,
}

impl IdentityStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a principal's identity file and mailboxes.
    pub fn identity_dir(&self, principal: &Principal) -> PathBuf {
        self.root.join(IDENTITIES_DIR).join(principal.as_str())
    }

    fn identity_file(&self, principal: &Principal) -> PathBuf {
        self.identity_dir(principal).join(IDENTITY_FILE)
    }

    /// Path of the legacy single-identity layout (files at the root).
    fn legacy_file(&self) -> PathBuf {
        self.root.join(IDENTITY_FILE)
    }

    pub fn exists(&self, principal: &Principal) -> bool {
        self.identity_file(principal).exists()
    }

    /// Principals with an identity file on disk, plus the legacy slot.
    pub fn list(&self) -> Vec<Principal> {
        let mut out = Vec::new();
        let dir = self.root.join(IDENTITIES_DIR);
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if let Some(name) = name.to_str() {
                    if let Ok(p) = Principal::parse(name) {
                        if self.exists(&p) {
                            out.push(p);
                        }
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Encrypts and writes an identity. Fails if one already exists for the
    /// principal unless `overwrite` is set (nick changes re-encrypt).
    pub fn save(
        &self,
        identity: &Identity,
        passphrase: &str,
        overwrite: bool,
    ) -> Result<(), IdentityError> {
        if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
            return Err(IdentityError::WeakPassphrase {
                min: MIN_PASSPHRASE_LEN,
            });
        }
        let principal = identity.principal();
        let path = self.identity_file(&principal);
        if path.exists() && !overwrite {
            return Err(IdentityError::AlreadyExists(principal.as_str().to_string()));
        }
        fs::create_dir_all(self.identity_dir(&principal))
            .map_err(|e| IdentityError::Io(e.to_string()))?;

        let doc = identity.to_document();
        let plaintext =
            serde_json::to_vec(&doc).map_err(|e| IdentityError::Crypto(e.to_string()))?;
        let blob = encrypt_blob(&plaintext, passphrase)?;
        write_owner_only(&path, &blob)
    }

    /// Loads and decrypts an identity by principal.
    pub fn load(&self, principal: &Principal, passphrase: &str) -> Result<Identity, IdentityError> {
        self.load_file(&self.identity_file(principal), passphrase)
    }

    /// Loads the legacy single-identity layout, if present.
    pub fn load_legacy(&self, passphrase: &str) -> Result<Identity, IdentityError> {
        self.load_file(&self.legacy_file(), passphrase)
    }

    fn load_file(&self, path: &Path, passphrase: &str) -> Result<Identity, IdentityError> {
        let blob = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IdentityError::NotFound)
            }
            Err(e) => return Err(IdentityError::Io(e.to_string())),
        };
        let plaintext = decrypt_blob(&blob, passphrase)?;
        let doc: IdentityDocument = serde_json::from_slice(&plaintext)
            .map_err(|_| IdentityError::BadPassphrase)?;
        Identity::from_document(&doc)
    }

    /// Deletes an identity's whole storage directory.
    pub fn delete(&self, principal: &Principal) -> Result<(), IdentityError> {
        let dir = self.identity_dir(principal);
        if !dir.exists() {
            return Err(IdentityError::NotFound);
        }
        fs::remove_dir_all(dir).map_err(|e| IdentityError::Io(e.to_string()))
    }
}

fn derive_key(passphrase: &str, salt: &[u8], version: u8) -> Result<[u8; KEY_LEN], IdentityError> {
    let (mem_kib, iters, lanes) = kdf_params(version);
    let params = Params::new(mem_kib, iters, lanes, Some(KEY_LEN))
        .map_err(|e| IdentityError::Crypto(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| IdentityError::Crypto(e.to_string()))?;
    Ok(key)
}

fn encrypt_blob(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, IdentityError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt, VERSION_CURRENT)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| IdentityError::Crypto("encryption failed".into()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.push(VERSION_CURRENT);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_blob(blob: &[u8], passphrase: &str) -> Result<Vec<u8>, IdentityError> {
    if blob.len() < HEADER_LEN + 16 {
        return Err(IdentityError::BadPassphrase);
    }
    let version = blob[0];
    if version != VERSION_CURRENT && version != VERSION_LEGACY {
        return Err(IdentityError::UnsupportedVersion(version));
    }
    let salt = &blob[1..1 + SALT_LEN];
    let nonce = &blob[1 + SALT_LEN..HEADER_LEN];
    let ciphertext = &blob[HEADER_LEN..];

    let key = derive_key(passphrase, salt, version)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| IdentityError::BadPassphrase)
}

#[cfg(unix)]
fn write_owner_only(path: &Path, data: &[u8]) -> Result<(), IdentityError> {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, data).map_err(|e| IdentityError::Io(e.to_string()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| IdentityError::Io(e.to_string()))
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, data: &[u8]) -> Result<(), IdentityError> {
    fs::write(path, data).map_err(|e| IdentityError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASS: &str = "correct horse battery";

    fn store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_load_round_trip() {
        let (_dir, store) = store();
        let id = Identity::create_local(Some("alice".into()));
        store.save(&id, PASS, false).unwrap();

        let loaded = store.load(&id.principal(), PASS).unwrap();
        assert_eq!(loaded.principal(), id.principal());
        assert_eq!(loaded.nick(), Some("alice"));
    }

    #[test]
    fn wrong_passphrase_is_distinct_from_missing() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();

        assert!(matches!(
            store.load(&id.principal(), "not the passphrase"),
            Err(IdentityError::BadPassphrase)
        ));
        let other = Identity::create_local(None);
        assert!(matches!(
            store.load(&other.principal(), PASS),
            Err(IdentityError::NotFound)
        ));
    }

    #[test]
    fn short_passphrases_are_rejected() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        assert!(matches!(
            store.save(&id, "short", false),
            Err(IdentityError::WeakPassphrase { .. })
        ));
    }

    #[test]
    fn double_save_requires_overwrite() {
        let (_dir, store) = store();
        let mut id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();
        assert!(matches!(
            store.save(&id, PASS, false),
            Err(IdentityError::AlreadyExists(_))
        ));
        id.set_nick(Some("renamed".into()));
        store.save(&id, PASS, true).unwrap();
        assert_eq!(store.load(&id.principal(), PASS).unwrap().nick(), Some("renamed"));
    }

    #[test]
    fn tampered_blob_fails_closed() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();

        let path = store.identity_file(&id.principal());
        let mut blob = fs::read(&path).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        fs::write(&path, &blob).unwrap();

        assert!(matches!(
            store.load(&id.principal(), PASS),
            Err(IdentityError::BadPassphrase)
        ));
    }

    #[test]
    fn legacy_version_byte_is_accepted() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();

        // Rewrite the blob as a version-2 file. Test KDF params are
        // version-independent, so only the header byte changes.
        let path = store.identity_file(&id.principal());
        let mut blob = fs::read(&path).unwrap();
        blob[0] = VERSION_LEGACY;
        fs::write(&path, &blob).unwrap();

        let loaded = store.load(&id.principal(), PASS).unwrap();
        assert_eq!(loaded.principal(), id.principal());
    }

    #[test]
    fn unknown_version_byte_is_rejected() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();

        let path = store.identity_file(&id.principal());
        let mut blob = fs::read(&path).unwrap();
        blob[0] = 9;
        fs::write(&path, &blob).unwrap();

        assert!(matches!(
            store.load(&id.principal(), PASS),
            Err(IdentityError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn list_enumerates_saved_identities() {
        let (_dir, store) = store();
        let a = Identity::create_local(None);
        let b = Identity::create_local(None);
        store.save(&a, PASS, false).unwrap();
        store.save(&b, PASS, false).unwrap();
        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a.principal()));
        assert!(listed.contains(&b.principal()));
    }

    #[test]
    fn legacy_layout_is_readable() {
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        let doc = id.to_document();
        let plaintext = serde_json::to_vec(&doc).unwrap();
        let blob = encrypt_blob(&plaintext, PASS).unwrap();
        fs::write(store.root().join("identity.enc"), blob).unwrap();

        let loaded = store.load_legacy(PASS).unwrap();
        assert_eq!(loaded.principal(), id.principal());
    }

    #[cfg(unix)]
    #[test]
    fn identity_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        let id = Identity::create_local(None);
        store.save(&id, PASS, false).unwrap();
        let mode = fs::metadata(store.identity_file(&id.principal()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
