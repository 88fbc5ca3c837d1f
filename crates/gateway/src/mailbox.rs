// Path: crates/gateway/src/mailbox.rs

//! Durable per-identity mailboxes.
//!
//! Each mailbox is one JSON array on disk, rewritten whole on every
//! change under the gateway state lock (single-writer discipline).
//! Arbitrary order on read is tolerated. A write that keeps failing is
//! fatal to the daemon: data integrity overrides availability.

use claw_types::error::MailboxError;
use claw_types::{Message, MessageStatus};
use std::path::PathBuf;

const WRITE_RETRIES: usize = 3;
const WRITE_RETRY_DELAY_MS: u64 = 100;

/// An in-memory mailbox mirrored to one JSON file.
#[derive(Debug)]
pub struct Mailbox {
    path: PathBuf,
    messages: Vec<Message>,
}

impl Mailbox {
    /// Opens a mailbox, reading any existing file. A missing file is an
    /// empty mailbox; a corrupt one is an error.
    pub fn open(path: PathBuf) -> Result<Self, MailboxError> {
        let messages = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| MailboxError::Read(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(MailboxError::Read(format!("{}: {e}", path.display()))),
        };
        Ok(Self { path, messages })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Appends and persists. A message whose id already exists is dropped
    /// silently (duplicate suppression); returns false in that case.
    pub fn append(&mut self, message: Message) -> Result<bool, MailboxError> {
        if self.contains(&message.id) {
            return Ok(false);
        }
        self.messages.push(message);
        self.persist()?;
        Ok(true)
    }

    /// Updates the status of one message and persists. Unknown ids are a
    /// no-op (the entry may have been administratively removed).
    pub fn set_status(&mut self, id: &str, status: MessageStatus) -> Result<(), MailboxError> {
        let mut changed = false;
        for m in &mut self.messages {
            if m.id == id && m.status != status {
                m.status = status;
                changed = true;
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    /// Snapshot of entries with the given status.
    pub fn with_status(&self, status: MessageStatus) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.status == status)
            .cloned()
            .collect()
    }

    /// Messages with timestamp strictly greater than `since`.
    pub fn since(&self, since: u64) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.timestamp > since)
            .cloned()
            .collect()
    }

    fn persist(&self) -> Result<(), MailboxError> {
        let bytes = serde_json::to_vec_pretty(&self.messages)
            .map_err(|e| MailboxError::WriteFatal(e.to_string()))?;
        let mut last_err = String::new();
        for attempt in 0..WRITE_RETRIES {
            if attempt > 0 {
                std::thread::sleep(std::time::Duration::from_millis(WRITE_RETRY_DELAY_MS));
            }
            match std::fs::write(&self.path, &bytes) {
                Ok(()) => return Ok(()),
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(MailboxError::WriteFatal(format!(
            "{}: {last_err}",
            self.path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_types::time::now_ms;
    use claw_types::Principal;

    fn p(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    fn msg(id: &str, ts: u64) -> Message {
        Message {
            id: id.to_string(),
            from: p(1),
            from_nick: None,
            to: p(2),
            content: "hi".into(),
            timestamp: ts,
            status: MessageStatus::Pending,
        }
    }

    #[test]
    fn append_persists_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.json");
        {
            let mut mb = Mailbox::open(path.clone()).unwrap();
            assert!(mb.append(msg("a1", now_ms())).unwrap());
        }
        let mb = Mailbox::open(path).unwrap();
        assert_eq!(mb.len(), 1);
        assert_eq!(mb.messages()[0].id, "a1");
    }

    #[test]
    fn duplicate_ids_are_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let mut mb = Mailbox::open(dir.path().join("inbox.json")).unwrap();
        assert!(mb.append(msg("dup", 1)).unwrap());
        assert!(!mb.append(msg("dup", 2)).unwrap());
        assert_eq!(mb.len(), 1);
        assert_eq!(mb.messages()[0].timestamp, 1);
    }

    #[test]
    fn status_transitions_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.json");
        let mut mb = Mailbox::open(path.clone()).unwrap();
        mb.append(msg("m1", 1)).unwrap();
        mb.set_status("m1", MessageStatus::Sent).unwrap();

        let reopened = Mailbox::open(path).unwrap();
        assert_eq!(reopened.messages()[0].status, MessageStatus::Sent);
        assert!(reopened.with_status(MessageStatus::Pending).is_empty());
    }

    #[test]
    fn since_filters_strictly() {
        let dir = tempfile::tempdir().unwrap();
        let mut mb = Mailbox::open(dir.path().join("inbox.json")).unwrap();
        mb.append(msg("m1", 100)).unwrap();
        mb.append(msg("m2", 200)).unwrap();
        let after = mb.since(100);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, "m2");
    }

    #[test]
    fn arbitrary_on_disk_order_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.json");
        let unordered = vec![msg("late", 500), msg("early", 1)];
        std::fs::write(&path, serde_json::to_vec(&unordered).unwrap()).unwrap();
        let mb = Mailbox::open(path).unwrap();
        assert_eq!(mb.len(), 2);
        assert_eq!(mb.since(400).len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_wipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.json");
        std::fs::write(&path, b"{{{").unwrap();
        assert!(Mailbox::open(path).is_err());
    }
}
