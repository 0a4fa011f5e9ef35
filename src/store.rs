//! The persistent message store: an append-only log giving bearerbox crash
//! recovery and at-least-once delivery. Every SMS is saved before it is
//! routed; an ack record retires it. On restart, replaying the log yields
//! exactly the messages that were saved but never acked.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::message::{Ack, Message, NackReason, Sms};

/// Split an in-memory buffer of concatenated length-prefixed frames into
/// their bodies. Stops (without erroring) at a truncated trailing record,
/// which is how a crash mid-append shows up in the log.
fn split_frames(mut buf: &[u8]) -> Vec<&[u8]> {
    let mut bodies = Vec::new();
    loop {
        if buf.len() < 4 {
            break;
        }
        let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        if buf.len() < 4 + len {
            break;
        }
        bodies.push(&buf[4..4 + len]);
        buf = &buf[4 + len..];
    }
    bodies
}

/// A handle onto the on-disk append-only store. Exactly one writer task
/// owns the file at a time via the internal mutex (the store mutex), and
/// that mutex is never held across another component's lock.
pub struct MessageStore {
    path: PathBuf,
    file: Mutex<File>,
    next_id: AtomicU64,
}

impl MessageStore {
    /// Open (creating if absent) the store log at `path` for appending, without replay.
    pub async fn init(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;
        Ok(MessageStore {
            path,
            file: Mutex::new(file),
            next_id: AtomicU64::new(1),
        })
    }

    /// Open the store and replay its log, returning every `Sms` that was
    /// saved but never acked. Advances the id counter past the highest id
    /// seen so new messages never collide with replayed ones.
    pub async fn init_and_load(path: impl AsRef<Path>) -> Result<(Arc<Self>, Vec<Sms>), StoreError> {
        let store = Self::init(path).await?;
        let pending = store.load().await?;
        Ok((Arc::new(store), pending))
    }

    /// Replay the log from disk, returning pending (un-acked) messages.
    pub async fn load(&self) -> Result<Vec<Sms>, StoreError> {
        let raw = fs::read(&self.path).await?;
        let mut pending: Vec<Sms> = Vec::new();
        let mut max_id: u64 = 0;

        for body in split_frames(&raw) {
            match Message::decode_body(body) {
                Ok(Message::Sms(sms)) => {
                    max_id = max_id.max(sms.id);
                    pending.push(sms);
                }
                Ok(Message::Ack(ack)) => {
                    max_id = max_id.max(ack.id);
                    pending.retain(|s| s.id != ack.id);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }

        self.next_id.store(max_id + 1, Ordering::SeqCst);
        info!(pending = pending.len(), "replayed message store");
        Ok(pending)
    }

    /// Persist `sms`, assigning it a fresh id on first save (id 0 means unassigned).
    pub async fn save(&self, sms: &mut Sms) -> Result<(), StoreError> {
        if sms.id == 0 {
            sms.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        let frame = Message::Sms(sms.clone()).encode();
        let mut file = self.file.lock().await;
        file.write_all(&frame).await?;
        file.flush().await?;
        debug!(sms_id = sms.id, "saved message to store");
        Ok(())
    }

    /// Record that `id` reached a terminal state, retiring it from future replay.
    pub async fn save_ack(&self, id: u64, nack_reason: NackReason) -> Result<(), StoreError> {
        let ack = Ack {
            id,
            time: current_unix_time(),
            nack_reason,
        };
        let frame = Message::Ack(ack).encode();
        let mut file = self.file.lock().await;
        file.write_all(&frame).await?;
        file.flush().await?;
        debug!(sms_id = id, "saved ack to store");
        Ok(())
    }

    /// Return a snapshot of currently pending messages without disturbing the log.
    pub async fn dump(&self) -> Result<Vec<Sms>, StoreError> {
        self.load().await
    }

    /// Compact the log to contain only pending messages, atomically via a
    /// temp-file-then-rename swap so a crash mid-compaction never corrupts
    /// the store: the old file remains valid until the rename completes.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let pending = self.load().await?;
        let tmp_path = self.path.with_extension("compact.tmp");

        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            for sms in &pending {
                let frame = Message::Sms(sms.clone()).encode();
                tmp.write_all(&frame).await?;
            }
            tmp.flush().await?;
        }

        let mut file = self.file.lock().await;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::CompactionFailed(e.to_string()))?;
        *file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)
            .await?;
        info!(remaining = pending.len(), "compacted message store");
        Ok(())
    }

    /// Flush and release the store file. After this call the store must not be used.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        Ok(())
    }
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_sms() -> Sms {
        Sms {
            sender: Some(b"100".to_vec()),
            receiver: Some(b"200".to_vec()),
            msgdata: Some(b"hello".to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn save_assigns_id_once() {
        let dir = tempdir().unwrap();
        let store = MessageStore::init(dir.path().join("s.log")).await.unwrap();
        let mut sms = sample_sms();
        store.save(&mut sms).await.unwrap();
        assert_ne!(sms.id, 0);
        let first_id = sms.id;
        store.save(&mut sms).await.unwrap();
        assert_eq!(sms.id, first_id);
    }

    #[tokio::test]
    async fn restart_replays_unacked_messages_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.log");

        let store = MessageStore::init(&path).await.unwrap();
        let mut sms_a = sample_sms();
        let mut sms_b = sample_sms();
        store.save(&mut sms_a).await.unwrap();
        store.save(&mut sms_b).await.unwrap();
        store.save_ack(sms_a.id, NackReason::None).await.unwrap();
        store.shutdown().await.unwrap();
        drop(store);

        let (_reopened, pending) = MessageStore::init_and_load(&path).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, sms_b.id);
    }

    #[tokio::test]
    async fn empty_store_replays_to_empty() {
        let dir = tempdir().unwrap();
        let (_store, pending) = MessageStore::init_and_load(dir.path().join("s.log"))
            .await
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn compact_drops_acked_entries_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.log");
        let store = MessageStore::init(&path).await.unwrap();
        let mut sms_a = sample_sms();
        let mut sms_b = sample_sms();
        store.save(&mut sms_a).await.unwrap();
        store.save(&mut sms_b).await.unwrap();
        store.save_ack(sms_a.id, NackReason::None).await.unwrap();

        store.compact().await.unwrap();
        let pending = store.dump().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, sms_b.id);
    }
}
