//! Best-effort persistent key-value store for conversation statuses.
//!
//! Entries never expire. Writes are flushed to a JSON file when one is
//! configured; a failed flush is logged and the in-memory value is kept.
//! Readers never wait on file I/O: the map lock is held only to update or
//! serialize entries, and flushes are ordered by a separate lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use painel_core::ConversationStatus;

pub fn status_key(channel_id: &str, conversation_id: &str) -> String {
    format!("conversation_status_{}_{}", channel_id, conversation_id)
}

pub struct LocalCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, String>>,
    flush_lock: Mutex<()>,
}

impl LocalCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
            flush_lock: Mutex::new(()),
        }
    }

    /// Open the cache file, starting empty if it is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding corrupt status cache");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read status cache");
                HashMap::new()
            }
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Status cache loaded");

        Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
        self.flush();
    }

    pub fn get_status(&self, channel_id: &str, conversation_id: &str) -> Option<ConversationStatus> {
        let key = status_key(channel_id, conversation_id);
        let value = self.get(&key)?;
        match value.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(key, error = %e, "Ignoring unrecognised cached status");
                None
            }
        }
    }

    pub fn set_status(&self, channel_id: &str, conversation_id: &str, status: ConversationStatus) {
        self.set(&status_key(channel_id, conversation_id), status.as_str());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a usable cache.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };

        // Snapshot under the flush lock so a later flush never writes older data.
        let _flushing = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = serde_json::to_vec_pretty(&*self.lock());

        let result = snapshot
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, bytes)
            });

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist status cache");
        }
    }
}
