//! Export state store: the persisted per-post record that makes full
//! exports resumable.
//!
//! Each post has at most one entry. The entry is written with status
//! InProgress before any output for the post is produced and advanced to
//! Complete only after every write succeeded; an entry still InProgress at
//! process start therefore marks an interrupted export to retry. Entries
//! are only reset by an explicit clean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the state directory inside a blog's output directory. State is
/// scoped per blog directory so multiple blogs never share entries.
const STATE_DIR: &str = ".state";

/// Errors from the on-disk store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Cannot access export state at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot encode export state entry: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// Per-post export status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    NotStarted,
    InProgress,
    Complete,
}

/// One entry, keyed by post id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEntry {
    pub post_id: String,
    pub status: ExportStatus,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl ExportEntry {
    fn not_started(post_id: &str) -> Self {
        Self {
            post_id: post_id.to_string(),
            status: ExportStatus::NotStarted,
            last_attempt: None,
        }
    }
}

/// Explicit store object the exporter is handed, so tests can substitute an
/// in-memory implementation.
pub trait StateStore {
    /// Current entry for the post. A post never seen returns NotStarted.
    fn get(&self, post_id: &str) -> ExportEntry;

    /// Persist the InProgress claim. Must be durable before the caller
    /// starts writing output for the post.
    fn mark_in_progress(&mut self, post_id: &str) -> Result<(), StateError>;

    /// Persist Complete. Only called after every write for the post succeeded.
    fn mark_complete(&mut self, post_id: &str) -> Result<(), StateError>;

    /// Reset every entry to NotStarted, forcing full re-export.
    fn clean(&mut self) -> Result<(), StateError>;
}

/// On-disk store: one JSON file per post id under `<blog dir>/.state/`.
///
/// A missing entry file means NotStarted. An unreadable or corrupt entry is
/// also treated as NotStarted: either way the post is re-exported, never
/// silently skipped.
#[derive(Debug)]
pub struct DirStateStore {
    dir: PathBuf,
}

impl DirStateStore {
    /// Open (creating if needed) the state directory inside `blog_dir`.
    pub fn open(blog_dir: &Path) -> Result<Self, StateError> {
        let dir = blog_dir.join(STATE_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| StateError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    fn entry_path(&self, post_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", post_id))
    }

    fn write_entry(&self, entry: &ExportEntry) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(entry).map_err(|e| StateError::Encode { source: e })?;
        let path = self.entry_path(&entry.post_id);
        std::fs::write(&path, bytes).map_err(|e| StateError::Io { path, source: e })
    }
}

impl StateStore for DirStateStore {
    fn get(&self, post_id: &str) -> ExportEntry {
        let path = self.entry_path(post_id);
        match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .unwrap_or_else(|_| ExportEntry::not_started(post_id)),
            Err(_) => ExportEntry::not_started(post_id),
        }
    }

    fn mark_in_progress(&mut self, post_id: &str) -> Result<(), StateError> {
        self.write_entry(&ExportEntry {
            post_id: post_id.to_string(),
            status: ExportStatus::InProgress,
            last_attempt: Some(Utc::now()),
        })
    }

    fn mark_complete(&mut self, post_id: &str) -> Result<(), StateError> {
        let last_attempt = self.get(post_id).last_attempt.or_else(|| Some(Utc::now()));
        self.write_entry(&ExportEntry {
            post_id: post_id.to_string(),
            status: ExportStatus::Complete,
            last_attempt,
        })
    }

    fn clean(&mut self) -> Result<(), StateError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StateError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| StateError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| StateError::Io { path, source: e })?;
            }
        }
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: HashMap<String, ExportEntry>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, e.g. to simulate a prior run.
    pub fn insert(&mut self, post_id: &str, status: ExportStatus) {
        self.entries.insert(
            post_id.to_string(),
            ExportEntry {
                post_id: post_id.to_string(),
                status,
                last_attempt: Some(Utc::now()),
            },
        );
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, post_id: &str) -> ExportEntry {
        self.entries
            .get(post_id)
            .cloned()
            .unwrap_or_else(|| ExportEntry::not_started(post_id))
    }

    fn mark_in_progress(&mut self, post_id: &str) -> Result<(), StateError> {
        self.insert(post_id, ExportStatus::InProgress);
        Ok(())
    }

    fn mark_complete(&mut self, post_id: &str) -> Result<(), StateError> {
        self.insert(post_id, ExportStatus::Complete);
        Ok(())
    }

    fn clean(&mut self) -> Result<(), StateError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (PathBuf, DirStateStore) {
        let dir = std::env::temp_dir().join(format!(
            "blogmirror_state_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let store = DirStateStore::open(&dir).unwrap();
        (dir, store)
    }

    #[test]
    fn unknown_post_is_not_started() {
        let (dir, store) = temp_store("unknown");
        let entry = store.get("123");
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(entry.status, ExportStatus::NotStarted);
        assert!(entry.last_attempt.is_none());
    }

    #[test]
    fn in_progress_claim_survives_reopen() {
        let (dir, mut store) = temp_store("claim");
        store.mark_in_progress("42").unwrap();
        // Simulate a crash: a fresh store over the same directory must still
        // see the claim.
        let reopened = DirStateStore::open(&dir).unwrap();
        let entry = reopened.get("42");
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(entry.status, ExportStatus::InProgress);
        assert!(entry.last_attempt.is_some());
    }

    #[test]
    fn complete_survives_reopen_and_keeps_attempt_time() {
        let (dir, mut store) = temp_store("complete");
        store.mark_in_progress("42").unwrap();
        let claimed = store.get("42");
        store.mark_complete("42").unwrap();
        let reopened = DirStateStore::open(&dir).unwrap();
        let entry = reopened.get("42");
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(entry.status, ExportStatus::Complete);
        assert_eq!(entry.last_attempt, claimed.last_attempt);
    }

    #[test]
    fn clean_resets_all_entries() {
        let (dir, mut store) = temp_store("clean");
        store.mark_complete("1").unwrap();
        store.mark_in_progress("2").unwrap();
        store.clean().unwrap();
        let a = store.get("1");
        let b = store.get("2");
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(a.status, ExportStatus::NotStarted);
        assert_eq!(b.status, ExportStatus::NotStarted);
    }

    #[test]
    fn corrupt_entry_treated_as_not_started() {
        let (dir, mut store) = temp_store("corrupt");
        store.mark_complete("9").unwrap();
        std::fs::write(dir.join(".state").join("9.json"), "{truncated").unwrap();
        let entry = store.get("9");
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(entry.status, ExportStatus::NotStarted);
    }

    #[test]
    fn stores_are_scoped_per_directory() {
        let (dir_a, mut store_a) = temp_store("scope_a");
        let (dir_b, store_b) = temp_store("scope_b");
        store_a.mark_complete("5").unwrap();
        let other = store_b.get("5");
        std::fs::remove_dir_all(&dir_a).ok();
        std::fs::remove_dir_all(&dir_b).ok();
        assert_eq!(other.status, ExportStatus::NotStarted);
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStateStore::new();
        assert_eq!(store.get("1").status, ExportStatus::NotStarted);
        store.mark_in_progress("1").unwrap();
        assert_eq!(store.get("1").status, ExportStatus::InProgress);
        store.mark_complete("1").unwrap();
        assert_eq!(store.get("1").status, ExportStatus::Complete);
        store.clean().unwrap();
        assert_eq!(store.get("1").status, ExportStatus::NotStarted);
    }
}
