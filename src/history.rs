//! Bounded, JSON-persisted dialogue history
//!
//! The history is capped at `2 × max_turns` entries (one user turn plus one
//! model turn per exchange). Trimming is strict per-turn FIFO and the whole
//! sequence is rewritten on every commit.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message in the dialogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk shape of the history file.
#[derive(Serialize, Deserialize)]
struct HistoryFile {
    history: Vec<Turn>,
}

/// Dialogue history owned by the turn runtime
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    max_turns: usize,
    turns: Vec<Turn>,
}

impl HistoryStore {
    /// Load history from `path`.
    ///
    /// A missing or unreadable file yields an empty history; this never fails.
    pub fn load(path: impl Into<PathBuf>, max_turns: usize) -> Self {
        let path = path.into();
        let mut turns = read_history_file(&path);
        trim_front(&mut turns, max_turns * 2);
        tracing::info!(path = %path.display(), turns = turns.len(), "Loaded chat history");
        Self {
            path,
            max_turns,
            turns,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum number of stored turns
    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    /// Most recent turns that still fit in one request next to a new user
    /// turn, so the `contents` window never exceeds capacity.
    pub fn request_history(&self) -> &[Turn] {
        let keep = self.capacity().saturating_sub(1);
        let skip = self.turns.len().saturating_sub(keep);
        self.turns.get(skip..).unwrap_or_default()
    }

    /// Append `new_turns`, trim the oldest entries and persist.
    ///
    /// A persistence failure is logged; the in-memory commit stands.
    pub fn append(&mut self, new_turns: impl IntoIterator<Item = Turn>) -> &[Turn] {
        self.turns.extend(new_turns);
        let cap = self.capacity();
        trim_front(&mut self.turns, cap);

        if let Err(e) = self.persist() {
            tracing::error!(error = %e, "Failed to persist chat history");
        }
        &self.turns
    }

    /// Write the full history to disk (overwrite).
    ///
    /// The JSON goes to a sibling temp file first and is renamed over the
    /// history file, so a crash mid-write leaves the previous file intact.
    pub fn persist(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| HistoryError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let file = HistoryFile {
            history: self.turns.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = temp_path(&self.path);
        let written = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(source) = written {
            let _ = fs::remove_file(&tmp);
            return Err(HistoryError::Write {
                path: self.path.clone(),
                source,
            });
        }
        tracing::debug!(path = %self.path.display(), turns = self.turns.len(), "Persisted chat history");
        Ok(())
    }

    /// Drop all turns and delete the history file.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.turns.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Deleted chat history file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HistoryError::Delete {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn read_history_file(path: &Path) -> Vec<Turn> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read chat history");
            return Vec::new();
        }
    };

    match serde_json::from_str::<HistoryFile>(&data) {
        Ok(file) => file.history,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Malformed chat history, starting empty");
            Vec::new()
        }
    }
}

/// Remove entries from the front until `turns.len() <= cap`.
fn trim_front(turns: &mut Vec<Turn>, cap: usize) {
    if turns.len() > cap {
        let excess = turns.len() - cap;
        turns.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, max_turns: usize) -> HistoryStore {
        HistoryStore::load(dir.path().join("chat_history.json"), max_turns)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 10);
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.json");
        fs::write(&path, "{ not json").unwrap();

        let store = HistoryStore::load(&path, 10);
        assert!(store.is_empty());
    }

    #[test]
    fn append_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.append([Turn::user("hello"), Turn::model(r#"{"reply":"hi"}"#)]);

        let reloaded = store_in(&dir, 10);
        assert_eq!(reloaded.turns(), store.turns());
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn file_format_is_role_text_list() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.append([Turn::user("hello"), Turn::model("hi")]);

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["history"][0]["role"], "user");
        assert_eq!(value["history"][0]["text"], "hello");
        assert_eq!(value["history"][1]["role"], "model");
    }

    #[test]
    fn trims_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 2);
        for i in 0..4 {
            store.append([Turn::user(format!("u{i}")), Turn::model(format!("m{i}"))]);
        }

        let expected = vec![
            Turn::user("u2"),
            Turn::model("m2"),
            Turn::user("u3"),
            Turn::model("m3"),
        ];
        assert_eq!(store.turns(), expected.as_slice());
    }

    #[test]
    fn oversized_file_is_trimmed_on_load() {
        let dir = TempDir::new().unwrap();
        let mut big = store_in(&dir, 10);
        for i in 0..5 {
            big.append([Turn::user(format!("u{i}")), Turn::model(format!("m{i}"))]);
        }

        let small = store_in(&dir, 1);
        assert_eq!(small.turns(), &[Turn::user("u4"), Turn::model("m4")]);
    }

    #[test]
    fn request_history_leaves_room_for_new_turn() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 1);
        assert!(store.request_history().is_empty());

        store.append([Turn::user("old"), Turn::model("reply")]);
        assert_eq!(store.request_history(), &[Turn::model("reply")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_deletes_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.append([Turn::user("hello"), Turn::model("hi")]);
        assert!(store.path().exists());

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());

        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn persist_failure_keeps_memory_commit() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the write fail
        let path = dir.path().join("history_dir");
        fs::create_dir(&path).unwrap();

        let mut store = HistoryStore::load(&path, 10);
        store.append([Turn::user("hello"), Turn::model("hi")]);
        assert_eq!(store.len(), 2);
        assert!(store.persist().is_err());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn persist_replaces_file_through_temp_sibling() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.append([Turn::user("one"), Turn::model("1")]);

        // Leftover from an interrupted write
        fs::write(temp_path(store.path()), "{\"hist").unwrap();
        let reloaded = HistoryStore::load(store.path(), 10);
        assert_eq!(reloaded.turns(), store.turns());

        store.append([Turn::user("two"), Turn::model("2")]);
        assert!(!temp_path(store.path()).exists());
        let reloaded = HistoryStore::load(store.path(), 10);
        assert_eq!(reloaded.len(), 4);
    }

    fn arb_turn() -> impl Strategy<Value = Turn> {
        (any::<bool>(), "[a-zA-Z0-9 {}\":,]{0,40}").prop_map(|(is_user, text)| {
            if is_user {
                Turn::user(text)
            } else {
                Turn::model(text)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_persist_load_round_trip(turns in proptest::collection::vec(arb_turn(), 0..20)) {
            let dir = TempDir::new().unwrap();
            let mut store = store_in(&dir, 10);
            store.append(turns);

            let reloaded = store_in(&dir, 10);
            prop_assert_eq!(reloaded.turns(), store.turns());
        }

        #[test]
        fn prop_cap_and_fifo_order(
            max_turns in 1usize..5,
            batches in proptest::collection::vec(proptest::collection::vec(arb_turn(), 0..4), 1..10),
        ) {
            let dir = TempDir::new().unwrap();
            let mut store = store_in(&dir, max_turns);
            let mut all = Vec::new();

            for batch in batches {
                all.extend(batch.iter().cloned());
                store.append(batch);
                prop_assert!(store.len() <= max_turns * 2);
            }

            // Survivors are exactly the most recent suffix, in order
            let expected_len = all.len().min(max_turns * 2);
            let expected = &all[all.len() - expected_len..];
            prop_assert_eq!(store.turns(), expected);
        }
    }
}
