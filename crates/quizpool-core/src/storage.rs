//! Best-effort persistence collaborators.
//!
//! A [`BlobStore`] is a plain get/set string store. Generated questions and
//! per-user consumed ids are kept in it as JSON. Every failure here is logged
//! and read as "nothing stored"; none reaches a caller of the pipeline.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;
use crate::model::Question;
use crate::pool::keep_after_cleanup;

/// Namespaced blob key for persisted generated questions.
pub const GENERATED_QUESTIONS_KEY: &str = "quizpool/generated-questions";

// ---------------------------------------------------------------------------
// Blob stores
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per blob key under a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Generated questions
// ---------------------------------------------------------------------------

/// Generated questions kept across sessions.
///
/// Clones share one write lock, so concurrent read-modify-write cycles on
/// the blob never overwrite each other.
#[derive(Clone)]
pub struct GeneratedQuestionStore {
    blob: Arc<dyn BlobStore>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl GeneratedQuestionStore {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            blob,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    /// Everything persisted so far. Unreadable payloads count as empty.
    pub async fn load(&self) -> Vec<Question> {
        match self.try_load().await {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!(error = %e, "could not read generated questions");
                Vec::new()
            }
        }
    }

    async fn try_load(&self) -> Result<Vec<Question>, StorageError> {
        match self.blob.get(GENERATED_QUESTIONS_KEY).await? {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, questions: &[Question]) {
        let result = match serde_json::to_string(questions) {
            Ok(body) => self.blob.set(GENERATED_QUESTIONS_KEY, body).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not persist generated questions");
        }
    }

    /// Add `questions`, skipping ids already stored. Returns how many were new.
    pub async fn append(&self, questions: &[Question]) -> usize {
        if questions.is_empty() {
            return 0;
        }
        let _write = self.write_lock.lock().await;
        let mut stored = self.load().await;
        let mut ids: HashSet<String> = stored.iter().map(|q| q.id.clone()).collect();
        let before = stored.len();
        for q in questions {
            if ids.insert(q.id.clone()) {
                stored.push(q.clone());
            }
        }
        let added = stored.len() - before;
        if added > 0 {
            self.save(&stored).await;
        }
        added
    }

    /// Drop stored questions older than `horizon` that are no longer valid.
    pub async fn cleanup(&self, horizon: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - horizon;
        let _write = self.write_lock.lock().await;
        let stored = self.load().await;
        let before = stored.len();
        let kept: Vec<Question> = stored
            .into_iter()
            .filter(|q| keep_after_cleanup(q, cutoff))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.save(&kept).await;
            tracing::info!(removed, "cleaned up stored generated questions");
        }
        removed
    }

    pub async fn clear(&self) {
        let _write = self.write_lock.lock().await;
        if let Err(e) = self.blob.remove(GENERATED_QUESTIONS_KEY).await {
            tracing::warn!(error = %e, "could not clear generated questions");
        }
    }
}

// ---------------------------------------------------------------------------
// Consumed question tracking
// ---------------------------------------------------------------------------

/// Ids a user has already been shown.
#[async_trait]
pub trait ConsumedTracker: Send + Sync {
    async fn consumed(&self, user: &str) -> HashSet<String>;

    async fn record(&self, user: &str, ids: &[String]);
}

#[derive(Debug, Default)]
pub struct MemoryConsumedTracker {
    seen: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryConsumedTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsumedTracker for MemoryConsumedTracker {
    async fn consumed(&self, user: &str) -> HashSet<String> {
        let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.get(user).cloned().unwrap_or_default()
    }

    async fn record(&self, user: &str, ids: &[String]) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.entry(user.to_string())
            .or_default()
            .extend(ids.iter().cloned());
    }
}

/// Reads `answered-questions/<user>` as a JSON array of ids.
#[derive(Clone)]
pub struct BlobConsumedTracker {
    blob: Arc<dyn BlobStore>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl BlobConsumedTracker {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            blob,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn key(user: &str) -> String {
        format!("answered-questions/{user}")
    }

    async fn try_consumed(&self, user: &str) -> Result<HashSet<String>, StorageError> {
        match self.blob.get(&Self::key(user)).await? {
            Some(body) => Ok(serde_json::from_str::<Vec<String>>(&body)?
                .into_iter()
                .collect()),
            None => Ok(HashSet::new()),
        }
    }
}

#[async_trait]
impl ConsumedTracker for BlobConsumedTracker {
    async fn consumed(&self, user: &str) -> HashSet<String> {
        self.try_consumed(user).await.unwrap_or_else(|e| {
            tracing::warn!(user, error = %e, "could not read consumed questions");
            HashSet::new()
        })
    }

    async fn record(&self, user: &str, ids: &[String]) {
        let _write = self.write_lock.lock().await;
        let mut all = self.consumed(user).await;
        all.extend(ids.iter().cloned());
        let mut sorted: Vec<String> = all.into_iter().collect();
        sorted.sort();

        let result = match serde_json::to_string(&sorted) {
            Ok(body) => self.blob.set(&Self::key(user), body).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(user, error = %e, "could not record consumed questions");
        }
    }
}
