//! On-disk layout of per-source indices
//!
//! ```text
//! <root>/<source_id>/index.json    flat vector index
//! <root>/<source_id>/chunks.json   chunk texts by position
//! <root>/<source_id>/source.json   source record
//! ```
//!
//! A rebuild is written into a hidden staging directory and then renamed
//! over the live one. Hidden entries are ignored when listing sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::{Result, RetrievalError};
use crate::index::FlatIndex;

const INDEX_FILE: &str = "index.json";
const CHUNKS_FILE: &str = "chunks.json";
const SOURCE_FILE: &str = "source.json";

/// Held lock on one source; the lock entry is released with the last guard
pub struct SourceGuard<'a, G> {
    store: &'a IndexStore,
    source_id: String,
    guard: Option<G>,
}

impl<'a, G> SourceGuard<'a, G> {
    fn new(store: &'a IndexStore, source_id: &str, guard: G) -> Self {
        Self {
            store,
            source_id: source_id.to_string(),
            guard: Some(guard),
        }
    }
}

impl<G> Drop for SourceGuard<'_, G> {
    fn drop(&mut self) {
        // The owned guard keeps the lock alive, so release it first
        self.guard.take();
        self.store.release_lock(&self.source_id);
    }
}

/// Metadata of an indexed source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub source_id: String,
    pub checksum: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// One chunk of source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    /// Ordinal of the chunk within its source
    pub chunk_id: usize,
    /// Position of the chunk's vector in the source index
    pub position: usize,
    pub content: String,
}

/// Filesystem store plus one reader/writer lock per source
pub struct IndexStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock guarding all files of one source
    fn source_lock(&self, source_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(source_id.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(()))),
        )
    }

    /// Whether some task currently holds or awaits the source's lock
    pub fn is_locked(&self, source_id: &str) -> bool {
        self.locks.lock().contains_key(source_id)
    }

    /// Number of lock entries; only sources with a task in flight have one
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Shared access to one source's files
    pub async fn read_lock(&self, source_id: &str) -> SourceGuard<'_, OwnedRwLockReadGuard<()>> {
        let guard = self.source_lock(source_id).read_owned().await;
        SourceGuard::new(self, source_id, guard)
    }

    /// Exclusive access to one source's files
    pub async fn write_lock(&self, source_id: &str) -> SourceGuard<'_, OwnedRwLockWriteGuard<()>> {
        let guard = self.source_lock(source_id).write_owned().await;
        SourceGuard::new(self, source_id, guard)
    }

    /// Drop the entry once no task holds a handle to it
    fn release_lock(&self, source_id: &str) {
        let mut locks = self.locks.lock();
        if locks
            .get(source_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(source_id);
        }
    }

    /// Directory of one source, rejecting ids that would escape the root
    pub fn source_dir(&self, source_id: &str) -> Result<PathBuf> {
        let valid = !source_id.is_empty()
            && !source_id.starts_with('.')
            && !source_id.contains(['/', '\\'])
            && source_id != "..";
        if !valid {
            return Err(RetrievalError::InvalidSourceId(source_id.to_string()));
        }
        Ok(self.root.join(source_id))
    }

    pub async fn read_source(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        let path = self.source_dir(source_id)?.join(SOURCE_FILE);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the source has a persisted index file
    pub async fn has_index(&self, source_id: &str) -> Result<bool> {
        let path = self.source_dir(source_id)?.join(INDEX_FILE);
        Ok(tokio::fs::try_exists(&path).await?)
    }

    pub async fn load_index(&self, source_id: &str) -> Result<Option<FlatIndex>> {
        let path = self.source_dir(source_id)?.join(INDEX_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(FlatIndex::load(&path).await?))
    }

    pub async fn load_chunks(&self, source_id: &str) -> Result<Vec<ChunkRecord>> {
        let path = self.source_dir(source_id)?.join(CHUNKS_FILE);
        let content = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Persist a complete source and swap it in place of any previous one
    pub async fn write_source(
        &self,
        record: &SourceRecord,
        index: &FlatIndex,
        chunks: &[ChunkRecord],
    ) -> Result<()> {
        let final_dir = self.source_dir(&record.source_id)?;
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let staging = self
            .root
            .join(format!(".staging-{}-{}", record.source_id, tag));
        let trash = self.root.join(format!(".trash-{}-{}", record.source_id, tag));

        tokio::fs::create_dir_all(&staging).await?;
        let written = async {
            index.save(&staging.join(INDEX_FILE)).await?;
            tokio::fs::write(staging.join(CHUNKS_FILE), serde_json::to_vec(chunks)?).await?;
            tokio::fs::write(
                staging.join(SOURCE_FILE),
                serde_json::to_vec_pretty(record)?,
            )
            .await?;
            Ok::<(), RetrievalError>(())
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        let had_previous = tokio::fs::try_exists(&final_dir).await?;
        if had_previous {
            tokio::fs::rename(&final_dir, &trash).await?;
        }
        if let Err(e) = tokio::fs::rename(&staging, &final_dir).await {
            if had_previous {
                let _ = tokio::fs::rename(&trash, &final_dir).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e.into());
        }
        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&trash).await {
                log::warn!("Failed to remove replaced index {}: {}", trash.display(), e);
            }
        }
        Ok(())
    }

    /// Remove a source directory. Returns whether anything was removed.
    pub async fn remove_source(&self, source_id: &str) -> Result<bool> {
        let dir = self.source_dir(source_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Source directories plus sources with a lock currently in flight.
    ///
    /// A source being rebuilt may briefly have no directory; including lock
    /// holders lets a reader wait for the rebuild instead of missing it.
    pub async fn known_source_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.list_source_ids().await?;
        ids.extend(self.locks.lock().keys().cloned());
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Ids of every source directory, sorted
    pub async fn list_source_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
