//! Indexing and retrieval over the per-source store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use capabilities::Embedder;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::chunker::{chunk_text, ChunkConfig};
use crate::error::{Result, RetrievalError};
use crate::index::FlatIndex;
use crate::store::{ChunkRecord, IndexStore, SourceRecord};

/// Number of chunks sent to the embedder per request.
const EMBEDDING_BATCH_SIZE: usize = 10;

/// Result of an indexing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The stored checksum matched; nothing was touched
    Unchanged,
    /// A fresh index was built and swapped in
    Indexed { chunk_count: usize },
    /// The file had no text; any stale index was removed
    Empty,
}

/// A chunk returned by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub source_id: String,
    pub chunk_id: usize,
    pub score: f32,
    pub content: String,
}

/// Loaded, searchable view of one source
struct LoadedSource {
    source_id: String,
    index: FlatIndex,
    chunks: Vec<ChunkRecord>,
}

/// Builds and queries per-source vector indices
pub struct RetrievalService {
    store: IndexStore,
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

impl RetrievalService {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store: IndexStore::new(root),
            embedder,
            chunk_config: ChunkConfig::default(),
            batch_size: EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn with_chunk_config(mut self, config: ChunkConfig) -> Self {
        self.chunk_config = config;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Build the index for a source unless its checksum is unchanged
    pub async fn index_source(
        &self,
        source_id: &str,
        file_path: &Path,
        checksum: &str,
    ) -> Result<IndexOutcome> {
        self.store.source_dir(source_id)?;
        let _guard = self.store.write_lock(source_id).await;

        if let Some(existing) = self.store.read_source(source_id).await? {
            if existing.checksum == checksum && self.store.has_index(source_id).await? {
                log::debug!("Source '{}' unchanged, skipping rebuild", source_id);
                return Ok(IndexOutcome::Unchanged);
            }
            log::info!("Source '{}' changed, rebuilding index", source_id);
            self.store.remove_source(source_id).await?;
        }

        let bytes = tokio::fs::read(file_path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let chunks = chunk_text(&text, &self.chunk_config);
        if chunks.is_empty() {
            log::warn!("Source '{}' has no text to index", source_id);
            return Ok(IndexOutcome::Empty);
        }

        let vectors = self.embed_chunks(&chunks).await?;
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut index = FlatIndex::new(dimension);
        let positions = index.add(&vectors)?;

        let chunk_records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(positions)
            .enumerate()
            .map(|(chunk_id, (content, position))| ChunkRecord {
                chunk_id,
                position,
                content,
            })
            .collect();

        let record = SourceRecord {
            source_id: source_id.to_string(),
            checksum: checksum.to_string(),
            embedding_model: self.embedder.model_id().to_string(),
            dimension,
            chunk_count: chunk_records.len(),
            indexed_at: Utc::now(),
        };
        self.store
            .write_source(&record, &index, &chunk_records)
            .await?;

        log::info!(
            "Indexed source '{}': {} chunks, dimension {}",
            source_id,
            record.chunk_count,
            dimension
        );
        Ok(IndexOutcome::Indexed {
            chunk_count: record.chunk_count,
        })
    }

    /// Embed every chunk, batch by batch, keeping input order
    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_number, batch) in chunks.chunks(self.batch_size).enumerate() {
            let embedded = self.embedder.embed_documents(batch).await?;
            if embedded.len() != batch.len() {
                return Err(RetrievalError::Embedding(format!(
                    "batch {} returned {} vectors for {} chunks",
                    batch_number,
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Top `top_k` chunks across the given sources (all sources when `None`)
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        source_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>> {
        let scope = match source_ids {
            Some(ids) => ids.to_vec(),
            None => self.store.known_source_ids().await?,
        };

        let mut sources = Vec::new();
        for source_id in &scope {
            if let Some(loaded) = self.load_source(source_id).await? {
                sources.push(loaded);
            }
        }
        if sources.is_empty() {
            return Err(RetrievalError::NotIndexed);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(text).await?;

        let mut hits = Vec::new();
        for source in &sources {
            let scored = source.index.search(&query_vector, top_k).map_err(|e| match e {
                RetrievalError::DimensionMismatch { .. } => e,
                other => RetrievalError::Search(other.to_string()),
            })?;
            for (position, score) in scored {
                let Some(chunk) = source.chunks.iter().find(|c| c.position == position) else {
                    log::warn!(
                        "Source '{}' has no chunk for position {}",
                        source.source_id,
                        position
                    );
                    continue;
                };
                hits.push(RetrievedChunk {
                    source_id: source.source_id.clone(),
                    chunk_id: chunk.chunk_id,
                    score,
                    content: chunk.content.clone(),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Read one source under its read lock. `None` when it has no index.
    ///
    /// Ids with neither an index nor a task in flight are answered without
    /// touching the lock table. When the index is missing while another task
    /// holds the lock, the read waits for that task.
    async fn load_source(&self, source_id: &str) -> Result<Option<LoadedSource>> {
        self.store.source_dir(source_id)?;
        if !self.store.has_index(source_id).await?
            && !self.store.is_locked(source_id)
            && !self.store.has_index(source_id).await?
        {
            return Ok(None);
        }
        let _guard = self.store.read_lock(source_id).await;

        let Some(index) = self.store.load_index(source_id).await? else {
            return Ok(None);
        };
        let chunks = self.store.load_chunks(source_id).await?;
        Ok(Some(LoadedSource {
            source_id: source_id.to_string(),
            index,
            chunks,
        }))
    }

    /// Remove a source and its index. Returns whether it existed.
    pub async fn delete_source(&self, source_id: &str) -> Result<bool> {
        self.store.source_dir(source_id)?;
        let _guard = self.store.write_lock(source_id).await;
        let removed = self.store.remove_source(source_id).await?;
        if removed {
            log::info!("Deleted source '{}'", source_id);
        }
        Ok(removed)
    }

    pub async fn source(&self, source_id: &str) -> Result<Option<SourceRecord>> {
        self.store.source_dir(source_id)?;
        let _guard = self.store.read_lock(source_id).await;
        self.store.read_source(source_id).await
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let mut records = Vec::new();
        for source_id in self.store.list_source_ids().await? {
            if let Some(record) = self.source(&source_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Format retrieved chunks as a prompt context block
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    let mut parts = Vec::with_capacity(chunks.len() * 2);
    for chunk in chunks {
        parts.push(format!("[source:{}][chunk:{}]", chunk.source_id, chunk.chunk_id));
        parts.push(chunk.content.clone());
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capabilities::{EmbedDocuments, EmbedQuery, PortError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    const VOCABULARY: [&str; 4] = ["apple", "banana", "cherry", "durian"];

    /// Embeds text as keyword counts over a tiny vocabulary
    #[derive(Default)]
    struct KeywordEmbedder {
        document_calls: AtomicUsize,
        drop_last: bool,
    }

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect()
    }

    #[async_trait]
    impl EmbedDocuments for KeywordEmbedder {
        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, PortError> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| keyword_vector(t)).collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    #[async_trait]
    impl EmbedQuery for KeywordEmbedder {
        async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, PortError> {
            Ok(keyword_vector(text))
        }
    }

    impl Embedder for KeywordEmbedder {
        fn model_id(&self) -> &str {
            "keywords"
        }
    }

    fn small_chunks() -> ChunkConfig {
        ChunkConfig {
            chunk_size: 20,
            chunk_overlap: 0,
        }
    }

    fn service(dir: &TempDir, embedder: Arc<KeywordEmbedder>) -> RetrievalService {
        RetrievalService::new(dir.path().join("vectors"), embedder)
            .with_chunk_config(small_chunks())
            .with_batch_size(2)
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_index_is_idempotent_per_checksum() {
        let dir = tempdir().unwrap();
        let embedder = Arc::new(KeywordEmbedder::default());
        let service = service(&dir, embedder.clone());
        let path = write_file(&dir, "a.txt", "apple apple apple ..banana banana......");

        let first = service.index_source("a", &path, "c1").await.unwrap();
        assert_eq!(first, IndexOutcome::Indexed { chunk_count: 2 });
        let calls = embedder.document_calls.load(Ordering::SeqCst);
        assert_eq!(calls, 1);

        let second = service.index_source("a", &path, "c1").await.unwrap();
        assert_eq!(second, IndexOutcome::Unchanged);
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), calls);

        let record = service.source("a").await.unwrap().unwrap();
        assert_eq!(record.chunk_count, 2);
        assert_eq!(record.dimension, 4);
        assert_eq!(record.embedding_model, "keywords");
    }

    #[tokio::test]
    async fn test_changed_checksum_rebuilds() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));
        let path = write_file(&dir, "a.txt", "apple");
        service.index_source("a", &path, "c1").await.unwrap();

        std::fs::write(&path, "cherry cherry").unwrap();
        let outcome = service.index_source("a", &path, "c2").await.unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { chunk_count: 1 });

        let hits = service.query("cherry", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "cherry cherry");
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_is_error() {
        let dir = tempdir().unwrap();
        let embedder = Arc::new(KeywordEmbedder {
            drop_last: true,
            ..Default::default()
        });
        let service = service(&dir, embedder);
        let path = write_file(&dir, "a.txt", "apple banana cherry durian apple banana");

        let err = service.index_source("a", &path, "c1").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
        assert!(service.source("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_without_index() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));

        let err = service.query("apple", 3, None).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotIndexed));

        let scope = vec!["ghost".to_string()];
        let err = service.query("apple", 3, Some(&scope)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NotIndexed));
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_lock_entries() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));
        let path = write_file(&dir, "a.txt", "apple banana");
        service.index_source("a", &path, "c1").await.unwrap();

        for i in 0..100 {
            let scope = vec![format!("ghost-{}", i)];
            let err = service.query("apple", 3, Some(&scope)).await.unwrap_err();
            assert!(matches!(err, RetrievalError::NotIndexed));
        }
        assert_eq!(service.store().lock_count(), 0);
        assert_eq!(service.store().known_source_ids().await.unwrap(), vec!["a"]);

        let hits = service.query("apple", 3, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service.delete_source("a").await.unwrap());
        assert_eq!(service.store().lock_count(), 0);
    }

    #[tokio::test]
    async fn test_query_merges_sources_and_bounds_results() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));

        let a = write_file(&dir, "a.txt", "apple apple apple   banana");
        let b = write_file(&dir, "b.txt", "apple apple         durian durian");
        service.index_source("a", &a, "ca").await.unwrap();
        service.index_source("b", &b, "cb").await.unwrap();

        let hits = service.query("apple", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_id, "a");
        assert_eq!(hits[0].score, 3.0);
        assert_eq!(hits[1].source_id, "b");
        assert!(hits[0].score >= hits[1].score);

        let scope = vec!["b".to_string()];
        let scoped = service.query("apple", 10, Some(&scope)).await.unwrap();
        assert!(scoped.iter().all(|h| h.source_id == "b"));
        assert_eq!(scoped.len(), 2);

        assert!(service.query("apple", 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_break_by_source_then_chunk() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));

        let x = write_file(&dir, "x.txt", "durian");
        let y = write_file(&dir, "y.txt", "durian");
        service.index_source("y", &y, "cy").await.unwrap();
        service.index_source("x", &x, "cx").await.unwrap();

        let hits = service.query("durian", 5, None).await.unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
        assert_eq!(order, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_empty_file_removes_stale_index() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));
        let path = write_file(&dir, "a.txt", "apple");
        service.index_source("a", &path, "c1").await.unwrap();

        std::fs::write(&path, "   \n ").unwrap();
        let outcome = service.index_source("a", &path, "c2").await.unwrap();
        assert_eq!(outcome, IndexOutcome::Empty);
        assert!(service.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = tempdir().unwrap();
        let service = service(&dir, Arc::new(KeywordEmbedder::default()));
        let path = write_file(&dir, "a.txt", "apple");
        service.index_source("a", &path, "c1").await.unwrap();
        service.index_source("b", &path, "c1").await.unwrap();

        let ids: Vec<String> = service
            .list_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.source_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(service.delete_source("a").await.unwrap());
        assert!(!service.delete_source("a").await.unwrap());
        assert_eq!(service.list_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_queries_during_rebuild() {
        let dir = tempdir().unwrap();
        let service = Arc::new(service(&dir, Arc::new(KeywordEmbedder::default())));
        let path = write_file(&dir, "a.txt", "apple banana");
        service.index_source("a", &path, "c1").await.unwrap();

        let writer = {
            let service = Arc::clone(&service);
            let path = path.clone();
            tokio::spawn(async move { service.index_source("a", &path, "c2").await })
        };
        let mut readers = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&service);
            readers.push(tokio::spawn(async move {
                service.query("apple", 3, None).await
            }));
        }

        assert!(writer.await.unwrap().is_ok());
        for reader in readers {
            let hits = reader.await.unwrap().unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].content, "apple banana");
        }
    }

    #[test]
    fn test_build_context_format() {
        let chunks = vec![
            RetrievedChunk {
                source_id: "s1".to_string(),
                chunk_id: 0,
                score: 0.9,
                content: "first".to_string(),
            },
            RetrievedChunk {
                source_id: "s2".to_string(),
                chunk_id: 4,
                score: 0.5,
                content: "second".to_string(),
            },
        ];
        assert_eq!(
            build_context(&chunks),
            "[source:s1][chunk:0]\n\nfirst\n\n[source:s2][chunk:4]\n\nsecond"
        );
        assert_eq!(build_context(&[]), "");
    }
}
