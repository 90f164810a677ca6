//! Durable JSON-file [`DocumentStore`].
//!
//! The whole chunk collection lives in memory and is mirrored to
//! `<root>/index.json` as one pretty-printed JSON array of
//! `{doc_id, text, meta}` records. Every mutation rewrites the full file;
//! there is no log and no compaction.
//!
//! # Consistency
//!
//! - Writers hold the `RwLock` write guard across mutate + persist, so two
//!   concurrent `add`s can never persist a collection missing the other's
//!   chunk.
//! - The file is written to `index.json.tmp` and renamed over the old one.
//! - If persisting fails, the in-memory collection is rolled back and the
//!   error returned: memory and disk both keep the pre-failure contents.
//! - Readers take the shared guard and never observe a half-applied write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use tracing::{debug, info};

use testweaver_core::models::{Chunk, ChunkSummary, SearchHit};
use testweaver_core::rag::RagIndex;
use testweaver_core::search::search_chunks;
use testweaver_core::store::DocumentStore;

use crate::config::Config;

/// File name of the persisted collection inside the store root.
pub const INDEX_FILE: &str = "index.json";

/// Open the configured durable store and wrap it in a [`RagIndex`].
pub fn open_index(config: &Config) -> Result<RagIndex> {
    let store = JsonFileStore::open(&config.store.root)?;
    Ok(RagIndex::with_fallback(
        Arc::new(store),
        config.retrieval.fallback_query.clone(),
    ))
}

/// Chunk store persisted as a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    index_file: PathBuf,
    chunks: RwLock<Vec<Chunk>>,
}

impl JsonFileStore {
    /// Load `<root>/index.json`, or start empty if it does not exist.
    ///
    /// Creates `root` when missing. A file that exists but does not parse
    /// is an error; it is never silently replaced.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create store directory: {}", root.display()))?;

        let index_file = root.join(INDEX_FILE);
        let chunks: Vec<Chunk> = if index_file.exists() {
            let raw = fs::read_to_string(&index_file)
                .with_context(|| format!("Failed to read {}", index_file.display()))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse {}", index_file.display()))?
            }
        } else {
            Vec::new()
        };

        info!(
            path = %index_file.display(),
            chunks = chunks.len(),
            "document store opened"
        );

        Ok(Self {
            index_file,
            chunks: RwLock::new(chunks),
        })
    }

    /// Path of the persisted JSON array.
    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    fn persist(&self, chunks: &[Chunk]) -> Result<()> {
        let json = serde_json::to_string_pretty(chunks)?;
        let tmp = self.index_file.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.index_file)
            .with_context(|| format!("Failed to replace {}", self.index_file.display()))?;
        debug!(chunks = chunks.len(), "document store persisted");
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn add(&self, chunk: Chunk) -> Result<()> {
        chunk.validate()?;
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.push(chunk);
        if let Err(e) = self.persist(&chunks) {
            chunks.pop();
            return Err(e);
        }
        Ok(())
    }

    fn add_many(&self, batch: Vec<Chunk>) -> Result<()> {
        for chunk in &batch {
            chunk.validate()?;
        }
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.extend(batch);
        if let Err(e) = self.persist(&chunks) {
            chunks.truncate(before);
            return Err(e);
        }
        Ok(())
    }

    fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(search_chunks(&chunks, query, top_k))
    }

    fn delete(&self, doc_id: &str) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let kept: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.doc_id != doc_id)
            .cloned()
            .collect();
        if kept.len() == chunks.len() {
            return Ok(false);
        }
        self.persist(&kept)?;
        *chunks = kept;
        Ok(true)
    }

    fn delete_all(&self) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&[])?;
        chunks.clear();
        Ok(true)
    }

    fn list(&self, limit: usize, preview_chars: usize) -> Result<Vec<ChunkSummary>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(chunks
            .iter()
            .take(limit)
            .map(|c| ChunkSummary::from_chunk(c, preview_chars))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}
