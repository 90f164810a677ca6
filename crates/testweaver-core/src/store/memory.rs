//! In-memory [`DocumentStore`] for tests and embedding.
//!
//! A `Vec<Chunk>` behind `std::sync::RwLock`. Nothing is persisted.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;

use crate::models::{Chunk, ChunkSummary, SearchHit};
use crate::search::search_chunks;

use super::DocumentStore;

/// In-memory chunk store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryStore {
    fn add(&self, chunk: Chunk) -> Result<()> {
        chunk.validate()?;
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.push(chunk);
        Ok(())
    }

    fn add_many(&self, batch: Vec<Chunk>) -> Result<()> {
        for chunk in &batch {
            chunk.validate()?;
        }
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.extend(batch);
        Ok(())
    }

    fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(search_chunks(&chunks, query, top_k))
    }

    fn delete(&self, doc_id: &str) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.retain(|c| c.doc_id != doc_id);
        Ok(chunks.len() < before)
    }

    fn delete_all(&self) -> Result<bool> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
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
