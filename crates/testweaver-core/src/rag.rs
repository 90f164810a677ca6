//! The RAG index facade.
//!
//! [`RagIndex`] wraps one shared [`DocumentStore`] and exposes the
//! ingest / retrieve / search / delete / list contract used by the agent
//! and the HTTP API. It holds no state besides the store handle and the
//! fallback query, so [`retrieve_context`](RagIndex::retrieve_context) is a
//! pure function of the store contents and its arguments.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::context::{assemble_context, DEFAULT_FALLBACK_QUERY};
use crate::models::{preview, Chunk, ChunkSummary, Meta, SearchHit};
use crate::store::DocumentStore;

/// Characters of each used chunk echoed to the debug log.
const LOG_PREVIEW_CHARS: usize = 200;

/// Retrieval facade over a shared chunk store.
#[derive(Clone)]
pub struct RagIndex {
    store: Arc<dyn DocumentStore>,
    fallback_query: String,
}

impl RagIndex {
    /// Wrap `store` with the default fallback query.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_fallback(store, DEFAULT_FALLBACK_QUERY)
    }

    pub fn with_fallback(store: Arc<dyn DocumentStore>, fallback_query: impl Into<String>) -> Self {
        Self {
            store,
            fallback_query: fallback_query.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Store one chunk.
    pub fn ingest(&self, doc_id: &str, text: &str, meta: Meta) -> Result<()> {
        self.store.add(Chunk::new(doc_id, text, meta))
    }

    /// Store the chunks of one source in a single mutation.
    pub fn ingest_batch(&self, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.store.add_many(chunks)
    }

    /// Raw hits for `query`, without the fallback.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.store.search(query, top_k)
    }

    /// Hits for `query`, or for the fallback query when `query` finds nothing.
    pub fn search_with_fallback(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let hits = self.store.search(query, top_k)?;
        if !hits.is_empty() {
            debug!("RAG: {} hit(s) for query {:?}", hits.len(), query);
            return Ok(hits);
        }

        debug!(
            "RAG: no hits for query {:?}, falling back to {:?}",
            query, self.fallback_query
        );
        let hits = self.store.search(&self.fallback_query, top_k)?;
        if hits.is_empty() {
            debug!("RAG: still no hits after fallback");
        }
        Ok(hits)
    }

    /// Formatted context block for an LLM prompt.
    ///
    /// Returns an empty string when neither the query nor the fallback
    /// matches; callers treat that as "no RAG evidence".
    pub fn retrieve_context(&self, query: &str, top_k: usize) -> Result<String> {
        let hits = self.search_with_fallback(query, top_k)?;
        for hit in &hits {
            debug!(
                doc_id = %hit.doc_id,
                meta = %serde_json::Value::Object(hit.meta.clone()),
                "RAG chunk used: {:?}",
                preview(&hit.text, LOG_PREVIEW_CHARS)
            );
        }
        Ok(assemble_context(&hits))
    }

    /// Delete one id, or everything when `doc_id` is `None` or empty.
    ///
    /// For a single id the flag says whether anything was removed; for
    /// delete-all it is the store's success flag.
    pub fn delete(&self, doc_id: Option<&str>) -> Result<bool> {
        match doc_id {
            Some(id) if !id.is_empty() => self.store.delete(id),
            _ => self.store.delete_all(),
        }
    }

    pub fn list(&self, limit: usize, preview_chars: usize) -> Result<Vec<ChunkSummary>> {
        self.store.list(limit, preview_chars)
    }
}
