//! Data types that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form chunk metadata. Opaque to the store; only the retrieval and
/// context layers read specific keys (`type`, `source`, `file_path`, …).
pub type Meta = Map<String, Value>;

/// The atomic stored unit: an identified piece of text plus metadata.
///
/// This is also the on-disk record shape of the JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Logical identifier, e.g. `pdf:guide.pdf:chunk:3`.
    pub doc_id: String,
    /// Chunk content. Never empty once stored.
    pub text: String,
    #[serde(default)]
    pub meta: Meta,
}

impl Chunk {
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, meta: Meta) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            meta,
        }
    }

    /// Reject chunks that cannot be stored.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.doc_id.is_empty() {
            anyhow::bail!("chunk doc_id must not be empty");
        }
        if self.text.is_empty() {
            anyhow::bail!("chunk text must not be empty (doc_id: {})", self.doc_id);
        }
        Ok(())
    }
}

/// A retrieved chunk. Every store backend produces this one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: String,
    /// Relevance score, when the backend has one.
    pub score: Option<f64>,
    pub meta: Meta,
    pub text: String,
}

impl SearchHit {
    pub fn from_chunk(chunk: &Chunk, score: Option<f64>) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            score,
            meta: chunk.meta.clone(),
            text: chunk.text.clone(),
        }
    }
}

/// Inspection view of a stored chunk (for listings and UIs).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub doc_id: String,
    pub meta: Meta,
    /// First `preview_chars` characters of the text.
    pub preview: String,
    /// Full text length in characters.
    pub length: usize,
}

impl ChunkSummary {
    pub fn from_chunk(chunk: &Chunk, preview_chars: usize) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            meta: chunk.meta.clone(),
            preview: preview(&chunk.text, preview_chars),
            length: chunk.text.chars().count(),
        }
    }
}

/// Truncate `text` to at most `max_chars` characters (not bytes).
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
