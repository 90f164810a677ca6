//! Storage abstraction for the chunk collection.
//!
//! The [`DocumentStore`] trait is the single capability interface every
//! backend implements; callers never probe for alternative method names or
//! result shapes. Search results are always [`SearchHit`]s.
//!
//! Implementations must be `Send + Sync`: one store instance is shared by
//! every request handler. Mutations must be serialized so that the
//! read-modify-persist sequence of one writer never interleaves with
//! another's.

pub mod memory;

use anyhow::Result;

use crate::models::{Chunk, ChunkSummary, SearchHit};

/// Abstract chunk store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](DocumentStore::add) | Append a chunk (duplicate ids are kept) |
/// | [`add_many`](DocumentStore::add_many) | Append a batch, all or nothing |
/// | [`search`](DocumentStore::search) | Lexical top-k search |
/// | [`delete`](DocumentStore::delete) | Remove every chunk with an id |
/// | [`delete_all`](DocumentStore::delete_all) | Remove everything |
/// | [`list`](DocumentStore::list) | Summaries in insertion order |
pub trait DocumentStore: Send + Sync {
    /// Append a chunk. Durable backends persist before returning.
    ///
    /// Adding an id that already exists appends a second record; it does
    /// not overwrite.
    fn add(&self, chunk: Chunk) -> Result<()>;

    /// Append every chunk of `chunks`, in order, as one mutation.
    ///
    /// Either the whole batch is stored or none of it is: an invalid chunk
    /// or a failed persist leaves the store as it was.
    fn add_many(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Top-`top_k` chunks scoring above zero for `query`.
    ///
    /// Empty or all-short-token queries return an empty vec, not an error.
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;

    /// Remove all chunks whose `doc_id` equals `doc_id`.
    ///
    /// Returns `false` (and leaves the store untouched) when nothing matched.
    fn delete(&self, doc_id: &str) -> Result<bool>;

    /// Remove every chunk. Returns a success flag, not a count.
    fn delete_all(&self) -> Result<bool>;

    /// Up to `limit` chunk summaries in insertion order.
    fn list(&self, limit: usize, preview_chars: usize) -> Result<Vec<ChunkSummary>>;

    /// Number of stored chunks (duplicates included).
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
