//! # TestWeaver Core
//!
//! Shared, I/O-free logic for TestWeaver's retrieval pipeline: the chunk
//! model, character-window and OpenAPI chunkers, lexical scoring, the
//! [`DocumentStore`](store::DocumentStore) trait with an in-memory backend,
//! and the context assembler behind [`RagIndex`](rag::RagIndex).
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. The
//! durable JSON store, loaders, and server live in the `testweaver` app
//! crate.
//!
//! ## Pipeline
//!
//! ```text
//! loaders ──▶ chunk / openapi ──▶ DocumentStore::add
//!
//! query ──▶ RagIndex::retrieve_context
//!              ├─ search (primary)
//!              ├─ search (fallback query)
//!              └─ context::assemble_context ──▶ prompt text
//! ```

pub mod chunk;
pub mod context;
pub mod models;
pub mod openapi;
pub mod rag;
pub mod search;
pub mod store;
