//! # TestWeaver
//!
//! A test-generation agent for Java services, grounded on the service's own
//! documentation.
//!
//! Domain guides (PDF) and OpenAPI specs are split into chunks and kept in a
//! durable JSON document store. When asked to write tests for a class, the
//! agent fetches the source through a Git adapter, retrieves the most
//! relevant chunks with a lexical search, and asks an OpenAI-compatible
//! model for a JUnit class, optionally compiling and re-prompting until the
//! tests pass.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ PDF / Swagger│──▶│  Chunking   │──▶│  index.json   │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │ lexical search
//!                    ┌────────────┐    ┌──────▼───────┐
//!                    │ Git adapter│───▶│    Agent     │──▶ LLM
//!                    └────────────┘    └──────┬───────┘
//!                                     ┌───────┴───────┐
//!                                     ▼               ▼
//!                                ┌─────────┐    ┌──────────┐
//!                                │   CLI   │    │   HTTP   │
//!                                └─────────┘    └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`store`] | Durable JSON document store |
//! | [`extract`] | PDF text extraction |
//! | [`swagger`] | OpenAPI document fetching |
//! | [`ingest`] | PDF and OpenAPI ingestion |
//! | [`docs`] | Store inspection commands |
//! | [`llm`] | Chat-completion client |
//! | [`git`] | Git adapter client |
//! | [`history`] | Conversation history |
//! | [`runner`] | Compile/test runner for generated code |
//! | [`agent`] | Chat and test generation |
//! | [`server`] | HTTP API |
//!
//! Chunking, retrieval and context assembly live in `testweaver-core`.

pub mod agent;
pub mod config;
pub mod docs;
pub mod extract;
pub mod git;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod runner;
pub mod server;
pub mod store;
pub mod swagger;

pub use testweaver_core as core;
