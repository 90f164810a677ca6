//! Ingestion entry points: PDF documents and OpenAPI specs.
//!
//! Each entry point turns one source into chunks and adds them to the
//! [`RagIndex`] as a single batch:
//!
//! | Source | Chunking | `doc_id` |
//! |--------|----------|----------|
//! | PDF | character windows | `pdf:<filename>:chunk:<i>` |
//! | OpenAPI | one per operation / schema | `swagger::op::<METHOD>::<path>`, `swagger::schema::<name>` |
//!
//! Errors (extraction, network, persistence) propagate to the caller. A
//! failed batch stores nothing, so the store keeps its previous contents.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use testweaver_core::chunk::chunk_chars;
use testweaver_core::models::{Chunk, Meta};
use testweaver_core::openapi::{openapi_to_chunks, summarise_openapi};
use testweaver_core::rag::RagIndex;

use crate::config::{ChunkingConfig, Config, SwaggerConfig};
use crate::extract::{extract_text, MIME_PDF};
use crate::store::open_index;
use crate::swagger::fetch_openapi;

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// File name or spec URL.
    pub source: String,
    pub chunks: usize,
    pub doc_ids: Vec<String>,
}

/// Extract, window, and store a PDF.
pub fn ingest_pdf(
    index: &RagIndex,
    bytes: &[u8],
    filename: &str,
    session_id: &str,
    chunking: &ChunkingConfig,
) -> Result<IngestReport> {
    let text = extract_text(bytes, MIME_PDF)
        .with_context(|| format!("Failed to extract text from {}", filename))?;
    ingest_pdf_text(index, &text, filename, session_id, chunking)
}

/// Window and store text already extracted from a PDF.
pub fn ingest_pdf_text(
    index: &RagIndex,
    text: &str,
    filename: &str,
    session_id: &str,
    chunking: &ChunkingConfig,
) -> Result<IngestReport> {
    // Windows of pure whitespace carry nothing to retrieve.
    let windows: Vec<&str> = chunk_chars(text, chunking.max_chars, chunking.overlap_chars)
        .filter(|w| !w.trim().is_empty())
        .collect();
    let total = windows.len();

    let chunks: Vec<Chunk> = windows
        .into_iter()
        .enumerate()
        .map(|(i, window)| {
            Chunk::new(
                format!("pdf:{}:chunk:{}", filename, i),
                window,
                meta(json!({
                    "type": "pdf",
                    "session_id": session_id,
                    "filename": filename,
                    "chunk_index": i,
                    "total_chunks": total,
                })),
            )
        })
        .collect();
    let doc_ids = chunks.iter().map(|c| c.doc_id.clone()).collect();
    index.ingest_batch(chunks)?;

    info!(filename, chunks = total, "ingested PDF");
    Ok(IngestReport {
        source: filename.to_string(),
        chunks: total,
        doc_ids,
    })
}

/// Fetch an OpenAPI document and store one chunk per operation and schema.
pub async fn ingest_swagger(
    index: &RagIndex,
    url: &str,
    config: &SwaggerConfig,
) -> Result<IngestReport> {
    let spec = fetch_openapi(url, config.timeout_secs).await?;
    ingest_openapi(index, &spec, url, &config.service_name)
}

/// Store the semantic chunks of an already-parsed OpenAPI document.
pub fn ingest_openapi(
    index: &RagIndex,
    spec: &Value,
    url: &str,
    service_name: &str,
) -> Result<IngestReport> {
    let chunks = openapi_to_chunks(spec, url, service_name);
    let doc_ids: Vec<String> = chunks.iter().map(|c| c.doc_id.clone()).collect();
    index.ingest_batch(chunks.into_iter().map(Chunk::from).collect())?;

    info!(url, chunks = doc_ids.len(), "ingested OpenAPI spec");
    Ok(IngestReport {
        source: url.to_string(),
        chunks: doc_ids.len(),
        doc_ids,
    })
}

fn meta(value: Value) -> Meta {
    match value {
        Value::Object(map) => map,
        _ => Meta::new(),
    }
}

// ============ CLI commands ============

/// `testweaver ingest pdf <file>`.
pub fn run_ingest_pdf(config: &Config, path: &Path, session_id: &str) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let index = open_index(config)?;
    let report = ingest_pdf(&index, &bytes, &filename, session_id, &config.chunking)?;

    println!("ingest pdf {}", report.source);
    println!("  chunks: {}", report.chunks);
    println!("ok");
    Ok(())
}

/// `testweaver ingest swagger <url>`.
pub async fn run_ingest_swagger(config: &Config, url: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        let spec = fetch_openapi(url, config.swagger.timeout_secs).await?;
        let chunks = openapi_to_chunks(&spec, url, &config.swagger.service_name);
        println!("{}", summarise_openapi(&spec));
        println!("ingest swagger {} (dry-run)", url);
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    let index = open_index(config)?;
    let report = ingest_swagger(&index, url, &config.swagger).await?;

    println!("ingest swagger {}", report.source);
    println!("  chunks: {}", report.chunks);
    println!("ok");
    Ok(())
}
