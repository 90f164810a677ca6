//! HTTP API.
//!
//! Exposes chat, test generation, ingestion and store inspection as a JSON
//! API for the TestWeaver web UI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/chat` | Chat turn with optional RAG grounding |
//! | `POST`   | `/generate-tests` | Generate a test class for one source file |
//! | `GET`    | `/generate-tests/stream` | Same, as Server-Sent Events |
//! | `POST`   | `/ingest/pdf` | Multipart PDF upload |
//! | `POST`   | `/ingest/swagger?url=` | Fetch and ingest an OpenAPI spec |
//! | `GET`    | `/rag/search?q=&top_k=` | Raw lexical hits |
//! | `GET`    | `/rag/docs?limit=` | Chunk summaries |
//! | `GET`    | `/rag/chunks?limit=` | Chunk previews |
//! | `DELETE` | `/rag/docs/{doc_id}` | Delete one chunk id |
//! | `DELETE` | `/rag/docs?doc_id=` | Delete one id, or everything when absent |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Document not found: pdf:a.pdf:chunk:9" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream` (502),
//! `internal` (500). Failures of the model server, the Git adapter, or a
//! remote spec URL are `upstream`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser UI can be
//! served from a different port.

use std::convert::Infallible;
use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use testweaver_core::models::{preview, Meta, SearchHit};
use testweaver_core::rag::RagIndex;

use crate::agent::{GenerateOptions, GenerationResult, ProgressEvent, TestWeaverAgent};
use crate::config::Config;
use crate::extract::ExtractError;
use crate::git::GitError;
use crate::ingest::{ingest_openapi, ingest_pdf};
use crate::llm::LlmError;
use crate::swagger::fetch_openapi;

/// Top-k used for the `rag_hits` shown next to chat and generation replies.
const RAG_HITS_TOP_K: usize = 5;
const RAG_HIT_PREVIEW_CHARS: usize = 400;
const DOC_PREVIEW_CHARS: usize = 200;
const DEFAULT_DOCS_LIMIT: usize = 100;
const DEFAULT_CHUNKS_LIMIT: usize = 20;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    agent: TestWeaverAgent,
}

impl AppState {
    pub fn new(config: Config, agent: TestWeaverAgent) -> Self {
        Self {
            config: Arc::new(config),
            agent,
        }
    }

    fn index(&self) -> &RagIndex {
        self.agent.index()
    }
}

/// All routes with CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/generate-tests", post(handle_generate))
        .route("/generate-tests/stream", get(handle_generate_stream))
        .route("/ingest/pdf", post(handle_ingest_pdf))
        .route("/ingest/swagger", post(handle_ingest_swagger))
        .route("/rag/search", get(handle_search))
        .route(
            "/rag/docs",
            get(handle_list_docs).delete(handle_delete_docs),
        )
        .route("/rag/docs/{*doc_id}", axum::routing::delete(handle_delete_doc))
        .route("/rag/chunks", get(handle_list_chunks))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let agent = TestWeaverAgent::from_config(config)?;
    let bind_addr = config.server.bind.clone();
    let app = build_router(AppState::new(config.clone(), agent));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    println!("TestWeaver server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Map an error to a status by the typed errors found in its chain.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        if err.chain().any(|c| c.is::<ExtractError>()) {
            bad_request(message)
        } else if err.chain().any(|c| {
            c.is::<LlmError>() || c.is::<GitError>() || c.is::<reqwest::Error>()
        }) {
            upstream(message)
        } else {
            error!(error = %message, "request failed");
            internal(message)
        }
    }
}

// ============ Shared shapes ============

/// Retrieval hit as shown in the UI.
#[derive(Debug, Serialize)]
struct RagHit {
    doc_id: String,
    score: Option<f64>,
    meta: Meta,
    text_preview: String,
}

impl From<SearchHit> for RagHit {
    fn from(hit: SearchHit) -> Self {
        Self {
            text_preview: preview(&hit.text, RAG_HIT_PREVIEW_CHARS),
            doc_id: hit.doc_id,
            score: hit.score,
            meta: hit.meta,
        }
    }
}

fn rag_hits(index: &RagIndex, query: &str) -> Result<Vec<RagHit>, AppError> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(index
        .search(query, RAG_HITS_TOP_K)?
        .into_iter()
        .map(RagHit::from)
        .collect())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
    #[serde(default)]
    query_for_rag: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    rag_hits: Vec<RagHit>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let rag_query = req.query_for_rag.as_deref().unwrap_or(&req.message);
    let hits = rag_hits(state.index(), rag_query)?;

    let reply = state
        .agent
        .chat(&req.session_id, &req.message, req.query_for_rag.as_deref())
        .await?;

    Ok(Json(ChatResponse {
        reply,
        rag_hits: hits,
    }))
}

// ============ POST /generate-tests ============

#[derive(Deserialize)]
struct GenerateRequest {
    session_id: String,
    service_path: String,
    #[serde(default)]
    extra_instructions: Option<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    #[serde(flatten)]
    result: GenerationResult,
    rag_hits: Vec<RagHit>,
    rag_query: String,
}

fn generate_options(config: &Config) -> GenerateOptions {
    GenerateOptions {
        compile_after: true,
        max_attempts: config.agent.max_attempts,
    }
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    if req.service_path.trim().is_empty() {
        return Err(bad_request("service_path must not be empty"));
    }
    let extra = req.extra_instructions.unwrap_or_default();

    let rag_query = format!("{}\n{}", req.service_path, extra).trim().to_string();
    let hits = rag_hits(state.index(), &rag_query)?;

    let result = state
        .agent
        .generate_tests_for_file(
            &req.session_id,
            &req.service_path,
            &extra,
            generate_options(&state.config),
            None,
        )
        .await?;

    Ok(Json(GenerateResponse {
        result,
        rag_hits: hits,
        rag_query,
    }))
}

// ============ GET /generate-tests/stream ============

#[derive(Deserialize)]
struct StreamParams {
    service_path: String,
    #[serde(default)]
    extra_instructions: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Runs generation in a background task and forwards its progress events.
///
/// Without a `session_id` each stream gets a fresh session that is dropped
/// from history when the stream ends. The stream ends after the `done` (or
/// `error`) event.
async fn handle_generate_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if params.service_path.trim().is_empty() {
        return Err(bad_request("service_path must not be empty"));
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let options = generate_options(&state.config);
    tokio::spawn(stream_generation(state.agent, params, options, tx));

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let sse = Event::default()
            .event(event.name())
            .data(serde_json::to_string(&event).unwrap_or_default());
        Some((Ok(sse), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Body of the stream task. Returns the session id it ran under.
async fn stream_generation(
    agent: TestWeaverAgent,
    params: StreamParams,
    options: GenerateOptions,
    tx: UnboundedSender<ProgressEvent>,
) -> String {
    let anonymous = params.session_id.is_none();
    let session_id = params
        .session_id
        .unwrap_or_else(|| format!("stream-{}", uuid::Uuid::new_v4()));

    let outcome = agent
        .generate_tests_for_file(
            &session_id,
            &params.service_path,
            &params.extra_instructions,
            options,
            Some(&tx),
        )
        .await;
    if let Err(e) = outcome {
        let _ = tx.send(ProgressEvent::Error {
            message: format!("{:#}", e),
        });
    }
    if anonymous {
        agent.history().clear(&session_id);
    }
    session_id
}

// ============ POST /ingest/pdf ============

async fn handle_ingest_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut session_id = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("session_id") => {
                session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?,
                );
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .and_then(|n| FsPath::new(n).file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or_else(|| bad_request("file field must carry a file name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(e.to_string()))?;
                upload = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let session_id = session_id.ok_or_else(|| bad_request("missing field: session_id"))?;
    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing field: file"))?;

    let upload_dir = &state.config.server.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", upload_dir.display()))?;
    let saved = upload_dir.join(&filename);
    tokio::fs::write(&saved, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", saved.display()))?;

    let index = state.index().clone();
    let chunking = state.config.chunking.clone();
    let report =
        blocking(move || ingest_pdf(&index, &bytes, &filename, &session_id, &chunking)).await?;

    info!(file = %report.source, chunks = report.chunks, "PDF uploaded");
    Ok(Json(json!({"status": "ok", "chunks": report.chunks})))
}

// ============ POST /ingest/swagger ============

#[derive(Deserialize)]
struct SwaggerParams {
    url: String,
}

async fn handle_ingest_swagger(
    State(state): State<AppState>,
    Query(params): Query<SwaggerParams>,
) -> Result<Json<Value>, AppError> {
    if params.url.trim().is_empty() {
        return Err(bad_request("url must not be empty"));
    }
    let spec = fetch_openapi(&params.url, state.config.swagger.timeout_secs).await?;
    let index = state.index().clone();
    let service_name = state.config.swagger.service_name.clone();
    let report =
        blocking(move || ingest_openapi(&index, &spec, &params.url, &service_name)).await?;
    Ok(Json(json!({"ok": true, "chunks_ingested": report.chunks})))
}

// ============ GET /rag/search ============

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    top_k: Option<i64>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let top_k = params
        .top_k
        .map(|k| k.max(0) as usize)
        .unwrap_or(state.config.retrieval.top_k);
    let hits = state.index().search(&params.q, top_k)?;
    Ok(Json(json!({"query": params.q, "hits": hits})))
}

// ============ GET /rag/docs, /rag/chunks ============

#[derive(Deserialize)]
struct LimitParams {
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_list_docs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_DOCS_LIMIT);
    let docs = state.index().list(limit, DOC_PREVIEW_CHARS)?;
    Ok(Json(json!({"limit": limit, "count": docs.len(), "docs": docs})))
}

#[derive(Serialize)]
struct ChunkPreview {
    doc_id: String,
    meta: Meta,
    text_preview: String,
}

async fn handle_list_chunks(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_CHUNKS_LIMIT);
    let chunks: Vec<ChunkPreview> = state
        .index()
        .list(limit, state.config.retrieval.preview_chars)?
        .into_iter()
        .map(|s| ChunkPreview {
            doc_id: s.doc_id,
            meta: s.meta,
            text_preview: s.preview,
        })
        .collect();
    Ok(Json(json!({"count": chunks.len(), "chunks": chunks})))
}

// ============ DELETE /rag/docs ============

async fn delete_one(index: &RagIndex, doc_id: String) -> Result<Json<Value>, AppError> {
    let deleted = {
        let index = index.clone();
        let doc_id = doc_id.clone();
        blocking(move || index.delete(Some(doc_id.as_str()))).await?
    };
    if !deleted {
        return Err(not_found(format!("Document not found: {}", doc_id)));
    }
    Ok(Json(json!({"deleted": true, "doc_id": doc_id})))
}

async fn handle_delete_doc(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    delete_one(state.index(), doc_id).await
}

#[derive(Deserialize)]
struct DeleteParams {
    #[serde(default)]
    doc_id: Option<String>,
}

async fn handle_delete_docs(
    State(state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Value>, AppError> {
    match params.doc_id.filter(|id| !id.is_empty()) {
        Some(doc_id) => delete_one(state.index(), doc_id).await,
        None => {
            let index = state.index().clone();
            let ok = blocking(move || index.delete(None)).await?;
            info!("deleted all chunks");
            Ok(Json(json!({"deleted_all": true, "ok": ok})))
        }
    }
}

/// Run a store write off the async workers; every write rewrites `index.json`.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal(format!("store task failed: {}", e)))?;
    Ok(result?)
}
