//! End-to-end tests of the HTTP API.
//!
//! Each test starts an in-process upstream stub (model server, Git adapter,
//! and an OpenAPI document) plus the real TestWeaver server, both on free
//! local ports, and talks to them over HTTP.

use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;

use testweaver::config::Config;
use testweaver::git::{GitAdapterClient, SourceRepository};
use testweaver::server::run_server;

const GENERATED: &str = "```java\nclass AccountServiceTest {}\n```";

// ─── Upstream stub ──────────────────────────────────────────────────

type Seen = Arc<Mutex<Vec<Value>>>;

async fn stub_chat(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body);
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": GENERATED}}]
    }))
}

async fn stub_file(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let path = body["path"].as_str().unwrap_or_default();
    if path.contains("Missing") {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let source = "package com.acme;\npublic class AccountService {\n  void debit(long amount) {}\n}\n";
    let encoded = base64::engine::general_purpose::STANDARD.encode(source);
    Ok(Json(json!({"file": {"content": encoded, "encoding": "base64"}})))
}

async fn stub_list(Json(body): Json<Value>) -> Json<Value> {
    let base = body["base_path"].as_str().unwrap_or_default();
    let files: Vec<String> = if body["ext"] == ".java" {
        ["AccountService.java", "LedgerService.java"]
            .iter()
            .map(|f| format!("{}/com/acme/{}", base, f))
            .collect()
    } else {
        Vec::new()
    };
    Json(json!({"files": files}))
}

async fn stub_pr_diff(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    match body["pr_number"].as_u64() {
        Some(42) => Ok(Json(json!({
            "diff": "--- a/AccountService.java\n+++ b/AccountService.java\n+  void credit(long amount) {}\n"
        }))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn stub_openapi() -> Json<Value> {
    Json(json!({
        "openapi": "3.0.1",
        "info": {"title": "svc-accounting", "version": "1.0"},
        "paths": {
            "/accounts/{id}": {
                "get": {
                    "operationId": "getAccount",
                    "summary": "Fetch an account balance",
                    "parameters": [{"name": "id", "in": "path", "required": true}],
                    "responses": {"200": {"description": "account found"}}
                }
            },
            "/accounts/{id}/debit": {
                "post": {
                    "operationId": "debitAccount",
                    "summary": "Debit an account; rejects overdrafts",
                    "responses": {"400": {"description": "insufficient balance"}}
                }
            }
        },
        "components": {"schemas": {"Account": {"type": "object"}}}
    }))
}

async fn start_upstream() -> (u16, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1/chat/completions", post(stub_chat))
        .route("/git-mcp/file", post(stub_file))
        .route("/git-mcp/list", post(stub_list))
        .route("/git-mcp/pr-diff", post(stub_pr_diff))
        .route("/v3/api-docs", get(stub_openapi))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (port, seen)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

fn test_config(tmp: &TempDir, port: u16, upstream: u16) -> Config {
    toml::from_str(&test_config_toml(tmp, port, upstream)).unwrap()
}

fn test_config_toml(tmp: &TempDir, port: u16, upstream: u16) -> String {
    let root = tmp.path().display();
    format!(
        r#"[store]
root = "{root}/store"

[server]
bind = "127.0.0.1:{port}"
upload_dir = "{root}/uploads"

[llm]
base_url = "http://127.0.0.1:{upstream}/v1"
max_retries = 0

[git]
endpoint = "http://127.0.0.1:{upstream}/git-mcp"
"#
    )
}

struct Harness {
    _tmp: TempDir,
    base: String,
    seen: Seen,
    client: reqwest::Client,
    upstream: u16,
}

async fn start() -> Harness {
    let (upstream, seen) = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = test_config(&tmp, port, upstream);

    tokio::spawn(async move {
        run_server(&cfg).await.ok();
    });
    wait_for_server(port).await;

    Harness {
        _tmp: tmp,
        base: format!("http://127.0.0.1:{}", port),
        seen,
        client: reqwest::Client::new(),
        upstream,
    }
}

impl Harness {
    async fn ingest_swagger(&self) -> Value {
        let spec_url = format!("http://127.0.0.1:{}/v3/api-docs", self.upstream);
        let resp = self
            .client
            .post(format!("{}/ingest/swagger", self.base))
            .query(&[("url", spec_url.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "GET {}", path);
        resp.json().await.unwrap()
    }
}

/// Minimal single-page PDF showing `phrase`.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let h = start().await;
    let body = h.get_json("/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_swagger_ingest_search_and_delete() {
    let h = start().await;

    let body = h.ingest_swagger().await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["chunks_ingested"], 3);

    let body = h.get_json("/rag/search?q=debitAccount").await;
    let hits = body["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["doc_id"], "swagger::op::POST::/accounts/{id}/debit");
    assert_eq!(hits[0]["meta"]["type"], "operation");

    let body = h.get_json("/rag/docs").await;
    assert_eq!(body["limit"], 100);
    assert_eq!(body["count"], 3);

    let body = h.get_json("/rag/chunks?limit=2").await;
    assert_eq!(body["count"], 2);
    assert!(body["chunks"][0]["text_preview"].as_str().unwrap().len() <= 300);

    // Single delete, then the same id again is a 404.
    let url = format!("{}/rag/docs/swagger::schema::Account", h.base);
    let resp = h.client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"deleted": true, "doc_id": "swagger::schema::Account"}));

    let resp = h.client.delete(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    // Query-parameter form.
    let resp = h
        .client
        .delete(format!("{}/rag/docs", h.base))
        .query(&[("doc_id", "swagger::op::GET::/accounts/{id}")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(h.get_json("/rag/docs").await["count"], 1);

    // No doc_id deletes everything.
    let resp = h
        .client
        .delete(format!("{}/rag/docs", h.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"deleted_all": true, "ok": true}));
    assert_eq!(h.get_json("/rag/docs").await["count"], 0);
}

#[tokio::test]
async fn test_search_edge_cases() {
    let h = start().await;
    h.ingest_swagger().await;

    // Only short tokens: nothing to score.
    let body = h.get_json("/rag/search?q=a%20to%20be").await;
    assert!(body["hits"].as_array().unwrap().is_empty());

    // Negative top_k is treated as zero.
    let body = h.get_json("/rag/search?q=account&top_k=-3").await;
    assert!(body["hits"].as_array().unwrap().is_empty());

    let body = h.get_json("/rag/search?q=account&top_k=1").await;
    assert_eq!(body["hits"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_swagger_ingest_unreachable_is_upstream_error() {
    let h = start().await;
    let dead = find_free_port();
    let resp = h
        .client
        .post(format!("{}/ingest/swagger", h.base))
        .query(&[("url", format!("http://127.0.0.1:{}/v3/api-docs", dead))])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream");
}

#[tokio::test]
async fn test_pdf_upload() {
    let h = start().await;

    let form = reqwest::multipart::Form::new()
        .text("session_id", "s1")
        .part(
            "file",
            reqwest::multipart::Part::bytes(minimal_pdf_with_phrase("ledger reconciliation rules"))
                .file_name("guide.pdf")
                .mime_str("application/pdf")
                .unwrap(),
        );
    let resp = h
        .client
        .post(format!("{}/ingest/pdf", h.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "chunks": 1}));

    let body = h.get_json("/rag/search?q=reconciliation").await;
    let hits = body["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["doc_id"], "pdf:guide.pdf:chunk:0");
    assert_eq!(hits[0]["meta"]["session_id"], "s1");
    assert_eq!(hits[0]["meta"]["total_chunks"], 1);
    assert!(h._tmp.path().join("uploads").join("guide.pdf").exists());
}

#[tokio::test]
async fn test_pdf_upload_rejects_garbage() {
    let h = start().await;
    let form = reqwest::multipart::Form::new()
        .text("session_id", "s1")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"not a pdf at all".to_vec()).file_name("bad.pdf"),
        );
    let resp = h
        .client
        .post(format!("{}/ingest/pdf", h.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(h.get_json("/rag/docs").await["count"], 0);
}

#[tokio::test]
async fn test_chat_returns_reply_and_hits() {
    let h = start().await;
    h.ingest_swagger().await;

    let resp = h
        .client
        .post(format!("{}/chat", h.base))
        .json(&json!({
            "session_id": "s1",
            "message": "How are overdrafts handled?",
            "query_for_rag": "debit overdrafts"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reply"], GENERATED);
    let hits = body["rag_hits"].as_array().unwrap();
    assert_eq!(hits[0]["doc_id"], "swagger::op::POST::/accounts/{id}/debit");
    assert!(hits[0]["text_preview"].is_string());

    let seen = h.seen.lock().unwrap();
    let messages = seen[0]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[1]["content"]
        .as_str()
        .unwrap()
        .starts_with("<context>\n[SOURCE swagger | DOC swagger::op::POST::/accounts/{id}/debit]"));
    assert_eq!(messages[2]["content"], "How are overdrafts handled?");
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let h = start().await;
    let resp = h
        .client
        .post(format!("{}/chat", h.base))
        .json(&json!({"session_id": "s1", "message": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_generate_tests() {
    let h = start().await;
    h.ingest_swagger().await;

    let resp = h
        .client
        .post(format!("{}/generate-tests", h.base))
        .json(&json!({
            "session_id": "s1",
            "service_path": "src/main/java/com/acme/AccountService.java",
            "extra_instructions": "cover debit overdrafts"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service_path"], "src/main/java/com/acme/AccountService.java");
    assert_eq!(body["test_code"], "class AccountServiceTest {}");
    assert_eq!(body["success"], true);
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["attempt_log"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["rag_query"],
        "src/main/java/com/acme/AccountService.java\ncover debit overdrafts"
    );
    assert!(body["rag_hits"].is_array());

    // The decoded source reached the model.
    let seen = h.seen.lock().unwrap();
    let messages = seen[0]["messages"].as_array().unwrap();
    let prompt = messages.last().unwrap()["content"].as_str().unwrap();
    assert!(prompt.contains("public class AccountService {"));
    assert!(prompt.contains("<context_from_docs>\n[SOURCE swagger"));
}

#[tokio::test]
async fn test_generate_tests_git_failure_is_upstream() {
    let h = start().await;
    let resp = h
        .client
        .post(format!("{}/generate-tests", h.base))
        .json(&json!({"session_id": "s1", "service_path": "src/Missing.java"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream");
    assert!(h.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_tests_stream() {
    let h = start().await;
    let resp = h
        .client
        .get(format!("{}/generate-tests/stream", h.base))
        .query(&[("service_path", "src/main/java/com/acme/AccountService.java")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let text = resp.text().await.unwrap();
    let start = text.find("event: start").unwrap();
    let attempt = text.find("event: attempt").unwrap();
    let done = text.find("event: done").unwrap();
    assert!(start < attempt && attempt < done);
    assert!(text.contains("\"stage\":\"done\""));
    assert!(text.contains("class AccountServiceTest {}"));
}

#[tokio::test]
async fn test_generate_tests_stream_reports_errors() {
    let h = start().await;
    let resp = h
        .client
        .get(format!("{}/generate-tests/stream", h.base))
        .query(&[("service_path", "src/Missing.java")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("event: start"));
    assert!(text.contains("event: error"));
    assert!(!text.contains("event: done"));
}

#[tokio::test]
async fn test_store_survives_restart() {
    let (upstream, _seen) = start_upstream().await;
    let tmp = TempDir::new().unwrap();

    let port = find_free_port();
    let cfg = test_config(&tmp, port, upstream);
    let server = tokio::spawn(async move {
        run_server(&cfg).await.ok();
    });
    wait_for_server(port).await;

    let client = reqwest::Client::new();
    let spec_url = format!("http://127.0.0.1:{}/v3/api-docs", upstream);
    client
        .post(format!("http://127.0.0.1:{}/ingest/swagger", port))
        .query(&[("url", spec_url.as_str())])
        .send()
        .await
        .unwrap();
    server.abort();

    let port2 = find_free_port();
    let cfg2 = test_config(&tmp, port2, upstream);
    tokio::spawn(async move {
        run_server(&cfg2).await.ok();
    });
    wait_for_server(port2).await;

    let body: Value = client
        .get(format!("http://127.0.0.1:{}/rag/docs", port2))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 3);
    assert!(tmp.path().join("store").join("index.json").exists());
}

// ─── Git adapter ────────────────────────────────────────────────────

fn testweaver_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("testweaver");
    path
}

async fn run_testweaver(config_path: &std::path::Path, args: &[&str]) -> (String, String, bool) {
    let output = tokio::process::Command::new(testweaver_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("TESTWEAVER_LOG_LEVEL")
        .output()
        .await
        .unwrap();
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[tokio::test]
async fn test_git_client_list_and_diff() {
    let (upstream, _) = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, find_free_port(), upstream);
    let client = GitAdapterClient::new(&cfg.git).unwrap();

    let files = client.list_java_files("src/main/java").await.unwrap();
    assert_eq!(
        files,
        vec![
            "src/main/java/com/acme/AccountService.java",
            "src/main/java/com/acme/LedgerService.java"
        ]
    );

    let diff = client.get_pr_diff(42).await.unwrap();
    assert!(diff.contains("+  void credit(long amount) {}"));
    assert!(client.get_pr_diff(7).await.is_err());
}

#[tokio::test]
async fn test_git_cli_commands() {
    let (upstream, _) = start_upstream().await;
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("testweaver.toml");
    std::fs::write(&config_path, test_config_toml(&tmp, find_free_port(), upstream)).unwrap();

    let (stdout, _, success) = run_testweaver(&config_path, &["git", "list"]).await;
    assert!(success);
    assert!(stdout.contains("  src/main/java/com/acme/AccountService.java"));
    assert!(stdout.contains("2 file(s)"));

    let (stdout, _, success) = run_testweaver(&config_path, &["git", "diff", "42"]).await;
    assert!(success);
    assert!(stdout.starts_with("--- a/AccountService.java"));

    let (_, stderr, success) = run_testweaver(&config_path, &["git", "diff", "7"]).await;
    assert!(!success);
    assert!(stderr.contains("git adapter request failed"));
}
