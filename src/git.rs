//! Client for the Git adapter service.
//!
//! The adapter is a small HTTP service in front of the source repository
//! (default `http://localhost:9000/git-mcp`). Three endpoints are used,
//! all `POST` with a JSON body naming the repo:
//!
//! | Endpoint | Body | Response |
//! |----------|------|----------|
//! | `/file` | `{repo, path}` | file content, in one of several shapes |
//! | `/list` | `{repo, base_path, ext}` | `{files: [...]}` |
//! | `/pr-diff` | `{repo, pr_number}` | `{diff}` |
//!
//! The `/file` response shape differs between adapter versions, so
//! [`normalize_file_content`] accepts all of them.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, GitConfig};

/// Where `git list` looks when no base path is given.
pub const DEFAULT_JAVA_BASE_PATH: &str = "src/main/java";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git adapter request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode base64 content from git adapter: {0}")]
    Decode(String),
    #[error("unexpected response from git adapter: {0}")]
    UnexpectedResponse(String),
}

/// Read access to the repository under test.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Full text of the file at `path`.
    async fn get_file(&self, path: &str) -> Result<String, GitError>;

    /// Paths of `.java` files under `base_path`.
    async fn list_java_files(&self, base_path: &str) -> Result<Vec<String>, GitError>;

    /// Unified diff of a pull request.
    async fn get_pr_diff(&self, pr_number: u64) -> Result<String, GitError>;
}

/// [`SourceRepository`] backed by the Git adapter HTTP service.
pub struct GitAdapterClient {
    client: reqwest::Client,
    endpoint: String,
    repo: String,
    token: Option<String>,
}

impl GitAdapterClient {
    pub fn new(config: &GitConfig) -> Result<Self, GitError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token,
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    async fn post(&self, route: &str, body: Value) -> Result<reqwest::Response, GitError> {
        let url = format!("{}{}", self.endpoint, route);
        debug!(%url, "git adapter request");
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?.error_for_status()?)
    }
}

#[async_trait]
impl SourceRepository for GitAdapterClient {
    async fn get_file(&self, path: &str) -> Result<String, GitError> {
        let response = self
            .post("/file", json!({"repo": self.repo, "path": path}))
            .await?;
        let body = response.text().await?;
        normalize_file_content(&body).map_err(|e| match e {
            GitError::UnexpectedResponse(_) => {
                GitError::UnexpectedResponse(format!("empty body when fetching '{}'", path))
            }
            other => other,
        })
    }

    async fn list_java_files(&self, base_path: &str) -> Result<Vec<String>, GitError> {
        let response = self
            .post(
                "/list",
                json!({"repo": self.repo, "base_path": base_path, "ext": ".java"}),
            )
            .await?;
        let data: Value = response.json().await?;
        data.get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .ok_or_else(|| GitError::UnexpectedResponse("missing 'files' in /list response".into()))
    }

    async fn get_pr_diff(&self, pr_number: u64) -> Result<String, GitError> {
        let response = self
            .post("/pr-diff", json!({"repo": self.repo, "pr_number": pr_number}))
            .await?;
        let data: Value = response.json().await?;
        data.get("diff")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GitError::UnexpectedResponse("missing 'diff' in /pr-diff response".into()))
    }
}

// ============ CLI commands ============

/// `testweaver git list [base_path]`.
pub async fn run_git_list(config: &Config, base_path: &str) -> anyhow::Result<()> {
    let client = GitAdapterClient::new(&config.git)?;
    let files = client.list_java_files(base_path).await?;

    println!("{} {}", client.repo(), base_path);
    for file in &files {
        println!("  {}", file);
    }
    println!("{} file(s)", files.len());
    Ok(())
}

/// `testweaver git diff <pr_number>`.
pub async fn run_git_diff(config: &Config, pr_number: u64) -> anyhow::Result<()> {
    let client = GitAdapterClient::new(&config.git)?;
    let diff = client.get_pr_diff(pr_number).await?;
    if diff.is_empty() {
        println!("Empty diff.");
    } else {
        print!("{}", diff);
        if !diff.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

/// Pull the file text out of a `/file` response body.
///
/// Checked in order: top-level `content`; `content` nested under `file`,
/// `data`, or `result`; the first entry of `files`. An `encoding` of
/// `base64` next to the content is decoded. Any other body is returned
/// as-is, and an empty body is an error.
pub fn normalize_file_content(body: &str) -> Result<String, GitError> {
    if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(body) {
        let candidates = std::iter::once(Some(&data))
            .chain(
                ["file", "data", "result"]
                    .iter()
                    .map(|k| data.get(*k).and_then(Value::as_object)),
            )
            .chain(std::iter::once(
                data.get("files")
                    .and_then(Value::as_array)
                    .and_then(|files| files.first())
                    .and_then(Value::as_object),
            ))
            .flatten();

        for obj in candidates {
            if let Some(content) = obj.get("content").and_then(Value::as_str) {
                let is_base64 = obj.get("encoding").and_then(Value::as_str) == Some("base64");
                return if is_base64 {
                    decode_base64(content)
                } else {
                    Ok(content.to_string())
                };
            }
        }
    }

    if body.is_empty() {
        return Err(GitError::UnexpectedResponse("empty body".into()));
    }
    Ok(body.to_string())
}

fn decode_base64(content: &str) -> Result<String, GitError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| GitError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GitError::Decode(e.to_string()))
}
