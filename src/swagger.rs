//! Fetching OpenAPI / Swagger documents over HTTP.
//!
//! A service usually publishes its spec at a URL such as
//! `http://localhost:8080/v3/api-docs`. The document is fetched once per
//! ingestion call; failures are returned, never retried.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;

/// GET `url` and parse the body as a JSON OpenAPI document.
///
/// Non-2xx responses, network errors, and non-JSON bodies are errors.
pub async fn fetch_openapi(url: &str, timeout_secs: u64) -> Result<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch OpenAPI spec from {}", url))?
        .error_for_status()
        .with_context(|| format!("OpenAPI spec request to {} failed", url))?;

    let spec: Value = response
        .json()
        .await
        .with_context(|| format!("OpenAPI spec at {} is not valid JSON", url))?;

    if !spec.is_object() {
        anyhow::bail!("OpenAPI spec at {} is not a JSON object", url);
    }
    Ok(spec)
}
