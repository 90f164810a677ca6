//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! Secrets (LLM key, Git token) are never read from the file; the config
//! only names the environment variables that hold them.
//!
//! ```toml
//! [store]
//! root = "./data/vector_store"
//!
//! [chunking]
//! max_chars = 1200
//! overlap_chars = 200
//!
//! [retrieval]
//! top_k = 5
//! fallback_query = "account transaction balance error"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [llm]
//! base_url = "http://localhost:8000/v1"
//! model = "llama-3.1-8b-instruct"
//!
//! [git]
//! endpoint = "http://localhost:9000/git-mcp"
//! repo = "moor-sun/svc-accounting"
//!
//! [agent.runner]
//! command = "mvn -q test"
//! test_file = "./workspace/src/test/java/GeneratedTest.java"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use testweaver_core::context::DEFAULT_FALLBACK_QUERY;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub swagger: SwaggerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding `index.json`.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./data/vector_store")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1200
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_fallback_query")]
    pub fallback_query: String,
    /// Preview length for `/rag/chunks` and `docs list`.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fallback_query: default_fallback_query(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_fallback_query() -> String {
    DEFAULT_FALLBACK_QUERY.to_string()
}
fn default_preview_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Where uploaded PDFs are kept.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/docs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Environment variable holding the bearer key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            api_key_env: default_llm_api_key_env(),
        }
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_llm_model() -> String {
    "llama-3.1-8b-instruct".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_llm_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_git_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_git_repo")]
    pub repo: String,
    #[serde(default = "default_git_token_env")]
    pub token_env: String,
    #[serde(default = "default_git_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            endpoint: default_git_endpoint(),
            repo: default_git_repo(),
            token_env: default_git_token_env(),
            timeout_secs: default_git_timeout_secs(),
        }
    }
}

fn default_git_endpoint() -> String {
    "http://localhost:9000/git-mcp".to_string()
}
fn default_git_repo() -> String {
    "moor-sun/svc-accounting".to_string()
}
fn default_git_token_env() -> String {
    "GIT_TOKEN".to_string()
}
fn default_git_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SwaggerConfig {
    /// Recorded as `meta.service` on every spec chunk.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_swagger_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SwaggerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            timeout_secs: default_swagger_timeout_secs(),
        }
    }
}

fn default_service_name() -> String {
    "svc-accounting".to_string()
}
fn default_swagger_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Directory with `system_agent.md` / `test_generation.md` overrides.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Most recent history messages replayed per request (0 = all).
    #[serde(default)]
    pub history_window: usize,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            prompts_dir: None,
            max_attempts: default_max_attempts(),
            history_window: 0,
            runner: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Compile/test command run against each generated test class.
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Shell command; exit status 0 means the tests compiled and passed.
    pub command: String,
    /// File the generated test code is written to before running.
    pub test_file: PathBuf,
    /// Working directory for `command` (defaults to the current one).
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default = "default_runner_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_runner_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `testweaver=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// All-defaults configuration, for commands that run without a file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Range checks that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!(
            "chunking.overlap_chars ({}) must be < chunking.max_chars ({})",
            config.chunking.overlap_chars,
            config.chunking.max_chars
        );
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.agent.max_attempts < 1 {
        anyhow::bail!("agent.max_attempts must be >= 1");
    }

    if let Some(runner) = &config.agent.runner {
        if runner.command.trim().is_empty() {
            anyhow::bail!("agent.runner.command must not be empty");
        }
    }

    Ok(())
}
