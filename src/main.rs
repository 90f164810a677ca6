//! # TestWeaver CLI (`testweaver`)
//!
//! ## Usage
//!
//! ```bash
//! testweaver --config ./config/testweaver.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `testweaver serve` | Start the HTTP API |
//! | `testweaver ingest pdf <file>` | Chunk and store a PDF |
//! | `testweaver ingest swagger <url>` | Fetch and store an OpenAPI spec |
//! | `testweaver search "<query>"` | Lexical search over stored chunks |
//! | `testweaver context "<query>"` | Print the context block a prompt would get |
//! | `testweaver docs list` | List stored chunks |
//! | `testweaver docs delete <doc_id>` | Delete a chunk id (`--all` for everything) |
//! | `testweaver chat "<message>"` | One chat turn with the agent |
//! | `testweaver generate <path>` | Generate a test class for a source file |
//! | `testweaver git list [base_path]` | List Java files in the configured repo |
//! | `testweaver git diff <pr>` | Print a pull request's diff |
//!
//! A missing config file falls back to built-in defaults; a config file
//! that exists but does not parse is an error.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use testweaver::config::{self, Config};
use testweaver::git::DEFAULT_JAVA_BASE_PATH;
use testweaver::{agent, docs, git, ingest, logging, server};

/// TestWeaver CLI: a RAG-grounded test-generation agent.
#[derive(Parser)]
#[command(
    name = "testweaver",
    about = "TestWeaver: documentation-grounded unit test generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/testweaver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Add a document to the store.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Search stored chunks.
    Search {
        query: String,

        /// Maximum number of hits (defaults to `[retrieval] top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print the context block retrieved for a query.
    Context {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Inspect or delete stored chunks.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Send one chat message to the agent.
    Chat {
        message: String,

        #[arg(long, default_value = "cli")]
        session: String,

        /// Query used to retrieve grounding context.
        #[arg(long)]
        rag_query: Option<String>,
    },

    /// Generate a JUnit test class for a source file in the configured repo.
    Generate {
        /// Repository path, e.g. `src/main/java/com/acme/AccountService.java`.
        service_path: String,

        #[arg(long, default_value = "")]
        instructions: String,

        /// Skip the configured compile/test runner.
        #[arg(long)]
        no_compile: bool,
    },

    /// Browse the repository through the Git adapter.
    Git {
        #[command(subcommand)]
        action: GitAction,
    },
}

#[derive(Subcommand)]
enum GitAction {
    /// List `.java` files under a directory.
    List {
        #[arg(default_value = DEFAULT_JAVA_BASE_PATH)]
        base_path: String,
    },

    /// Print the unified diff of a pull request.
    Diff { pr_number: u64 },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Extract, chunk, and store a PDF file.
    Pdf {
        file: PathBuf,

        #[arg(long, default_value = "cli")]
        session: String,
    },

    /// Fetch an OpenAPI/Swagger JSON document and store one chunk per
    /// operation and schema.
    Swagger {
        url: String,

        /// Fetch and chunk, but do not store.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List stored chunks.
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Delete a chunk id, or every chunk with `--all`.
    Delete {
        doc_id: Option<String>,

        #[arg(long)]
        all: bool,
    },
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_or_default(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Ingest { source } => match source {
            IngestSource::Pdf { file, session } => ingest::run_ingest_pdf(&cfg, &file, &session)?,
            IngestSource::Swagger { url, dry_run } => {
                ingest::run_ingest_swagger(&cfg, &url, dry_run).await?
            }
        },
        Commands::Search { query, top_k } => docs::run_search(&cfg, &query, top_k)?,
        Commands::Context { query, top_k } => docs::run_context(&cfg, &query, top_k)?,
        Commands::Docs { action } => match action {
            DocsAction::List { limit } => docs::run_list(&cfg, limit)?,
            DocsAction::Delete { doc_id, all } => docs::run_delete(&cfg, doc_id.as_deref(), all)?,
        },
        Commands::Chat {
            message,
            session,
            rag_query,
        } => agent::run_chat(&cfg, &message, &session, rag_query.as_deref()).await?,
        Commands::Generate {
            service_path,
            instructions,
            no_compile,
        } => agent::run_generate(&cfg, &service_path, &instructions, no_compile).await?,
        Commands::Git { action } => match action {
            GitAction::List { base_path } => git::run_git_list(&cfg, &base_path).await?,
            GitAction::Diff { pr_number } => git::run_git_diff(&cfg, pr_number).await?,
        },
    }

    Ok(())
}
