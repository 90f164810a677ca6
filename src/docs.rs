//! CLI commands over the document store: search, context, list, delete.

use anyhow::{bail, Result};

use testweaver_core::context::source_label;
use testweaver_core::models::preview;

use crate::config::Config;
use crate::store::open_index;

const EXCERPT_CHARS: usize = 160;

/// `testweaver search <query>`.
pub fn run_search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let index = open_index(config)?;
    let hits = index.search(query, top_k.unwrap_or(config.retrieval.top_k))?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] {}",
            i + 1,
            hit.score.unwrap_or_default(),
            source_label(&hit.meta)
        );
        println!(
            "    excerpt: \"{}\"",
            preview(&hit.text, EXCERPT_CHARS).replace('\n', " ").trim()
        );
        println!("    id: {}", hit.doc_id);
        println!();
    }
    Ok(())
}

/// `testweaver context <query>`: the block a prompt would receive,
/// fallback query included.
pub fn run_context(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let index = open_index(config)?;
    let context = index.retrieve_context(query, top_k.unwrap_or(config.retrieval.top_k))?;
    if context.is_empty() {
        println!("No context.");
    } else {
        println!("{}", context);
    }
    Ok(())
}

/// `testweaver docs list`.
pub fn run_list(config: &Config, limit: usize) -> Result<()> {
    let index = open_index(config)?;
    let total = index.store().len()?;
    let docs = index.list(limit, config.retrieval.preview_chars)?;

    println!("{:<48} {:<10} {:>7}", "DOC_ID", "TYPE", "CHARS");
    for doc in &docs {
        let kind = doc.meta.get("type").and_then(|v| v.as_str()).unwrap_or("-");
        println!("{:<48} {:<10} {:>7}", doc.doc_id, kind, doc.length);
    }
    println!();
    println!("{} of {} chunk(s)", docs.len(), total);
    Ok(())
}

/// `testweaver docs delete [<doc_id>] [--all]`.
pub fn run_delete(config: &Config, doc_id: Option<&str>, all: bool) -> Result<()> {
    let target = match (doc_id.filter(|id| !id.is_empty()), all) {
        (Some(_), true) => bail!("pass either a doc_id or --all, not both"),
        (None, false) => bail!("pass a doc_id, or --all to delete every chunk"),
        (target, _) => target,
    };

    let index = open_index(config)?;
    match target {
        Some(id) => {
            if !index.delete(Some(id))? {
                bail!("doc_id not found: {}", id);
            }
            println!("deleted {}", id);
        }
        None => {
            index.delete(None)?;
            println!("deleted all chunks");
        }
    }
    Ok(())
}
