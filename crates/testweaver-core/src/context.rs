//! Context assembly: turning search hits into one prompt-ready text block.
//!
//! Each hit becomes a labelled block:
//!
//! ```text
//! [SOURCE swagger | DOC swagger::op::GET::/accounts/{id}]
//! <full chunk text>
//! ```
//!
//! Blocks are joined with a horizontal rule, in hit order.

use crate::models::{Meta, SearchHit};

/// Domain-default query used when the caller's query matches nothing.
pub const DEFAULT_FALLBACK_QUERY: &str = "account transaction balance error";

/// Separator placed between formatted blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Meta keys consulted, in order, for a block's source label.
const SOURCE_LABEL_KEYS: [&str; 3] = ["source", "file_path", "type"];

/// Descriptive label for a chunk: `source`, else `file_path`, else `type`,
/// else `"unknown"`. Empty strings and non-string values are skipped.
pub fn source_label(meta: &Meta) -> &str {
    SOURCE_LABEL_KEYS
        .iter()
        .filter_map(|k| meta.get(*k).and_then(|v| v.as_str()))
        .find(|v| !v.is_empty())
        .unwrap_or("unknown")
}

/// Format a single hit with its header line and full, untruncated text.
pub fn format_hit(hit: &SearchHit) -> String {
    format!(
        "[SOURCE {} | DOC {}]\n{}",
        source_label(&hit.meta),
        hit.doc_id,
        hit.text
    )
}

/// Format and join all hits. No hits → empty string.
pub fn assemble_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(format_hit)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
