//! Overlapping character-window chunker.
//!
//! Splits extracted document text (PDF pages, plain text) into windows of at
//! most `max_chars` characters, where each window repeats the last
//! `overlap_chars` characters of the previous one. The overlap keeps a
//! sentence that straddles a boundary retrievable from either side.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so windows
//! always end on a valid `char` boundary.
//!
//! # Algorithm
//!
//! 1. Clamp the overlap to `max_chars - 1` so the stride is at least one.
//! 2. Window `i` starts at character `i × (max_chars − overlap)`.
//! 3. Each window takes up to `max_chars` characters from its start.
//! 4. Stop after the first window that reaches the end of the text.
//! 5. Empty or whitespace-only input produces no windows.
//!
//! # Example
//!
//! ```rust
//! use testweaver_core::chunk::{chunk_chars, reassemble};
//!
//! let text = "abcdefghij";
//! let windows: Vec<&str> = chunk_chars(text, 4, 1).collect();
//! assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
//! assert_eq!(reassemble(&windows, 1), text);
//! ```

use std::iter::FusedIterator;

/// Lazy iterator over overlapping windows of a borrowed text.
///
/// Cloning the iterator (or calling [`chunk_chars`] again) restarts the
/// sequence; the iterator owns no buffers.
#[derive(Debug, Clone)]
pub struct CharWindows<'a> {
    text: &'a str,
    max_chars: usize,
    overlap: usize,
    /// Byte offset of the next window, `None` once exhausted.
    next_start: Option<usize>,
}

/// Split `text` into windows of at most `max_chars` characters overlapping by
/// `overlap_chars`.
///
/// `max_chars == 0` yields nothing. An overlap that would stall the window
/// (`overlap_chars >= max_chars`) is reduced to `max_chars - 1`.
pub fn chunk_chars(text: &str, max_chars: usize, overlap_chars: usize) -> CharWindows<'_> {
    let overlap = overlap_chars.min(max_chars.saturating_sub(1));
    let next_start = if max_chars == 0 || text.trim().is_empty() {
        None
    } else {
        Some(0)
    };
    CharWindows {
        text,
        max_chars,
        overlap,
        next_start,
    }
}

impl<'a> CharWindows<'a> {
    /// The overlap actually applied between consecutive windows.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.max_chars - self.overlap
    }
}

impl<'a> Iterator for CharWindows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.next_start?;
        let rest = &self.text[start..];
        let end = start + byte_offset(rest, self.max_chars);

        self.next_start = if end >= self.text.len() {
            None
        } else {
            Some(start + byte_offset(rest, self.stride()))
        };

        Some(&self.text[start..end])
    }
}

impl FusedIterator for CharWindows<'_> {}

/// Inverse of [`chunk_chars`]: drop the leading `overlap_chars` of every
/// window after the first and concatenate.
pub fn reassemble<S: AsRef<str>>(windows: &[S], overlap_chars: usize) -> String {
    let mut out = String::new();
    for (i, window) in windows.iter().enumerate() {
        let window = window.as_ref();
        if i == 0 {
            out.push_str(window);
        } else {
            out.push_str(&window[byte_offset(window, overlap_chars)..]);
        }
    }
    out
}

/// Byte index of the `n`-th character of `s`, or `s.len()` if shorter.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
