//! Sentence-boundary page chunker.
//!
//! Splits each page of a manual into [`ManualChunk`]s no longer than a
//! configured number of characters. Pages are never merged: every chunk
//! belongs to exactly one page, and chunks of the same page keep their order
//! through the part index.
//!
//! # Algorithm
//!
//! 1. Collapse every whitespace run in the page text to a single space and
//!    trim. Empty pages produce no chunks.
//! 2. If the page fits within `max_chars`, it becomes a single chunk.
//! 3. Otherwise split it into sentences. A sentence ends at a run of `.`,
//!    `!` or `?` followed by whitespace or the end of the text. Trailing text
//!    without terminal punctuation is kept as the last sentence.
//! 4. Accumulate sentences (joined by one space) until the next sentence
//!    would push the chunk past `max_chars`, then start a new chunk.
//! 5. A single sentence longer than `max_chars` is emitted on its own,
//!    oversized. Sentences are never cut.
//!
//! Because the page text is whitespace-normalized first, joining a page's
//! chunks with single spaces reproduces the normalized page text exactly.
//!
//! # Example
//!
//! ```rust
//! use workshop_hub_core::chunk::split_into_chunks;
//!
//! let chunks = split_into_chunks("Check the oil. Drain the sump. Refill.", 20);
//! assert_eq!(chunks, vec!["Check the oil.", "Drain the sump.", "Refill."]);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::classify::{detect_content_type, extract_section_title};
use crate::models::{ManualChunk, PageText};

/// Chunk size used by the hub's manual pipeline.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1500;

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_page_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split normalized text into sentences on terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !is_terminal(c) {
            continue;
        }
        // Swallow the rest of a punctuation run ("?!", "...").
        while let Some(&(_, next)) = chars.peek() {
            if is_terminal(next) {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Split normalized page text into chunks of at most `max_chars` characters,
/// preferring sentence boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();
        if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len + 1 + sentence_len <= max_chars {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + sentence_len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Title stored with each chunk: `"{file} - Page {n}"`, plus `" Part {k}"`
/// when the page was split.
pub fn chunk_title(manual_name: &str, page_number: u32, part: Option<u32>) -> String {
    match part {
        Some(k) => format!("{} - Page {} Part {}", manual_name, page_number, k),
        None => format!("{} - Page {}", manual_name, page_number),
    }
}

/// Chunk one page. `first_index` is the manual-wide index of the first chunk.
pub fn chunk_page(
    manual_name: &str,
    page: &PageText,
    max_chars: usize,
    first_index: i64,
) -> Vec<ManualChunk> {
    let normalized = normalize_page_text(&page.text);
    let pieces = split_into_chunks(&normalized, max_chars);
    if pieces.is_empty() {
        return Vec::new();
    }

    let section_title = extract_section_title(&page.text);
    let split = pieces.len() > 1;

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let part = split.then_some(i as u32 + 1);
            make_chunk(
                manual_name,
                first_index + i as i64,
                page.number,
                part,
                content,
                section_title.clone(),
            )
        })
        .collect()
}

/// Chunk every page of a manual, in page order, with contiguous indices
/// starting at 0.
pub fn chunk_manual(manual_name: &str, pages: &[PageText], max_chars: usize) -> Vec<ManualChunk> {
    let mut chunks: Vec<ManualChunk> = Vec::new();
    for page in pages {
        let next = chunks.len() as i64;
        chunks.extend(chunk_page(manual_name, page, max_chars, next));
    }
    chunks
}

fn make_chunk(
    manual_name: &str,
    index: i64,
    page_number: u32,
    part: Option<u32>,
    content: String,
    section_title: Option<String>,
) -> ManualChunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    ManualChunk {
        id: Uuid::new_v4().to_string(),
        manual_name: manual_name.to_string(),
        chunk_index: index,
        page_number,
        part,
        title: chunk_title(manual_name, page_number, part),
        content_type: detect_content_type(&content),
        content,
        section_title,
        hash,
    }
}
