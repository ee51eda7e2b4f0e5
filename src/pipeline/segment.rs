//! Segmentation: split a normalised document into overlapping chunks.
//!
//! ## Algorithm
//!
//! 1. Split the text at every line that opens a structural section (see
//!    [`crate::convention`]). The marker stays with the section it opens,
//!    so concatenating the sections reproduces the input byte for byte.
//! 2. Hard-split any section longer than `max_chunk_size`, on line
//!    boundaries first and char boundaries for a single overlong line.
//! 3. Greedily pack sections into a buffer. When the next section would push
//!    the buffer past `max_chunk_size`, close the chunk, carry its tail
//!    forward as overlap, extract its structural context, and start the
//!    next chunk with overlap + section.
//!
//! The part of a chunk after its overlap is its *core*. Cores never overlap,
//! and joining them in order gives back the whole document.

use crate::config::PipelineConfig;
use crate::convention::DocumentConvention;
use crate::error::DocweaveError;
use crate::pipeline::context::extract_context_with;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default context budget used by [`segment`].
pub const DEFAULT_MAX_CONTEXT_LENGTH: usize = 500;

/// An ordered piece of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position in the document.
    pub index: usize,
    /// Number of chunks the document was split into.
    pub total: usize,
    /// Overlap carried from the previous chunk followed by this chunk's core.
    pub content: String,
    /// Byte offset in `content` where the core starts.
    pub core_offset: usize,
    /// Structural digest of the previous chunk, labelled.
    pub context: Option<String>,
}

impl Chunk {
    /// The text this chunk owns, without overlap.
    pub fn core(&self) -> &str {
        &self.content[self.core_offset..]
    }

    /// Tail of the previous chunk repeated at the start of this one.
    pub fn overlap(&self) -> &str {
        &self.content[..self.core_offset]
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.total
    }

    /// Context, overlap and core as one string.
    pub fn text(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{ctx}\n\n{}", self.content),
            None => self.content.clone(),
        }
    }

    /// Length of `content` in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Splits documents into [`Chunk`]s under one convention.
#[derive(Debug, Clone)]
pub struct Segmenter {
    convention: DocumentConvention,
    max_chunk_size: usize,
    overlap_chars: usize,
    max_context_length: usize,
}

impl Segmenter {
    /// Create a segmenter. Fails if `max_chunk_size` is 0 or
    /// `overlap_percent` is 100 or more.
    pub fn new(
        convention: DocumentConvention,
        max_chunk_size: usize,
        overlap_percent: usize,
        max_context_length: usize,
    ) -> Result<Self, DocweaveError> {
        if max_chunk_size == 0 {
            return Err(DocweaveError::InvalidConfig(
                "max chunk size must be > 0".into(),
            ));
        }
        if overlap_percent >= 100 {
            return Err(DocweaveError::InvalidConfig(format!(
                "overlap percent must be 0–99, got {overlap_percent}"
            )));
        }
        Ok(Self {
            convention,
            max_chunk_size,
            overlap_chars: max_chunk_size * overlap_percent / 100,
            max_context_length,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, DocweaveError> {
        Self::new(
            config.convention.clone(),
            config.max_chunk_size,
            config.overlap_percent,
            config.max_context_length,
        )
    }

    /// Split `text` into sections, each starting at a marker line.
    ///
    /// Text before the first marker forms its own section. Without any
    /// marker the whole text is one section.
    pub fn sections<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut cuts = self.convention.boundaries(text);
        if cuts.first() != Some(&0) {
            cuts.insert(0, 0);
        }
        cuts.push(text.len());
        cuts.windows(2)
            .map(|w| &text[w[0]..w[1]])
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Split `text` into chunks.
    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.max_chunk_size {
            return vec![single_chunk(text)];
        }
        if !self.convention.has_markers(text) {
            warn!(
                "No structural markers in a {}-char document; sending it as one chunk",
                char_len(text)
            );
            return vec![single_chunk(text)];
        }

        let pieces: Vec<&str> = self
            .sections(text)
            .into_iter()
            .flat_map(|s| split_oversized(s, self.max_chunk_size))
            .collect();

        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_len = 0usize;
        let mut core_offset = 0usize;
        let mut context: Option<String> = None;

        for piece in pieces {
            let piece_len = char_len(piece);
            let has_core = buffer.len() > core_offset;

            if has_core && buffer_len + piece_len > self.max_chunk_size {
                let overlap = tail_overlap(&buffer, self.overlap_chars).to_string();
                let next_context = extract_context_with(
                    &self.convention,
                    &buffer,
                    self.max_context_length,
                );

                debug!(
                    "Closing chunk {} at {} chars ({} overlap carried)",
                    chunks.len(),
                    buffer_len,
                    char_len(&overlap)
                );
                chunks.push(Chunk {
                    index: chunks.len(),
                    total: 0,
                    content: std::mem::take(&mut buffer),
                    core_offset,
                    context: context.take(),
                });

                buffer_len = char_len(&overlap);
                core_offset = overlap.len();
                buffer = overlap;
                context = (!next_context.is_empty()).then_some(next_context);
            }

            buffer.push_str(piece);
            buffer_len += piece_len;
        }

        if buffer.len() > core_offset {
            chunks.push(Chunk {
                index: chunks.len(),
                total: 0,
                content: buffer,
                core_offset,
                context,
            });
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total = total;
        }
        chunks
    }
}

/// Segment `text` with the admin-message convention and the default context
/// budget.
pub fn segment(
    text: &str,
    max_chunk_size: usize,
    overlap_percent: usize,
) -> Result<Vec<Chunk>, DocweaveError> {
    let segmenter = Segmenter::new(
        DocumentConvention::admin_message(),
        max_chunk_size,
        overlap_percent,
        DEFAULT_MAX_CONTEXT_LENGTH,
    )?;
    Ok(segmenter.segment(text))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn single_chunk(text: &str) -> Chunk {
    Chunk {
        index: 0,
        total: 1,
        content: text.to_string(),
        core_offset: 0,
        context: None,
    }
}

/// Last `n` chars of `text`. A tail that opens mid-word is moved forward
/// past its first whitespace; one that already starts on a word or line
/// boundary is kept whole.
fn tail_overlap(text: &str, n: usize) -> &str {
    if n == 0 || text.is_empty() {
        return "";
    }
    let start = text
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];
    let on_boundary = start == 0
        || text[..start]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
    if on_boundary {
        return tail;
    }
    match tail.find(char::is_whitespace) {
        Some(ws) => {
            let after = tail[ws..]
                .find(|c: char| !c.is_whitespace())
                .map(|k| ws + k)
                .unwrap_or(tail.len());
            if after < tail.len() {
                &tail[after..]
            } else {
                tail
            }
        }
        None => tail,
    }
}

/// Break a section longer than `max` chars into contiguous pieces of at most
/// `max` chars.
fn split_oversized(section: &str, max: usize) -> Vec<&str> {
    if char_len(section) <= max {
        return vec![section];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut offset = 0usize;
    let mut len = 0usize;

    for line in section.split_inclusive('\n') {
        let line_len = char_len(line);
        if len > 0 && len + line_len > max {
            pieces.push(&section[start..offset]);
            start = offset;
            len = 0;
        }
        if line_len > max {
            pieces.extend(split_by_chars(line, max));
            offset += line.len();
            start = offset;
            continue;
        }
        offset += line.len();
        len += line_len;
    }
    if start < section.len() {
        pieces.push(&section[start..]);
    }
    pieces
}

fn split_by_chars(line: &str, max: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    for (count, (i, _)) in line.char_indices().enumerate() {
        if count > 0 && count % max == 0 {
            parts.push(&line[start..i]);
            start = i;
        }
    }
    parts.push(&line[start..]);
    parts
}
