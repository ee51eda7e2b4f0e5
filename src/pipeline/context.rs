//! Carry-forward context: a compact digest of a closed chunk's structure.
//!
//! The next chunk's prompt gets the subject line, header, routing and the
//! paragraph markers seen so far, so the generator can continue numbering and
//! keep terminology consistent without re-reading the previous chunk.

use crate::convention::DocumentConvention;

/// Label prefixed to every non-empty context string.
pub const CONTEXT_LABEL: &str = "Previous Context:";

/// Extract context from `chunk_text` using the admin-message convention.
///
/// See [`extract_context_with`].
pub fn extract_context(chunk_text: &str, max_context_length: usize) -> String {
    extract_context_with(&DocumentConvention::admin_message(), chunk_text, max_context_length)
}

/// Extract context from `chunk_text` under `convention`.
///
/// Lines opening with a context-carrying marker are collected, ordered by
/// class relevance (convention order) and then by position, and appended
/// until the next line would push the body past `max_context_length`
/// characters. The label does not count against the budget.
///
/// Returns an empty string when nothing matches or the first candidate does
/// not fit.
pub fn extract_context_with(
    convention: &DocumentConvention,
    chunk_text: &str,
    max_context_length: usize,
) -> String {
    let mut candidates: Vec<(usize, usize, &str)> = chunk_text
        .lines()
        .enumerate()
        .filter_map(|(pos, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            convention
                .context_rank(line)
                .map(|rank| (rank, pos, trimmed))
        })
        .collect();
    candidates.sort_by_key(|&(rank, pos, _)| (rank, pos));

    let mut body = String::new();
    let mut used = 0usize;
    for (_, _, line) in candidates {
        let separator = usize::from(!body.is_empty());
        let cost = line.chars().count() + separator;
        if used + cost > max_context_length {
            break;
        }
        if separator == 1 {
            body.push('\n');
        }
        body.push_str(line);
        used += cost;
    }

    if body.is_empty() {
        String::new()
    } else {
        format!("{CONTEXT_LABEL}\n{body}")
    }
}
