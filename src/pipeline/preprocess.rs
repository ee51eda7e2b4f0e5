//! Preprocessing: deterministic normalisation of raw input text.
//!
//! Documents arrive pasted from email clients, exported from message systems
//! or typed by hand. Before segmentation every one of them is brought to the
//! same shape so that marker detection and size accounting see identical
//! input regardless of origin.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the blank-line rule only has to
//! consider `\n`; tabs are expanded before blank-line collapsing so a line
//! holding only a tab counts as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spaces substituted for each tab character.
pub const TAB_WIDTH: usize = 4;

/// Normalise raw text for segmentation.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF and lone CR → LF)
/// 2. Expand tabs to [`TAB_WIDTH`] spaces
/// 3. Collapse runs of 2+ blank lines to exactly one blank line
/// 4. Trim leading and trailing whitespace
///
/// Pure and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = expand_tabs(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Expand tabs ──────────────────────────────────────────────────────

fn expand_tabs(input: &str) -> String {
    input.replace('\t', &" ".repeat(TAB_WIDTH))
}

// ── Rule 3: Collapse blank lines ─────────────────────────────────────────────

// A newline followed by two or more (possibly space-only) empty lines.
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?: *\n){2,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUNS.replace_all(input, "\n\n").into_owned()
}
