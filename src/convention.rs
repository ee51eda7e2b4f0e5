//! Structural conventions: which line markers start a new section.
//!
//! Administrative messages follow a rigid layout: a classification marking,
//! a header/number block, routing lines, a subject line, a reference list,
//! numbered paragraphs with lettered sub-paragraphs, and a point-of-contact
//! block. A [`DocumentConvention`] is the ordered list of [`PatternClass`]es
//! describing one such family. The segmenter splits on the union of all
//! classes; the context extractor ranks matching lines by class order.
//!
//! Swapping the convention changes which documents split cleanly without
//! touching the segmenter's control flow.

use crate::error::DocweaveError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of structural marker a [`PatternClass`] recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Message header / number block (`NAVADMIN 123/24`, date-time group).
    Header,
    /// Routing and addressing lines (`FM`, `TO`, `INFO`).
    Routing,
    /// `SUBJ:` line.
    Subject,
    /// Reference list (`REF/A/…`, `NARR:`).
    References,
    /// `1.`, `2.`, … top-level paragraphs.
    NumberedParagraph,
    /// `a.`, `b.`, … sub-paragraphs.
    LetteredParagraph,
    /// Point-of-contact block.
    PointOfContact,
    /// Classification marking (`UNCLASSIFIED//`).
    Classification,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Header => "header",
            SectionKind::Routing => "routing",
            SectionKind::Subject => "subject",
            SectionKind::References => "references",
            SectionKind::NumberedParagraph => "numbered-paragraph",
            SectionKind::LetteredParagraph => "lettered-paragraph",
            SectionKind::PointOfContact => "point-of-contact",
            SectionKind::Classification => "classification",
        };
        f.write_str(name)
    }
}

/// One marker class: a kind plus the line-start pattern that detects it.
#[derive(Debug, Clone)]
pub struct PatternClass {
    kind: SectionKind,
    source: String,
    line: Regex,
    carries_context: bool,
}

impl PatternClass {
    /// Build a class from a pattern fragment.
    ///
    /// The fragment is matched at the start of a line after optional
    /// indentation; do not anchor it yourself.
    pub fn new(kind: SectionKind, pattern: &str) -> Result<Self, DocweaveError> {
        let line = Regex::new(&format!(r"^[ \t]*(?:{pattern})")).map_err(|e| {
            DocweaveError::InvalidConfig(format!("bad {kind} pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            kind,
            source: pattern.to_string(),
            line,
            carries_context: true,
        })
    }

    /// Exclude this class from carry-forward context (it still splits).
    pub fn without_context(mut self) -> Self {
        self.carries_context = false;
        self
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn carries_context(&self) -> bool {
        self.carries_context
    }

    /// Whether `line` starts with this class's marker.
    pub fn matches(&self, line: &str) -> bool {
        self.line.is_match(line)
    }
}

/// Ordered set of pattern classes for one document family.
///
/// Order is relevance: earlier classes win when context space is short.
#[derive(Debug, Clone)]
pub struct DocumentConvention {
    classes: Vec<PatternClass>,
    boundary: Regex,
}

static ADMIN_MESSAGE: Lazy<DocumentConvention> = Lazy::new(|| {
    DocumentConvention::new(admin_message_classes())
        .expect("built-in admin message patterns are valid")
});

fn admin_message_classes() -> Vec<PatternClass> {
    let table: [(SectionKind, &str, bool); 8] = [
        (
            SectionKind::Header,
            r"(?:NAVADMIN|MARADMIN|ALNAV|ALMAR|ALARACT|ALCOAST|MSGID)\b|[RPOZ]\s+\d{6}Z\s+[A-Z]{3}\s+\d{2,4}",
            true,
        ),
        (SectionKind::Routing, r"(?:FM|FROM|TO|INFO|BT)\b", true),
        (SectionKind::Subject, r"SUBJ(?:ECT)?\s*[:/]", true),
        (SectionKind::References, r"(?:REFS?|NARR|AMPN)\s*[:/]", true),
        (SectionKind::NumberedParagraph, r"\d{1,2}\.\s", true),
        (SectionKind::LetteredParagraph, r"[a-z]\.\s", true),
        (
            SectionKind::PointOfContact,
            r"(?:POCS?|POINT OF CONTACT)\b",
            false,
        ),
        (
            SectionKind::Classification,
            r"(?:UNCLASSIFIED|UNCLAS|CONFIDENTIAL|TOP SECRET|SECRET|CUI)(?://[A-Z /]*)?[ \t]*$",
            true,
        ),
    ];

    table
        .into_iter()
        .map(|(kind, pattern, context)| {
            let class = PatternClass::new(kind, pattern)
                .expect("built-in admin message patterns are valid");
            if context {
                class
            } else {
                class.without_context()
            }
        })
        .collect()
}

impl DocumentConvention {
    /// Combine `classes` into a convention. Fails on an empty list.
    pub fn new(classes: Vec<PatternClass>) -> Result<Self, DocweaveError> {
        if classes.is_empty() {
            return Err(DocweaveError::InvalidConfig(
                "a document convention needs at least one pattern class".into(),
            ));
        }
        let alternation = classes
            .iter()
            .map(|c| format!("(?:{})", c.source))
            .collect::<Vec<_>>()
            .join("|");
        let boundary = Regex::new(&format!(r"(?m)^[ \t]*(?:{alternation})"))
            .map_err(|e| DocweaveError::InvalidConfig(format!("bad boundary pattern: {e}")))?;
        Ok(Self { classes, boundary })
    }

    /// Convention for military-style administrative messages.
    pub fn admin_message() -> Self {
        ADMIN_MESSAGE.clone()
    }

    pub fn classes(&self) -> &[PatternClass] {
        &self.classes
    }

    /// Whether any structural marker occurs in `text`.
    pub fn has_markers(&self, text: &str) -> bool {
        self.boundary.is_match(text)
    }

    /// Byte offsets of every line that opens a new section.
    pub fn boundaries(&self, text: &str) -> Vec<usize> {
        self.boundary.find_iter(text).map(|m| m.start()).collect()
    }

    /// First class matching `line`, with its relevance rank.
    pub fn classify(&self, line: &str) -> Option<(usize, SectionKind)> {
        self.classes
            .iter()
            .enumerate()
            .find(|(_, c)| c.matches(line))
            .map(|(rank, c)| (rank, c.kind))
    }

    /// Rank of the first context-carrying class matching `line`.
    pub fn context_rank(&self, line: &str) -> Option<usize> {
        self.classes
            .iter()
            .enumerate()
            .find(|(_, c)| c.carries_context && c.matches(line))
            .map(|(rank, _)| rank)
    }
}

impl Default for DocumentConvention {
    fn default() -> Self {
        Self::admin_message()
    }
}
