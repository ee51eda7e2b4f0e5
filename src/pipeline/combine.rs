//! Recombination: stitch per-chunk outputs into one document.
//!
//! Each chunk is generated independently, so every output may carry its own
//! copy of the document wrapper and title block even though the prompts ask
//! for them only once. The recombiner keeps exactly one opening wrapper (from
//! the first output), one closing wrapper (from the last output that has
//! one), and the inner content of every output in order, with repeated
//! title/header blocks removed from all but the first.
//!
//! When the first output has no recognisable opening wrapper the structure
//! is unknown, so every output is treated as bare inner content and the
//! result is wrapped in the generic wrapper instead.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Open/close markers and duplicated-header patterns for generated output.
#[derive(Debug, Clone)]
pub struct WrapperConvention {
    open: Regex,
    close: Regex,
    headers: Vec<Regex>,
    /// Wrapper used when recombining falls back; also quoted in prompts.
    pub open_literal: String,
    pub close_literal: String,
}

static HTML_MAIN: Lazy<WrapperConvention> = Lazy::new(|| {
    WrapperConvention::new(
        r"(?i)<main\b[^>]*>",
        r"(?i)</main\s*>",
        &[r"(?is)\A\s*<header\b.*?</header\s*>", r"(?is)\A\s*<h1\b.*?</h1\s*>"],
        r#"<main class="study-guide">"#,
        "</main>",
    )
    .expect("built-in wrapper patterns are valid")
});

impl WrapperConvention {
    /// Build a convention from regex sources.
    ///
    /// `headers` patterns must be anchored at the start of the text (`\A`);
    /// they are stripped repeatedly from non-leading outputs.
    pub fn new(
        open: &str,
        close: &str,
        headers: &[&str],
        open_literal: impl Into<String>,
        close_literal: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            open: Regex::new(open)?,
            close: Regex::new(close)?,
            headers: headers
                .iter()
                .map(|h| Regex::new(h))
                .collect::<Result<_, _>>()?,
            open_literal: open_literal.into(),
            close_literal: close_literal.into(),
        })
    }

    /// `<main …>` … `</main>` HTML documents with `<header>`/`<h1>` titles.
    pub fn html_main() -> Self {
        HTML_MAIN.clone()
    }

    /// Number of opening markers in `text`.
    pub fn count_open(&self, text: &str) -> usize {
        self.open.find_iter(text).count()
    }

    /// Number of closing markers in `text`.
    pub fn count_close(&self, text: &str) -> usize {
        self.close.find_iter(text).count()
    }

    /// Text between the first open marker and the last close marker, with
    /// any stray markers inside removed. Missing markers widen the span to
    /// the start or end of `text`.
    fn inner(&self, text: &str) -> String {
        let start = self.open.find(text).map(|m| m.end()).unwrap_or(0);
        let end = self
            .close
            .find_iter(&text[start..])
            .last()
            .map(|m| start + m.start())
            .unwrap_or(text.len());
        self.strip_markers(&text[start..end])
    }

    fn strip_markers(&self, text: &str) -> String {
        let s = self.open.replace_all(text, "");
        self.close.replace_all(&s, "").trim().to_string()
    }

    fn strip_headers(&self, text: &str) -> String {
        let mut s = text.trim_start().to_string();
        loop {
            let before = s.len();
            for header in &self.headers {
                if let Some(m) = header.find(&s) {
                    s = s[m.end()..].trim_start().to_string();
                }
            }
            if s.len() == before {
                return s;
            }
        }
    }
}

impl Default for WrapperConvention {
    fn default() -> Self {
        Self::html_main()
    }
}

/// Joins generated chunk outputs under a [`WrapperConvention`].
#[derive(Debug, Clone, Default)]
pub struct Recombiner {
    wrapper: WrapperConvention,
}

impl Recombiner {
    pub fn new(wrapper: WrapperConvention) -> Self {
        Self { wrapper }
    }

    /// Combine outputs (in chunk order) of a document split into
    /// `total_chunk_count` chunks.
    ///
    /// A lone output of a single-chunk document is returned unchanged.
    pub fn combine(&self, outputs: &[String], total_chunk_count: usize) -> String {
        match outputs {
            [] => String::new(),
            [only] if total_chunk_count <= 1 => only.clone(),
            [first, ..] => match self.wrapper.open.find(first) {
                Some(open) => self.combine_wrapped(outputs, &first[..open.end()]),
                None => {
                    debug!("No opening wrapper in first output; using generic wrapper");
                    self.combine_fallback(outputs)
                }
            },
        }
    }

    fn combine_wrapped(&self, outputs: &[String], opening: &str) -> String {
        let closing = outputs
            .iter()
            .rev()
            .find_map(|o| self.wrapper.close.find_iter(o).last().map(|m| &o[m.start()..]))
            .map(str::to_string)
            .unwrap_or_else(|| self.wrapper.close_literal.clone());

        let mut parts = vec![opening.trim_end().to_string()];
        parts.extend(self.inner_parts(outputs));
        parts.push(closing.trim().to_string());
        parts.join("\n")
    }

    fn combine_fallback(&self, outputs: &[String]) -> String {
        let mut parts = vec![self.wrapper.open_literal.clone()];
        parts.extend(self.inner_parts(outputs));
        parts.push(self.wrapper.close_literal.clone());
        parts.join("\n")
    }

    fn inner_parts(&self, outputs: &[String]) -> Vec<String> {
        outputs
            .iter()
            .enumerate()
            .map(|(i, o)| {
                let inner = self.wrapper.inner(o);
                if i == 0 {
                    inner
                } else {
                    self.wrapper.strip_headers(&inner)
                }
            })
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Combine with the default HTML wrapper convention.
pub fn combine(outputs: &[String], total_chunk_count: usize) -> String {
    Recombiner::default().combine(outputs, total_chunk_count)
}
