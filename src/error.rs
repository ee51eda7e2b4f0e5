//! Error types for the docweave library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`DocweaveError`] is **fatal**: the run cannot produce a document at all
//!   (bad configuration, every chunk failed, cancelled before anything
//!   finished). Returned as `Err(DocweaveError)` from the top-level entry
//!   points.
//!
//! * [`ChunkError`] is **non-fatal**: one chunk failed after its retries but
//!   the others are fine. Stored inside [`crate::output::ChunkResult`] so
//!   callers can inspect partial success instead of losing the whole
//!   document to one bad chunk.
//!
//! * [`GenerateError`] is what a [`crate::pipeline::generate::Generator`]
//!   returns for a single call. The retry loop decides from it whether another
//!   attempt is worth making.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docweave library.
///
/// Chunk-level failures use [`ChunkError`] and are stored in
/// [`crate::output::ChunkResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DocweaveError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Every chunk was dropped or skipped; there is nothing to combine.
    #[error("No valid content was generated from any chunks ({total} attempted).\nFirst error: {first_error}")]
    NoValidContent { total: usize, first_error: String },

    /// Some chunks succeeded but at least one was dropped.
    ///
    /// Returned by [`crate::output::CombinedDocument::into_strict`] when the
    /// caller wants to treat any dropped chunk as an error.
    #[error("{failed}/{total} chunks failed during generation")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    /// The run was cancelled before any chunk completed.
    #[error("Processing cancelled after {completed} of {total} chunks")]
    Cancelled { completed: usize, total: usize },

    /// A caller key went over its request budget for the current window.
    #[error("Rate limit exceeded for '{key}'; retry in {retry_after_secs}s")]
    RateLimited { key: String, retry_after_secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read the input document.
    #[error("Failed to read input '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single chunk.
///
/// The overall run continues unless ALL chunks fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// Generation failed after the retry budget was spent.
    #[error("Chunk {chunk}: generation failed after {attempts} attempt(s): {detail}")]
    GenerationFailed {
        chunk: usize,
        attempts: u32,
        detail: String,
    },

    /// The chunk had no text once trimmed and was never sent.
    #[error("Chunk {chunk}: empty after trimming, skipped")]
    Empty { chunk: usize },
}

impl ChunkError {
    /// 0-based index of the chunk this error belongs to.
    pub fn chunk(&self) -> usize {
        match self {
            ChunkError::GenerationFailed { chunk, .. } | ChunkError::Empty { chunk } => *chunk,
        }
    }
}

/// Failure of a single `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    /// Network blip, 5xx, overloaded backend. Worth retrying.
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// The call did not return within the configured timeout.
    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// HTTP 429 from the backend.
    #[error("rate limited by generator{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Authentication, malformed request, content filter. Retrying will not help.
    #[error("generation failed permanently: {0}")]
    Fatal(String),
}

impl GenerateError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerateError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = DocweaveError::PartialFailure {
            success: 4,
            failed: 1,
            total: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/5"), "got: {msg}");
    }

    #[test]
    fn no_valid_content_display() {
        let e = DocweaveError::NoValidContent {
            total: 3,
            first_error: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("No valid content was generated from any chunks"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn caller_rate_limited_display() {
        let e = DocweaveError::RateLimited {
            key: "user-42".into(),
            retry_after_secs: 12,
        };
        assert_eq!(e.to_string(), "Rate limit exceeded for 'user-42'; retry in 12s");
    }

    #[test]
    fn rate_limited_display_with_retry() {
        let e = GenerateError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn rate_limited_display_without_retry() {
        let e = GenerateError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "rate limited by generator");
    }

    #[test]
    fn only_fatal_is_not_retryable() {
        assert!(GenerateError::Transient("x".into()).is_retryable());
        assert!(GenerateError::Timeout { elapsed_ms: 10 }.is_retryable());
        assert!(GenerateError::RateLimited {
            retry_after_secs: None
        }
        .is_retryable());
        assert!(!GenerateError::Fatal("bad key".into()).is_retryable());
    }

    #[test]
    fn chunk_error_index() {
        let e = ChunkError::GenerationFailed {
            chunk: 7,
            attempts: 3,
            detail: "timeout".into(),
        };
        assert_eq!(e.chunk(), 7);
        assert!(e.to_string().contains("3 attempt(s)"));
        assert_eq!(ChunkError::Empty { chunk: 2 }.chunk(), 2);
    }
}
