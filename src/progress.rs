//! Progress-callback trait for per-chunk pipeline events.
//!
//! Inject an [`Arc<dyn WeaveProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a document.
//!
//! Callers can forward events to a channel, a WebSocket, a database row or a
//! terminal progress bar without the library knowing how the host
//! application communicates.
//!
//! # Example
//!
//! ```rust
//! use docweave::{PipelineConfig, ProgressFn, ProgressCallback};
//! use std::sync::Arc;
//!
//! let cb: ProgressCallback = Arc::new(ProgressFn::new(|percent: f32, message: &str| {
//!     eprintln!("[{percent:>5.1}%] {message}");
//! }));
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each chunk.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Callbacks run synchronously on the pipeline task and
/// must not panic.
pub trait WeaveProgressCallback: Send + Sync {
    /// Called once before the first chunk.
    fn on_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Fractional progress, emitted before each chunk starts and right after
    /// it finishes.
    ///
    /// # Arguments
    /// * `percent` — 0.0 to 100.0
    /// * `message` — human-readable status line
    fn on_progress(&self, percent: f32, message: &str) {
        let _ = (percent, message);
    }

    /// Called when a chunk produced output.
    ///
    /// * `index` — 0-based chunk index
    /// * `output_len` — byte length of the generated text
    fn on_chunk_complete(&self, index: usize, total_chunks: usize, output_len: usize) {
        let _ = (index, total_chunks, output_len);
    }

    /// Called when a chunk was dropped after exhausting its retries.
    fn on_chunk_error(&self, index: usize, total_chunks: usize, error: &str) {
        let _ = (index, total_chunks, error);
    }

    /// Called before each backoff sleep.
    ///
    /// * `attempt` — 1-based number of the attempt that just failed
    fn on_retry(&self, index: usize, attempt: u32, error: &str) {
        let _ = (index, attempt, error);
    }

    /// Called once after every chunk was attempted (or the run was cancelled).
    fn on_finish(&self, total_chunks: usize, success_count: usize) {
        let _ = (total_chunks, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl WeaveProgressCallback for NoopProgressCallback {}

/// Adapts a plain `on_progress(percent, message)` closure.
pub struct ProgressFn<F> {
    f: F,
}

impl<F> ProgressFn<F>
where
    F: Fn(f32, &str) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> WeaveProgressCallback for ProgressFn<F>
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn on_progress(&self, percent: f32, message: &str) {
        (self.f)(percent, message)
    }
}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn WeaveProgressCallback>;

/// Percentage of `done` out of `total`, 100 for an empty run.
pub(crate) fn percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        100.0
    } else {
        (done as f32 / total as f32) * 100.0
    }
}
