//! Result types returned by the pipeline.

use crate::error::{ChunkError, DocweaveError};
use serde::{Deserialize, Serialize};

/// Outcome of generating one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// 0-based chunk index.
    pub index: usize,
    /// Generated text; empty when `error` is set.
    pub output: String,
    /// Generator calls made for this chunk (0 for skipped chunks).
    pub attempts: u32,
    /// Wall time spent on this chunk, backoff included.
    pub duration_ms: u64,
    pub error: Option<ChunkError>,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn skipped(index: usize) -> Self {
        Self {
            index,
            output: String::new(),
            attempts: 0,
            duration_ms: 0,
            error: Some(ChunkError::Empty { chunk: index }),
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Chunks the document was split into.
    pub total_chunks: usize,
    /// Chunks that produced output.
    pub processed_chunks: usize,
    /// Indices of chunks dropped after exhausting their retries.
    pub dropped_chunks: Vec<usize>,
    /// Indices of chunks skipped because they were empty.
    pub skipped_chunks: Vec<usize>,
    /// The run stopped early on request.
    pub cancelled: bool,
    /// Generator calls across all chunks.
    pub total_attempts: u32,
    pub total_duration_ms: u64,
    /// Time spent inside chunk processing (generator calls and backoff).
    pub generation_duration_ms: u64,
}

/// A recombined document plus per-chunk results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedDocument {
    /// The recombined document.
    pub content: String,
    /// One entry per attempted chunk, in index order.
    pub chunks: Vec<ChunkResult>,
    pub stats: ProcessingStats,
}

impl CombinedDocument {
    /// Every chunk produced output and the run was not cancelled.
    pub fn is_complete(&self) -> bool {
        !self.stats.cancelled
            && self.stats.dropped_chunks.is_empty()
            && self.stats.processed_chunks + self.stats.skipped_chunks.len()
                == self.stats.total_chunks
    }

    /// Reject the document if any chunk was dropped.
    ///
    /// Skipped (empty) chunks do not count as failures.
    pub fn into_strict(self) -> Result<Self, DocweaveError> {
        let failed = self.stats.dropped_chunks.len();
        if failed > 0 {
            return Err(DocweaveError::PartialFailure {
                success: self.stats.processed_chunks,
                failed,
                total: self.stats.total_chunks,
            });
        }
        Ok(self)
    }
}
