//! # docweave
//!
//! Push documents that are too long for one model call through a
//! token-limited text generator, chunk by chunk, and stitch the results back
//! into one coherent document.
//!
//! ## Why this crate?
//!
//! Administrative messages (NAVADMINs, MARADMINs and their relatives) are
//! long and rigidly sectioned: a classification line, a header block, routing
//! lines, a subject, references, then numbered paragraphs with lettered
//! sub-paragraphs. Cutting one at a fixed character count splits paragraphs
//! mid-sentence and leaves later chunks without the subject or numbering they
//! belong to. This crate splits on those section markers instead, carries a
//! short structural digest from chunk to chunk, and recombines the outputs so
//! the document wrapper and title appear exactly once.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text
//!  │
//!  ├─ 1. Preprocess  normalise line endings, tabs, blank lines
//!  ├─ 2. Segment     section-aware chunks with overlap + carried context
//!  ├─ 3. Generate    one call per chunk, sequential, retry with backoff
//!  └─ 4. Combine     one opening wrapper, inner content, one closing wrapper
//! ```
//!
//! A separate [`RateLimiter`] counts requests per caller key in fixed
//! windows and can gate whatever triggers a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docweave::{weave, LlmGenerator, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let generator = LlmGenerator::resolve(None, None)?;
//!     let config = PipelineConfig::builder().max_chunk_size(4000).build()?;
//!     let text = std::fs::read_to_string("navadmin.txt")?;
//!     let doc = weave(&text, &generator, &config).await?;
//!     println!("{}", doc.content);
//!     eprintln!("{}/{} chunks", doc.stats.processed_chunks, doc.stats.total_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docweave` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docweave = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod convention;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod ratelimit;
pub mod retry;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelHandle;
pub use config::{PipelineConfig, PipelineConfigBuilder, RateLimitConfig, RateLimitConfigBuilder};
pub use convention::{DocumentConvention, PatternClass, SectionKind};
pub use error::{ChunkError, DocweaveError, GenerateError};
pub use output::{ChunkResult, CombinedDocument, ProcessingStats};
pub use pipeline::combine::{combine, Recombiner, WrapperConvention};
pub use pipeline::context::extract_context;
pub use pipeline::generate::{FnGenerator, Generator, LlmGenerator};
pub use pipeline::preprocess::normalize;
pub use pipeline::segment::{segment, Chunk, Segmenter};
pub use process::{
    process_chunks, process_chunks_with_cancel, weave, weave_file, weave_sync, weave_with_cancel,
    write_document,
};
pub use progress::{NoopProgressCallback, ProgressCallback, ProgressFn, WeaveProgressCallback};
pub use ratelimit::{Clock, CounterStore, ManualClock, RateLimitDecision, RateLimiter, SystemClock};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use stream::{process_stream, weave_stream, ChunkStream};
