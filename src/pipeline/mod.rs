//! Pipeline stages for turning one long document into one generated document.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ preprocess ──▶ segment ──▶ generate ──▶ combine
//!          (normalise)    (+context)   (retry)      (one wrapper)
//! ```
//!
//! 1. [`preprocess`] brings line endings, tabs and blank lines to one shape
//! 2. [`segment`] splits at structural markers into overlapping chunks,
//!    using [`context`] to carry a digest of each closed chunk forward
//! 3. [`generate`] sends each chunk's prompt to the generator with
//!    retry/backoff; the only stage with network I/O
//! 4. [`combine`] stitches the per-chunk outputs back together with a single
//!    opening and closing wrapper

pub mod combine;
pub mod context;
pub mod generate;
pub mod preprocess;
pub mod segment;
