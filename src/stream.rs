//! Streaming API: emit chunk results as they complete.
//!
//! ## Why stream?
//!
//! Long documents take minutes. A stream lets callers show partial output
//! immediately, wire up progress bars, or persist each chunk as it arrives
//! instead of waiting for the whole document.
//!
//! Unlike the eager [`crate::process::weave`], which returns only after every
//! chunk finished and recombines the outputs, [`process_stream`] yields one
//! [`ChunkResult`] per chunk, in index order, and leaves recombination to the
//! caller (see [`crate::pipeline::combine::Recombiner`]).

use crate::config::PipelineConfig;
use crate::error::DocweaveError;
use crate::output::ChunkResult;
use crate::pipeline::generate::{process_chunk, Generator};
use crate::pipeline::preprocess::normalize;
use crate::pipeline::segment::{Chunk, Segmenter};
use crate::progress::percent;
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of chunk results.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ChunkResult> + Send>>;

struct StreamState {
    chunks: std::vec::IntoIter<Chunk>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
    total: usize,
    next: usize,
    sent: usize,
    succeeded: usize,
    started: bool,
}

/// Generate `chunks` one at a time, yielding each result as soon as it is
/// ready.
///
/// Failed chunks are yielded too, with `error` set; empty chunks are yielded
/// as skipped without calling the generator. Progress events and the
/// inter-chunk delay follow the eager pipeline: `on_start` on the first poll,
/// `on_progress` before and after each generated chunk, `on_finish` once the
/// last chunk has been yielded.
pub fn process_stream(
    chunks: Vec<Chunk>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
) -> ChunkStream {
    let state = StreamState {
        total: chunks.len(),
        chunks: chunks.into_iter(),
        generator,
        config,
        next: 0,
        sent: 0,
        succeeded: 0,
        started: false,
    };

    let s = stream::unfold(state, |mut st| async move {
        let cb = st.config.progress_callback.clone();
        let total = st.total;

        if !st.started {
            st.started = true;
            if let Some(ref cb) = cb {
                cb.on_start(total);
            }
        }

        let Some(chunk) = st.chunks.next() else {
            if let Some(ref cb) = cb {
                cb.on_finish(total, st.succeeded);
            }
            return None;
        };
        let i = st.next;
        st.next += 1;

        if chunk.content.trim().is_empty() {
            warn!("Chunk {}/{}: empty after trimming, skipped", i + 1, total);
            return Some((ChunkResult::skipped(chunk.index), st));
        }

        if st.sent > 0 && !st.config.inter_chunk_delay.is_zero() {
            tokio::time::sleep(st.config.inter_chunk_delay).await;
        }

        if let Some(ref cb) = cb {
            cb.on_progress(percent(i, total), &format!("Generating chunk {}/{}", i + 1, total));
        }

        let result = process_chunk(st.generator.as_ref(), &chunk, &st.config).await;
        st.sent += 1;

        if let Some(ref cb) = cb {
            match &result.error {
                None => cb.on_chunk_complete(chunk.index, total, result.output.len()),
                Some(e) => cb.on_chunk_error(chunk.index, total, &e.to_string()),
            }
            let status = if result.is_success() { "done" } else { "failed" };
            cb.on_progress(
                percent(i + 1, total),
                &format!("Chunk {}/{} {}", i + 1, total, status),
            );
        }
        if result.is_success() {
            st.succeeded += 1;
        }

        Some((result, st))
    });

    Box::pin(s)
}

/// Normalise and segment `text`, then stream its chunk results.
///
/// # Returns
/// - `Ok(ChunkStream)`: one item per chunk, in index order
/// - `Err(DocweaveError)`: invalid configuration
pub fn weave_stream(
    text: &str,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
) -> Result<ChunkStream, DocweaveError> {
    config.validate()?;
    let chunks = Segmenter::from_config(&config)?.segment(&normalize(text));
    info!("Starting streaming run over {} chunk(s)", chunks.len());
    Ok(process_stream(chunks, generator, config))
}
