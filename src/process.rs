//! Eager (whole-document) processing entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: run every chunk, then recombine and
//! return one [`CombinedDocument`]. Use [`crate::stream::process_stream`]
//! instead when chunk outputs should be consumed as they are produced.
//!
//! ## Ordering
//!
//! Chunks are processed strictly in index order with at most one generator
//! call in flight, separated by `config.inter_chunk_delay`.

use crate::cancel::CancelHandle;
use crate::config::PipelineConfig;
use crate::error::DocweaveError;
use crate::output::{ChunkResult, CombinedDocument, ProcessingStats};
use crate::pipeline::combine::Recombiner;
use crate::pipeline::generate::{process_chunk, Generator};
use crate::pipeline::preprocess::normalize;
use crate::pipeline::segment::{Chunk, Segmenter};
use crate::progress::percent;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Normalise, segment, generate and recombine `text`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(CombinedDocument)` on success, even if some chunks were dropped
/// (check `doc.stats.dropped_chunks`, or call
/// [`CombinedDocument::into_strict`]).
///
/// # Errors
/// Returns `Err(DocweaveError)` only for fatal errors:
/// - Invalid configuration
/// - Every chunk failed or was empty
pub async fn weave(
    text: &str,
    generator: &dyn Generator,
    config: &PipelineConfig,
) -> Result<CombinedDocument, DocweaveError> {
    weave_inner(text, generator, config, None).await
}

/// [`weave`] with cooperative cancellation.
///
/// Cancelling keeps whatever chunks finished: they are recombined and
/// returned with `stats.cancelled` set. Cancelling before any chunk finished
/// returns [`DocweaveError::Cancelled`].
pub async fn weave_with_cancel(
    text: &str,
    generator: &dyn Generator,
    config: &PipelineConfig,
    cancel: &CancelHandle,
) -> Result<CombinedDocument, DocweaveError> {
    weave_inner(text, generator, config, Some(cancel)).await
}

async fn weave_inner(
    text: &str,
    generator: &dyn Generator,
    config: &PipelineConfig,
    cancel: Option<&CancelHandle>,
) -> Result<CombinedDocument, DocweaveError> {
    config.validate()?;
    let segmenter = Segmenter::from_config(config)?;

    // ── Step 1: Normalise ────────────────────────────────────────────────
    let normalized = normalize(text);

    // ── Step 2: Segment ──────────────────────────────────────────────────
    let chunks = segmenter.segment(&normalized);
    info!(
        "Segmented {} chars into {} chunk(s) (max {} chars, {}% overlap)",
        normalized.chars().count(),
        chunks.len(),
        config.max_chunk_size,
        config.overlap_percent
    );

    // ── Step 3: Generate and recombine ───────────────────────────────────
    run(&chunks, generator, config, cancel).await
}

/// Generate every chunk in order and recombine the outputs.
pub async fn process_chunks(
    chunks: &[Chunk],
    generator: &dyn Generator,
    config: &PipelineConfig,
) -> Result<CombinedDocument, DocweaveError> {
    run(chunks, generator, config, None).await
}

/// [`process_chunks`] with cooperative cancellation.
pub async fn process_chunks_with_cancel(
    chunks: &[Chunk],
    generator: &dyn Generator,
    config: &PipelineConfig,
    cancel: &CancelHandle,
) -> Result<CombinedDocument, DocweaveError> {
    run(chunks, generator, config, Some(cancel)).await
}

/// Synchronous wrapper around [`weave`].
///
/// Creates a temporary tokio runtime internally.
pub fn weave_sync(
    text: &str,
    generator: &dyn Generator,
    config: &PipelineConfig,
) -> Result<CombinedDocument, DocweaveError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocweaveError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(weave(text, generator, config))
}

/// Read `input_path`, weave it, and write the document to `output_path`.
pub async fn weave_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    generator: &dyn Generator,
    config: &PipelineConfig,
) -> Result<ProcessingStats, DocweaveError> {
    let input_path = input_path.as_ref();
    let text = tokio::fs::read_to_string(input_path)
        .await
        .map_err(|e| DocweaveError::InputReadFailed {
            path: input_path.to_path_buf(),
            source: e,
        })?;
    let doc = weave(&text, generator, config).await?;
    write_document(output_path, &doc.content).await?;
    Ok(doc.stats)
}

/// Write `content` to `path` through a sibling temp file and a rename, so
/// readers never see a half-written document.
pub async fn write_document(path: impl AsRef<Path>, content: &str) -> Result<(), DocweaveError> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| DocweaveError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, content).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Sleep for `delay`, returning early with `true` if cancelled.
async fn pause(delay: Duration, cancel: Option<&CancelHandle>) -> bool {
    match cancel {
        None => {
            tokio::time::sleep(delay).await;
            false
        }
        Some(handle) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = handle.cancelled() => true,
            }
        }
    }
}

async fn run(
    chunks: &[Chunk],
    generator: &dyn Generator,
    config: &PipelineConfig,
    cancel: Option<&CancelHandle>,
) -> Result<CombinedDocument, DocweaveError> {
    let total_start = Instant::now();
    let total = chunks.len();
    let cb = config.progress_callback.as_ref();
    let is_cancelled = || cancel.is_some_and(CancelHandle::is_cancelled);

    if let Some(cb) = cb {
        cb.on_start(total);
    }

    let mut results: Vec<ChunkResult> = Vec::with_capacity(total);
    let mut stats = ProcessingStats {
        total_chunks: total,
        ..Default::default()
    };
    let mut sent = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        if is_cancelled() {
            stats.cancelled = true;
            break;
        }

        if chunk.content.trim().is_empty() {
            warn!("Chunk {}/{}: empty after trimming, skipped", i + 1, total);
            stats.skipped_chunks.push(chunk.index);
            results.push(ChunkResult::skipped(chunk.index));
            continue;
        }

        if sent > 0 && !config.inter_chunk_delay.is_zero() {
            debug!("Waiting {:?} before chunk {}", config.inter_chunk_delay, i + 1);
            if pause(config.inter_chunk_delay, cancel).await {
                stats.cancelled = true;
                break;
            }
        }

        if let Some(cb) = cb {
            cb.on_progress(
                percent(i, total),
                &format!("Generating chunk {}/{}", i + 1, total),
            );
        }

        let result = process_chunk(generator, chunk, config).await;
        sent += 1;
        stats.total_attempts += result.attempts;

        match &result.error {
            None => {
                stats.processed_chunks += 1;
                if let Some(cb) = cb {
                    cb.on_chunk_complete(chunk.index, total, result.output.len());
                }
            }
            Some(e) => {
                warn!("Dropping chunk {}/{}: {}", i + 1, total, e);
                stats.dropped_chunks.push(chunk.index);
                if let Some(cb) = cb {
                    cb.on_chunk_error(chunk.index, total, &e.to_string());
                }
            }
        }

        if let Some(cb) = cb {
            let status = if result.is_success() { "done" } else { "failed" };
            cb.on_progress(
                percent(i + 1, total),
                &format!("Chunk {}/{} {}", i + 1, total, status),
            );
        }

        results.push(result);
    }

    stats.generation_duration_ms = total_start.elapsed().as_millis() as u64;

    if let Some(cb) = cb {
        cb.on_finish(total, stats.processed_chunks);
    }

    if stats.processed_chunks == 0 {
        if stats.cancelled {
            return Err(DocweaveError::Cancelled {
                completed: 0,
                total,
            });
        }
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "document is empty".to_string());
        return Err(DocweaveError::NoValidContent { total, first_error });
    }

    let outputs: Vec<String> = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.output.clone())
        .collect();
    let content = Recombiner::new(config.wrapper.clone()).combine(&outputs, total);

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    if stats.cancelled {
        warn!(
            "Cancelled after {}/{} chunks; returning partial document",
            results.len(),
            total
        );
    }
    info!(
        "Processing complete: {}/{} chunks, {} dropped, {}ms total",
        stats.processed_chunks,
        total,
        stats.dropped_chunks.len(),
        stats.total_duration_ms
    );

    Ok(CombinedDocument {
        content,
        chunks: results,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerateError;
    use crate::pipeline::generate::FnGenerator;

    fn fast_config() -> PipelineConfig {
        PipelineConfig::builder()
            .retry_base_delay_ms(1)
            .retry_max_delay_ms(2)
            .inter_chunk_delay_ms(0)
            .build()
            .unwrap()
    }

    fn chunk(index: usize, total: usize, content: &str) -> Chunk {
        Chunk {
            index,
            total,
            content: content.into(),
            core_offset: 0,
            context: None,
        }
    }

    #[test]
    fn tmp_path_keeps_extension() {
        assert_eq!(
            tmp_path_for(Path::new("out/guide.html")),
            PathBuf::from("out/guide.html.tmp")
        );
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Ok::<_, GenerateError>("<p>x</p>".to_string())
        });
        let chunks = vec![chunk(0, 3, "1. One"), chunk(1, 3, "   \n"), chunk(2, 3, "2. Two")];
        let doc = process_chunks(&chunks, &g, &fast_config()).await.unwrap();
        assert_eq!(doc.stats.skipped_chunks, vec![1]);
        assert_eq!(doc.stats.processed_chunks, 2);
        assert_eq!(doc.chunks.len(), 3);
        assert!(doc.is_complete());
    }

    #[tokio::test]
    async fn only_empty_chunks_is_no_valid_content() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Ok::<_, GenerateError>("<p>x</p>".to_string())
        });
        let err = process_chunks(&[chunk(0, 1, "  ")], &g, &fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, DocweaveError::NoValidContent { total: 1, .. }));
    }

    #[tokio::test]
    async fn no_chunks_is_no_valid_content() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Ok::<_, GenerateError>("<p>x</p>".to_string())
        });
        let err = weave("", &g, &fast_config()).await.unwrap_err();
        assert!(err.to_string().contains("No valid content"));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Ok::<_, GenerateError>("<p>x</p>".to_string())
        });
        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = process_chunks_with_cancel(&[chunk(0, 1, "1. One")], &g, &fast_config(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DocweaveError::Cancelled { completed: 0, total: 1 }));
    }

    #[tokio::test]
    async fn cancel_interrupts_inter_chunk_delay() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Ok::<_, GenerateError>("<p>x</p>".to_string())
        });
        let config = PipelineConfig::builder()
            .inter_chunk_delay_ms(60_000)
            .build()
            .unwrap();
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let chunks = vec![chunk(0, 2, "1. One"), chunk(1, 2, "2. Two")];
        let started = Instant::now();
        let doc = process_chunks_with_cancel(&chunks, &g, &config, &cancel)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(doc.stats.cancelled);
        assert_eq!(doc.stats.processed_chunks, 1);
        assert!(!doc.is_complete());
    }

    #[tokio::test]
    async fn invalid_config_fails_before_generation() {
        let g = FnGenerator::new(|_p: String, _c: String| async {
            Err::<String, _>(GenerateError::Fatal("generator must not be called".into()))
        });
        let mut config = fast_config();
        config.max_chunk_size = 0;
        let err = weave("SUBJ: X", &g, &config).await.unwrap_err();
        assert!(matches!(err, DocweaveError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn write_document_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("guide.html");
        write_document(&path, "<main>ok</main>").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<main>ok</main>");
        assert!(!tmp_path_for(&path).exists());
    }
}
