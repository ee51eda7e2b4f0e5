//! Integration tests for the chunking pipeline.
//!
//! Every test drives the public API with an in-process stub generator, so
//! none of them needs an API key or the network.

use docweave::{
    normalize, process_stream, segment, weave, weave_file, weave_sync, weave_with_cancel,
    CancelHandle, ChunkError, DocweaveError, FnGenerator, GenerateError, Generator,
    PipelineConfig, ProgressCallback, WeaveProgressCallback, WrapperConvention,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// An administrative message of at least `min_chars` characters.
fn message(min_chars: usize) -> String {
    let mut s = String::from(
        "UNCLASSIFIED//\r\n\
         NAVADMIN 042/25\r\n\
         FM CNO WASHINGTON DC\r\n\
         TO NAVADMIN\r\n\
         INFO CNO WASHINGTON DC\r\n\
         BT\r\n\
         SUBJ: FY25 FLEET TRAINING AND READINESS GUIDANCE\r\n\
         REF/A/DOC/OPNAV/01JAN24//\r\n\
         NARR/REF A IS THE FLEET TRAINING INSTRUCTION.//\r\n",
    );
    let mut p = 1;
    while s.len() < min_chars {
        s.push_str(&format!("{p}. Paragraph {p} sets out requirements for units.\r\n"));
        s.push_str(&format!(
            "\ta. Commands shall complete item {p} before the deadline. {}\r\n",
            "Training records are reviewed quarterly by the type commander. ".repeat(3)
        ));
        s.push_str(&format!(
            "\tb. Report completion of item {p} via the chain of command.\r\n\r\n\r\n"
        ));
        p += 1;
    }
    s.push_str("POC: LT J. SMITH, OPNAV N7, 555-0100\r\nBT\r\nUNCLASSIFIED//\r\n");
    s
}

fn fast_config() -> docweave::PipelineConfigBuilder {
    PipelineConfig::builder()
        .retry_base_delay_ms(1)
        .retry_max_delay_ms(2)
        .inter_chunk_delay_ms(0)
}

/// `n` from the `CHUNK n OF m` line of a chunk prompt.
fn chunk_number(prompt: &str) -> usize {
    let start = prompt.find("CHUNK ").expect("prompt names its chunk") + "CHUNK ".len();
    prompt[start..]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .expect("chunk number")
}

fn echo_generator() -> FnGenerator<
    impl Fn(String, String) -> std::future::Ready<Result<String, GenerateError>> + Send + Sync,
> {
    FnGenerator::new(|prompt: String, _content_type: String| {
        std::future::ready(Ok(format!("OUT:{}", prompt.len())))
    })
}

#[derive(Default)]
struct RecordingCallback {
    started: Mutex<Option<usize>>,
    percents: Mutex<Vec<f32>>,
    completed: Mutex<Vec<usize>>,
    errors: Mutex<Vec<usize>>,
    retries: AtomicUsize,
    finished: Mutex<Option<(usize, usize)>>,
}

impl WeaveProgressCallback for RecordingCallback {
    fn on_start(&self, total_chunks: usize) {
        *self.started.lock().unwrap() = Some(total_chunks);
    }
    fn on_progress(&self, percent: f32, _message: &str) {
        self.percents.lock().unwrap().push(percent);
    }
    fn on_chunk_complete(&self, index: usize, _total: usize, _len: usize) {
        self.completed.lock().unwrap().push(index);
    }
    fn on_chunk_error(&self, index: usize, _total: usize, _error: &str) {
        self.errors.lock().unwrap().push(index);
    }
    fn on_retry(&self, _index: usize, _attempt: u32, _error: &str) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }
    fn on_finish(&self, total_chunks: usize, success_count: usize) {
        *self.finished.lock().unwrap() = Some((total_chunks, success_count));
    }
}

// ── End-to-end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn nine_thousand_char_message_round_trip() {
    let text = message(9000);
    assert!(text.len() >= 9000);

    let config = fast_config()
        .max_chunk_size(2000)
        .overlap_percent(20)
        .build()
        .unwrap();

    let normalized = normalize(&text);
    let chunks = segment(&normalized, 2000, 20).unwrap();
    assert!(chunks.len() >= 4, "got {} chunks", chunks.len());

    // Sections come back in document order, each exactly once
    let cores: String = chunks.iter().map(|c| c.core()).collect();
    assert_eq!(cores, normalized);
    for pair in chunks.windows(2) {
        assert!(pair[0].content.ends_with(pair[1].overlap()));
        assert!(pair[1].overlap().chars().count() <= 400);
        assert!(pair[1].context.as_deref().unwrap().starts_with("Previous Context:\n"));
    }

    let doc = weave(&text, &echo_generator(), &config).await.unwrap();

    let wrapper = WrapperConvention::default();
    assert_eq!(wrapper.count_open(&doc.content), 1);
    assert_eq!(wrapper.count_close(&doc.content), 1);
    assert_eq!(doc.content.matches("OUT:").count(), chunks.len());
    assert_eq!(doc.stats.total_chunks, chunks.len());
    assert_eq!(doc.stats.processed_chunks, chunks.len());
    assert_eq!(doc.stats.total_attempts as usize, chunks.len());
    assert!(doc.is_complete());
    assert!(doc.chunks.iter().enumerate().all(|(i, r)| r.index == i));
}

#[tokio::test]
async fn single_chunk_output_is_returned_unchanged() {
    let text = "SUBJ: SHORT NOTICE\n1. Purpose. Brief.";
    let html = "<html><body><main><h1>Notice</h1><p>Brief.</p></main></body></html>";
    let g = FnGenerator::new(move |_p: String, _c: String| async move {
        Ok::<_, GenerateError>(html.to_string())
    });
    let doc = weave(text, &g, &fast_config().build().unwrap()).await.unwrap();
    assert_eq!(doc.stats.total_chunks, 1);
    assert_eq!(doc.content, html);
}

#[tokio::test]
async fn repeated_wrappers_and_titles_are_collapsed() {
    // A generator that ignores the position rules and emits a full document
    // for every chunk.
    let g = FnGenerator::new(|prompt: String, _c: String| async move {
        let n = chunk_number(&prompt);
        Ok::<_, GenerateError>(format!(
            "<main class=\"study-guide\">\n<header><h1>NAVADMIN 042/25</h1></header>\n\
             <section id=\"part-{n}\">part {n}</section>\n</main>"
        ))
    });
    let config = fast_config().max_chunk_size(1500).build().unwrap();
    let doc = weave(&message(6000), &g, &config).await.unwrap();

    let n = doc.stats.total_chunks;
    assert!(n > 2);
    assert_eq!(doc.content.matches("<main").count(), 1);
    assert_eq!(doc.content.matches("</main>").count(), 1);
    assert_eq!(doc.content.matches("<header>").count(), 1);
    let positions: Vec<usize> = (1..=n)
        .map(|i| doc.content.find(&format!("part-{i}\"")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn prompts_follow_chunk_position() {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&prompts);
    let g = FnGenerator::new(move |prompt: String, _c: String| {
        sink.lock().unwrap().push(prompt);
        async { Ok::<_, GenerateError>("<p>ok</p>".to_string()) }
    });
    let config = fast_config().max_chunk_size(1500).build().unwrap();
    weave(&message(5000), &g, &config).await.unwrap();

    let prompts = prompts.lock().unwrap();
    let n = prompts.len();
    assert!(n >= 3);
    assert!(prompts[0].contains(&format!("CHUNK 1 OF {n} (the FIRST chunk)")));
    assert!(!prompts[0].contains("Previous Context:"));
    assert!(prompts[1].contains("a MIDDLE chunk"));
    assert!(prompts[1].contains("Previous Context:\nNAVADMIN 042/25"));
    assert!(prompts[n - 1].contains("the LAST chunk"));
    assert!(prompts[n - 1].contains("closing </main>"));
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn always_failing_generator_hits_attempt_ceiling() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let g = FnGenerator::new(move |_p: String, _c: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(GenerateError::Transient("503 Service Unavailable".into())) }
    });
    let config = fast_config()
        .max_chunk_size(2000)
        .max_attempts(4)
        .build()
        .unwrap();
    let text = message(7000);
    let expected_chunks = segment(&normalize(&text), 2000, 10).unwrap().len();

    let err = weave(&text, &g, &config).await.unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), expected_chunks * 4);
    match err {
        DocweaveError::NoValidContent { total, first_error } => {
            assert_eq!(total, expected_chunks);
            assert!(first_error.contains("after 4 attempt(s)"), "{first_error}");
        }
        other => panic!("expected NoValidContent, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_chunk_is_dropped_and_reported() {
    let g = FnGenerator::new(|prompt: String, _c: String| async move {
        match chunk_number(&prompt) {
            2 => Err(GenerateError::Transient("connection reset".into())),
            n => Ok(format!("<p>chunk {n}</p>")),
        }
    });
    let config = fast_config().max_chunk_size(1500).build().unwrap();
    let doc = weave(&message(5000), &g, &config).await.unwrap();

    assert_eq!(doc.stats.dropped_chunks, vec![1]);
    assert_eq!(doc.stats.processed_chunks, doc.stats.total_chunks - 1);
    assert!(!doc.content.contains("chunk 2<"));
    assert!(doc.content.contains("chunk 1<") && doc.content.contains("chunk 3<"));
    assert!(matches!(
        doc.chunks[1].error,
        Some(ChunkError::GenerationFailed { chunk: 1, attempts: 3, .. })
    ));

    match doc.into_strict() {
        Err(DocweaveError::PartialFailure { failed: 1, .. }) => {}
        other => panic!("expected PartialFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let g = FnGenerator::new(move |_p: String, _c: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<String, _>(GenerateError::Fatal("401 invalid api key".into())) }
    });
    let config = fast_config().max_attempts(5).build().unwrap();
    let err = weave("SUBJ: X\n1. One.", &g, &config).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, DocweaveError::NoValidContent { total: 1, .. }));
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_events_cover_every_chunk() {
    let recorder = Arc::new(RecordingCallback::default());
    let cb: ProgressCallback = recorder.clone();

    // Fails the first attempt of every chunk, succeeds on the second.
    let calls = Arc::new(Mutex::new(std::collections::HashSet::new()));
    let g = FnGenerator::new(move |prompt: String, _c: String| {
        let first_try = calls.lock().unwrap().insert(chunk_number(&prompt));
        async move {
            if first_try {
                Err(GenerateError::RateLimited {
                    retry_after_secs: None,
                })
            } else {
                Ok("<p>ok</p>".to_string())
            }
        }
    });
    let config = fast_config()
        .max_chunk_size(1500)
        .progress_callback(cb)
        .build()
        .unwrap();
    let doc = weave(&message(5000), &g, &config).await.unwrap();
    let n = doc.stats.total_chunks;

    assert_eq!(*recorder.started.lock().unwrap(), Some(n));
    assert_eq!(*recorder.completed.lock().unwrap(), (0..n).collect::<Vec<_>>());
    assert!(recorder.errors.lock().unwrap().is_empty());
    assert_eq!(recorder.retries.load(Ordering::SeqCst), n);
    assert_eq!(*recorder.finished.lock().unwrap(), Some((n, n)));
    assert_eq!(doc.stats.total_attempts as usize, 2 * n);

    let percents = recorder.percents.lock().unwrap();
    assert_eq!(percents.len(), 2 * n);
    assert_eq!(percents[0], 0.0);
    assert_eq!(*percents.last().unwrap(), 100.0);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_returns_completed_chunks() {
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    let g = FnGenerator::new(move |prompt: String, _c: String| {
        let n = chunk_number(&prompt);
        if n == 2 {
            // The call in flight still completes.
            trigger.cancel();
        }
        async move { Ok::<_, GenerateError>(format!("<p>chunk {n}</p>")) }
    });
    let config = fast_config().max_chunk_size(1500).build().unwrap();
    let doc = weave_with_cancel(&message(6000), &g, &config, &cancel)
        .await
        .unwrap();

    assert!(doc.stats.total_chunks > 2);
    assert!(doc.stats.cancelled);
    assert_eq!(doc.stats.processed_chunks, 2);
    assert_eq!(doc.chunks.len(), 2);
    assert!(!doc.is_complete());
    assert!(doc.content.contains("chunk 2<"));
    assert!(!doc.content.contains("chunk 3<"));
    assert_eq!(WrapperConvention::default().count_close(&doc.content), 1);
}

// ── File output and sync wrapper ─────────────────────────────────────────────

#[tokio::test]
async fn weave_file_writes_document() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("navadmin.txt");
    let output = dir.path().join("out").join("guide.html");
    std::fs::write(&input, message(4000)).unwrap();

    let config = fast_config().max_chunk_size(1500).build().unwrap();
    let stats = weave_file(&input, &output, &echo_generator(), &config)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written.matches("OUT:").count(), stats.processed_chunks);
    assert!(written.starts_with("<main"));
    let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn weave_file_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = weave_file(
        dir.path().join("missing.txt"),
        dir.path().join("out.html"),
        &echo_generator(),
        &fast_config().build().unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DocweaveError::InputReadFailed { .. }));
}

#[test]
fn weave_sync_outside_runtime() {
    let doc = weave_sync(
        "SUBJ: SYNC\n1. One.",
        &echo_generator(),
        &fast_config().build().unwrap(),
    )
    .unwrap();
    assert!(doc.content.starts_with("OUT:"));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_one_result_per_chunk() {
    let text = normalize(&message(5000));
    let chunks = segment(&text, 1500, 10).unwrap();
    let expected = chunks.len();
    let g: Arc<dyn Generator> = Arc::new(echo_generator());
    let config = fast_config().max_chunk_size(1500).build().unwrap();

    let results: Vec<_> = process_stream(chunks, g, config).collect().await;
    assert_eq!(results.len(), expected);
    assert!(results.iter().all(|r| r.is_success()));
    assert!(results.iter().enumerate().all(|(i, r)| r.index == i));
}
