//! CLI binary for docweave.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the pipeline and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docweave::{
    normalize, weave_with_cancel, write_document, CancelHandle, Chunk, CombinedDocument,
    LlmGenerator, PipelineConfig, ProgressCallback, Segmenter, WeaveProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    /// When the current chunk started (delay included).
    chunk_start: Mutex<Instant>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner-only until `on_start` reports the chunk count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Segmenting document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            chunk_start: Mutex::new(Instant::now()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn lap(&self) -> f64 {
        let mut start = self.chunk_start.lock().unwrap();
        let secs = start.elapsed().as_secs_f64();
        *start = Instant::now();
        secs
    }
}

impl WeaveProgressCallback for CliProgressCallback {
    fn on_start(&self, total_chunks: usize) {
        self.activate_bar(total_chunks);
        *self.chunk_start.lock().unwrap() = Instant::now();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_chunks} chunk(s)…"))
        ));
    }

    fn on_progress(&self, _percent: f32, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_chunk_complete(&self, index: usize, total: usize, output_len: usize) {
        let secs = self.lap();
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{output_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.lap();
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_retry(&self, index: usize, attempt: u32, error: &str) {
        self.bar.println(format!(
            "    {} chunk {} attempt {} failed: {}",
            yellow("↻"),
            index + 1,
            attempt,
            dim(error)
        ));
    }

    fn on_finish(&self, total_chunks: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);

        if success_count == total_chunks {
            eprintln!(
                "{} {} chunks generated successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} chunks generated  ({} failed)",
                if success_count == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_chunks,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a study guide (stdout)
  docweave navadmin_042_25.txt

  # Write to a file
  docweave navadmin_042_25.txt -o guide.html

  # Read from stdin
  cat message.txt | docweave - -o guide.html

  # Inspect how a message would be split (no API key needed)
  docweave --segment-only --max-chunk-size 2000 --overlap 20 message.txt

  # Same, as JSON
  docweave --segment-only --json message.txt > chunks.json

  # Use a specific model
  docweave --provider anthropic --model claude-sonnet-4-20250514 message.txt

  # Custom instructions and content type
  docweave --instructions flashcards.txt --content-type flashcards message.txt

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override the log filter (e.g. docweave=debug)

Ctrl-C stops after the chunk in flight; finished chunks are still combined
and written.
"#;

/// Turn long structured documents into generated documents, chunk by chunk.
#[derive(Parser, Debug)]
#[command(
    name = "docweave",
    version,
    about = "Chunk long structured documents through an LLM and recombine the output",
    long_about = "Split long administrative messages at their section markers, send each chunk \
to an LLM with carried-forward context, and recombine the outputs into one document with a \
single wrapper and title. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any \
OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input text file, or `-` for stdin.
    input: String,

    /// Write the document to this file instead of stdout.
    #[arg(short, long, env = "DOCWEAVE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Maximum chunk size in characters (overlap excluded).
    #[arg(long, env = "DOCWEAVE_MAX_CHUNK_SIZE", default_value_t = 4000)]
    max_chunk_size: usize,

    /// Overlap between chunks, percent of the chunk size (0–99).
    #[arg(long, env = "DOCWEAVE_OVERLAP", default_value_t = 10,
          value_parser = clap::value_parser!(u8).range(0..=99))]
    overlap: u8,

    /// Character budget for the context carried to the next chunk.
    #[arg(long, env = "DOCWEAVE_MAX_CONTEXT", default_value_t = 500)]
    max_context: usize,

    /// Attempts per chunk, first call included.
    #[arg(long, env = "DOCWEAVE_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Backoff after the first failed attempt, in milliseconds.
    #[arg(long, env = "DOCWEAVE_RETRY_BASE_MS", default_value_t = 1000)]
    retry_base_ms: u64,

    /// Upper bound for any single backoff, in milliseconds.
    #[arg(long, env = "DOCWEAVE_RETRY_MAX_MS", default_value_t = 10_000)]
    retry_max_ms: u64,

    /// Pause between chunks, in milliseconds.
    #[arg(long, env = "DOCWEAVE_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Per-call LLM timeout in seconds (no timeout when unset).
    #[arg(long, env = "DOCWEAVE_TIMEOUT")]
    timeout: Option<u64>,

    /// Content type passed to the generator.
    #[arg(long, env = "DOCWEAVE_CONTENT_TYPE", default_value = docweave::config::DEFAULT_CONTENT_TYPE)]
    content_type: String,

    /// Path to a text file replacing the built-in base instructions.
    #[arg(long, env = "DOCWEAVE_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "DOCWEAVE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCWEAVE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Fail if any chunk was dropped.
    #[arg(long, env = "DOCWEAVE_STRICT")]
    strict: bool,

    /// Print the segmentation only; no LLM calls.
    #[arg(long)]
    segment_only: bool,

    /// Output structured JSON instead of the document.
    #[arg(long, env = "DOCWEAVE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCWEAVE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCWEAVE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCWEAVE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.segment_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let text = read_input(&cli.input).await?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn WeaveProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Segment-only mode ────────────────────────────────────────────────
    if cli.segment_only {
        let chunks = Segmenter::from_config(&config)
            .context("Invalid configuration")?
            .segment(&normalize(&text));
        print_segmentation(&chunks, cli.json)?;
        return Ok(());
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    let generator = LlmGenerator::resolve(cli.provider.as_deref(), cli.model.as_deref())
        .context("Failed to configure LLM provider")?
        .with_temperature(cli.temperature.clamp(0.0, 2.0))
        .with_max_tokens(cli.max_tokens);

    let cancel = CancelHandle::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", yellow("Cancelling after the current chunk…"));
            on_signal.cancel();
        }
    });

    let mut doc = weave_with_cancel(&text, &generator, &config, &cancel)
        .await
        .context("Processing failed")?;
    if cli.strict {
        doc = doc.into_strict().context("Processing incomplete")?;
    }

    if let Some(ref output_path) = cli.output {
        let body = if cli.json {
            serde_json::to_string_pretty(&doc).context("Failed to serialise output")?
        } else {
            doc.content.clone()
        };
        write_document(output_path, &body)
            .await
            .context("Failed to write output")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} chunks  {}ms  →  {}",
                status_mark(&doc),
                doc.stats.processed_chunks,
                doc.stats.total_chunks,
                doc.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        if cli.json {
            let json = serde_json::to_string_pretty(&doc).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(doc.content.as_bytes())
                .context("Failed to write to stdout")?;
            if !doc.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet && !show_progress && !cli.json {
            eprintln!(
                "Generated {}/{} chunks in {}ms",
                doc.stats.processed_chunks, doc.stats.total_chunks, doc.stats.total_duration_ms
            );
        }
    }

    if !cli.quiet {
        if !doc.stats.dropped_chunks.is_empty() {
            let dropped: Vec<String> = doc
                .stats
                .dropped_chunks
                .iter()
                .map(|i| (i + 1).to_string())
                .collect();
            eprintln!("   dropped chunks: {}", red(&dropped.join(", ")));
        }
        if doc.stats.cancelled {
            eprintln!("   {}", yellow("cancelled; document is partial"));
        }
    }

    Ok(())
}

fn status_mark(doc: &CombinedDocument) -> String {
    if doc.is_complete() {
        green("✔")
    } else {
        cyan("⚠")
    }
}

/// Read the input document from a file or stdin.
async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read input from {input:?}"))
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_chunk_size(cli.max_chunk_size)
        .overlap_percent(cli.overlap as usize)
        .max_context_length(cli.max_context)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_base_ms)
        .retry_max_delay_ms(cli.retry_max_ms)
        .inter_chunk_delay_ms(cli.delay_ms)
        .generate_timeout(cli.timeout.map(Duration::from_secs))
        .content_type(cli.content_type.clone());

    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_segmentation(chunks: &[Chunk], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(chunks).context("Failed to serialise chunks")?
        );
        return Ok(());
    }

    println!("Chunks:       {}", chunks.len());
    for chunk in chunks {
        println!();
        println!(
            "{} {}/{}  {} chars  (overlap {}, core {})",
            cyan("──"),
            chunk.index + 1,
            chunk.total,
            chunk.char_len(),
            chunk.overlap().chars().count(),
            chunk.core().chars().count(),
        );
        if let Some(ref ctx) = chunk.context {
            for line in ctx.lines() {
                println!("   {}", dim(line));
            }
        }
        let first_line = chunk.core().lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        println!("   starts: {}", first_line.chars().take(72).collect::<String>());
    }
    Ok(())
}
