//! Generation: send one chunk prompt to the generator and collect its output.
//!
//! This module is intentionally thin. All prompt wording lives in
//! [`crate::prompts`] and the backoff arithmetic in [`crate::retry`]; what
//! remains here is the [`Generator`] seam, the `edgequake-llm` adapter, and
//! [`process_chunk`], which never propagates a failure upward so a single
//! bad chunk does not abort the whole document.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! sustained load. Every call is retried with exponential backoff
//! (`base_delay * 2^(attempt-1)`, capped) unless the error is classified as
//! [`GenerateError::Fatal`]. An empty response is treated as transient.

use crate::config::PipelineConfig;
use crate::error::{ChunkError, DocweaveError, GenerateError};
use crate::output::ChunkResult;
use crate::pipeline::segment::Chunk;
use crate::prompts::{chunk_prompt, system_prompt};
use crate::retry::retry_if;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Sampling temperature used unless overridden with `with_temperature`.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Output-token cap per chunk unless overridden with `with_max_tokens`.
pub const DEFAULT_MAX_TOKENS: usize = 8192;

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, content_type: &str) -> Result<String, GenerateError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, prompt: &str, content_type: &str) -> Result<String, GenerateError> {
        (**self).generate(prompt, content_type).await
    }
}

/// Wraps an async closure `(prompt, content_type) -> Result<String, GenerateError>`.
///
/// ```rust
/// use docweave::{FnGenerator, GenerateError};
///
/// let echo = FnGenerator::new(|prompt: String, _content_type: String| async move {
///     Ok::<_, GenerateError>(format!("OUT:{}", prompt.len()))
/// });
/// # let _ = echo;
/// ```
pub struct FnGenerator<F> {
    f: F,
}

impl<F, Fut> FnGenerator<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, GenerateError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Generator for FnGenerator<F>
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, GenerateError>> + Send,
{
    async fn generate(&self, prompt: &str, content_type: &str) -> Result<String, GenerateError> {
        (self.f)(prompt.to_string(), content_type.to_string()).await
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`Generator`] backed by an `edgequake-llm` chat provider.
///
/// Each call sends two messages: the system prompt (built from the content
/// type) and the chunk prompt as the user turn.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Resolve a provider, from most-specific to least-specific.
    ///
    /// 1. **Named provider** (`provider_name`): built with `model`, or
    ///    [`DEFAULT_MODEL`]. The factory reads the matching API key from the
    ///    environment.
    /// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
    ///    both non-empty).
    /// 3. **OpenAI key present** (`OPENAI_API_KEY`): OpenAI with `model`.
    /// 4. **Full auto-detection** via [`ProviderFactory::from_env`].
    pub fn resolve(provider_name: Option<&str>, model: Option<&str>) -> Result<Self, DocweaveError> {
        let model_or_default = model.unwrap_or(DEFAULT_MODEL);

        if let Some(name) = provider_name {
            return create_provider(name, model_or_default).map(Self::new);
        }

        if let (Ok(prov), Ok(env_model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !env_model.is_empty() {
                return create_provider(&prov, &env_model).map(Self::new);
            }
        }

        if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
            if !openai_key.is_empty() {
                return create_provider("openai", model_or_default).map(Self::new);
            }
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| DocweaveError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                    Error: {}",
                    e
                ),
            })?;

        Ok(Self::new(llm_provider))
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, prompt: &str, content_type: &str) -> Result<String, GenerateError> {
        let messages = vec![
            ChatMessage::system(system_prompt(content_type)),
            ChatMessage::user(prompt),
        ];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocweaveError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocweaveError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Map a provider error message onto a [`GenerateError`].
///
/// Providers report failures as opaque strings; status codes and a few
/// well-known phrases are enough to separate "wait and retry" from "give up".
pub fn classify_provider_error(message: &str) -> GenerateError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        GenerateError::RateLimited {
            retry_after_secs: None,
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        GenerateError::Fatal(message.to_string())
    } else {
        GenerateError::Transient(message.to_string())
    }
}

// ── Per-chunk processing ─────────────────────────────────────────────────

/// One generator call, bounded by `timeout` when set.
pub async fn call_generator(
    generator: &dyn Generator,
    prompt: &str,
    content_type: &str,
    timeout: Option<Duration>,
) -> Result<String, GenerateError> {
    let output = match timeout {
        None => generator.generate(prompt, content_type).await?,
        Some(limit) => tokio::time::timeout(limit, generator.generate(prompt, content_type))
            .await
            .map_err(|_| GenerateError::Timeout {
                elapsed_ms: limit.as_millis() as u64,
            })??,
    };
    if output.trim().is_empty() {
        return Err(GenerateError::Transient("generator returned empty output".into()));
    }
    Ok(output)
}

/// Generate output for one chunk.
///
/// ## Return Value
///
/// Always returns a [`ChunkResult`]; a chunk that fails every attempt (or
/// hits a fatal error) carries [`ChunkError::GenerationFailed`] and no output.
/// The caller decides whether to drop it or abort.
pub async fn process_chunk(
    generator: &dyn Generator,
    chunk: &Chunk,
    config: &PipelineConfig,
) -> ChunkResult {
    let start = Instant::now();
    let prompt = chunk_prompt(chunk, config);
    let index = chunk.index;
    let max_attempts = config.retry.max_attempts;

    let result = retry_if(
        &config.retry,
        |_attempt| call_generator(generator, &prompt, &config.content_type, config.generate_timeout),
        GenerateError::is_retryable,
        |attempt, err| {
            warn!(
                "Chunk {}: attempt {}/{} failed: {}; retrying in {}ms",
                index + 1,
                attempt,
                max_attempts,
                err,
                config.retry.delay_for(attempt).as_millis()
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_retry(index, attempt, &err.to_string());
            }
        },
    )
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(done) => {
            debug!(
                "Chunk {}: {} chars generated in {}ms ({} attempt(s))",
                index + 1,
                done.value.len(),
                duration_ms,
                done.attempts
            );
            ChunkResult {
                index,
                output: done.value,
                attempts: done.attempts,
                duration_ms,
                error: None,
            }
        }
        Err(failed) => {
            warn!(
                "Chunk {}: giving up after {} attempt(s): {}",
                index + 1,
                failed.attempts,
                failed.value
            );
            ChunkResult {
                index,
                output: String::new(),
                attempts: failed.attempts,
                duration_ms,
                error: Some(ChunkError::GenerationFailed {
                    chunk: index,
                    attempts: failed.attempts,
                    detail: failed.value.to_string(),
                }),
            }
        }
    }
}
