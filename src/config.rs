//! Configuration types for the chunking pipeline and the rate limiter.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]; rate limiting through [`RateLimitConfig`].
//! Both builders validate in `build()`, so a malformed configuration fails
//! before any text is segmented or any request is counted.

use crate::convention::DocumentConvention;
use crate::error::DocweaveError;
use crate::pipeline::combine::WrapperConvention;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use std::fmt;
use std::time::Duration;

/// Default content type handed to the generator.
pub const DEFAULT_CONTENT_TYPE: &str = "study-guide";

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use docweave::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_chunk_size(2000)
///     .overlap_percent(20)
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.overlap_chars(), 400);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters, overlap excluded. Default: 4000.
    ///
    /// Pick it so that one chunk plus the prompt scaffolding and the
    /// carry-forward context stays inside the model's input budget.
    pub max_chunk_size: usize,

    /// Overlap between adjacent chunks, as a percentage of
    /// `max_chunk_size`. Range 0–99. Default: 10.
    pub overlap_percent: usize,

    /// Character budget for the carry-forward context. Default: 500.
    pub max_context_length: usize,

    /// Retry budget and backoff for each generator call.
    pub retry: RetryPolicy,

    /// Pause before every chunk after the first. Default: 1 s.
    ///
    /// Spreads calls out so a burst of chunks does not trip the provider's
    /// requests-per-minute limit.
    pub inter_chunk_delay: Duration,

    /// Per-call timeout for the generator. Default: none.
    pub generate_timeout: Option<Duration>,

    /// Content type passed to every `generate` call. Default: "study-guide".
    pub content_type: String,

    /// Replaces the built-in base instructions at the top of every chunk prompt.
    pub instructions: Option<String>,

    /// Section markers used to split the document.
    pub convention: DocumentConvention,

    /// Wrapper markers used to recombine generated output.
    pub wrapper: WrapperConvention,

    /// Receives per-chunk progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 4000,
            overlap_percent: 10,
            max_context_length: 500,
            retry: RetryPolicy::default(),
            inter_chunk_delay: Duration::from_millis(1000),
            generate_timeout: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            instructions: None,
            convention: DocumentConvention::default(),
            wrapper: WrapperConvention::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_chunk_size", &self.max_chunk_size)
            .field("overlap_percent", &self.overlap_percent)
            .field("max_context_length", &self.max_context_length)
            .field("retry", &self.retry)
            .field("inter_chunk_delay", &self.inter_chunk_delay)
            .field("generate_timeout", &self.generate_timeout)
            .field("content_type", &self.content_type)
            .field("instructions", &self.instructions.as_ref().map(|s| s.len()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn WeaveProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Overlap size in characters.
    pub fn overlap_chars(&self) -> usize {
        self.max_chunk_size * self.overlap_percent / 100
    }

    /// Re-run the builder checks on a config assembled by hand.
    pub fn validate(&self) -> Result<(), DocweaveError> {
        if self.max_chunk_size == 0 {
            return Err(DocweaveError::InvalidConfig(
                "max chunk size must be > 0".into(),
            ));
        }
        if self.overlap_percent >= 100 {
            return Err(DocweaveError::InvalidConfig(format!(
                "overlap percent must be 0–99, got {}",
                self.overlap_percent
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(DocweaveError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(DocweaveError::InvalidConfig(format!(
                "base retry delay ({:?}) exceeds max retry delay ({:?})",
                self.retry.base_delay, self.retry.max_delay
            )));
        }
        if self.content_type.trim().is_empty() {
            return Err(DocweaveError::InvalidConfig(
                "content type must not be empty".into(),
            ));
        }
        if self.generate_timeout.is_some_and(|t| t.is_zero()) {
            return Err(DocweaveError::InvalidConfig(
                "generate timeout must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_chunk_size(mut self, chars: usize) -> Self {
        self.config.max_chunk_size = chars;
        self
    }

    pub fn overlap_percent(mut self, percent: usize) -> Self {
        self.config.overlap_percent = percent;
        self
    }

    pub fn max_context_length(mut self, chars: usize) -> Self {
        self.config.max_context_length = chars;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay = Duration::from_millis(ms);
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay = Duration::from_millis(ms);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn inter_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_chunk_delay = Duration::from_millis(ms);
        self
    }

    pub fn generate_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generate_timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn generate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.generate_timeout = timeout;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.content_type = content_type.into();
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn convention(mut self, convention: DocumentConvention) -> Self {
        self.config.convention = convention;
        self
    }

    pub fn wrapper(mut self, wrapper: WrapperConvention) -> Self {
        self.config.wrapper = wrapper;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocweaveError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Rate limiting ────────────────────────────────────────────────────────

/// Configuration for [`crate::ratelimit::RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of one counting window. Default: 60 s.
    pub window: Duration,
    /// Requests allowed per key per window. Default: 100.
    pub max_requests: u64,
    /// How often the background sweep drops expired records. Default: 5 min.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 100,
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Debug)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn window_ms(mut self, ms: u64) -> Self {
        self.config.window = Duration::from_millis(ms);
        self
    }

    pub fn max_requests(mut self, n: u64) -> Self {
        self.config.max_requests = n;
        self
    }

    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    pub fn build(self) -> Result<RateLimitConfig, DocweaveError> {
        let c = &self.config;
        if c.window.is_zero() {
            return Err(DocweaveError::InvalidConfig(
                "rate-limit window must be > 0".into(),
            ));
        }
        if c.max_requests == 0 {
            return Err(DocweaveError::InvalidConfig(
                "max requests per window must be ≥ 1".into(),
            ));
        }
        if c.sweep_interval.is_zero() {
            return Err(DocweaveError::InvalidConfig(
                "sweep interval must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
