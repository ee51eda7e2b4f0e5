//! Fixed-window request counting per caller key.
//!
//! Each key owns one record `{count, reset_at}`. A request that arrives with
//! no record, or after `reset_at`, opens a fresh window with count 1; any
//! other request increments the count in place. Expired records are removed
//! lazily on read and in bulk by [`RateLimiter::sweep`], which
//! [`RateLimiter::spawn_sweeper`] runs on a fixed interval so abandoned keys
//! do not accumulate.
//!
//! All state lives behind one mutex and every operation holds it for a
//! single map mutation. The limiter is meant to be built once, wrapped in an
//! `Arc`, and handed to whatever gates incoming work:
//!
//! ```rust
//! use docweave::{RateLimitConfig, RateLimiter};
//! use std::sync::Arc;
//!
//! let config = RateLimitConfig::builder().max_requests(2).build().unwrap();
//! let limiter = Arc::new(RateLimiter::new(config));
//!
//! assert!(limiter.check("user-42").allowed);
//! assert!(limiter.check("user-42").allowed);
//! assert!(!limiter.check("user-42").allowed);
//! assert!(limiter.check("user-7").allowed);
//! ```

use crate::config::RateLimitConfig;
use crate::error::DocweaveError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// ── Clock ────────────────────────────────────────────────────────────────

/// Source of "now" for window arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Limiter ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u64,
    reset_at: Instant,
}

impl RateLimitRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests counted in the current window, this one included.
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the window resets.
    pub reset_after: Duration,
}

/// Per-key fixed-window request counter.
pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<HashMap<String, RateLimitRecord>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("keys", &self.len())
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        // A panic mid-operation cannot leave a record half-written, so the
        // map is still consistent after poisoning.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request for `key` in a window of length `window`.
    ///
    /// Returns the count after this request: 1 when a new window opens.
    pub fn increment(&self, key: &str, window: Duration) -> u64 {
        self.count_request(key, window).0
    }

    /// Increment `key` and read its remaining window under one lock.
    fn count_request(&self, key: &str, window: Duration) -> (u64, Duration) {
        let now = self.clock.now();
        let fresh = RateLimitRecord {
            count: 0,
            reset_at: window_end(now, window),
        };
        let mut records = self.records();
        let record = records.entry(key.to_string()).or_insert(fresh);
        if record.is_expired(now) {
            *record = fresh;
        }
        record.count += 1;
        (record.count, record.reset_at.saturating_duration_since(now))
    }

    /// Requests counted for `key` in its current window; 0 if none.
    ///
    /// An expired record is removed on the way out.
    pub fn get(&self, key: &str) -> u64 {
        let now = self.clock.now();
        let mut records = self.records();
        match records.get(key).map(|r| (r.count, r.is_expired(now))) {
            None => 0,
            Some((_, true)) => {
                records.remove(key);
                0
            }
            Some((count, false)) => count,
        }
    }

    /// Whole seconds until `key`'s window resets, rounded up; 0 if absent.
    pub fn ttl(&self, key: &str) -> u64 {
        self.remaining_window(key).map(ceil_secs).unwrap_or(0)
    }

    fn remaining_window(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.records()
            .get(key)
            .map(|r| r.reset_at.saturating_duration_since(now))
    }

    /// Drop every expired record. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        before - records.len()
    }

    /// Number of records currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget `key` entirely.
    pub fn reset(&self, key: &str) {
        self.records().remove(key);
    }

    /// Count a request for `key` under the configured window and limit.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let (count, reset_after) = self.count_request(key, self.config.window);
        let limit = self.config.max_requests;
        RateLimitDecision {
            allowed: count <= limit,
            count,
            limit,
            remaining: limit.saturating_sub(count),
            reset_after,
        }
    }

    /// [`check`](Self::check), turning a refusal into an error.
    pub fn gate(&self, key: &str) -> Result<RateLimitDecision, DocweaveError> {
        let decision = self.check(key);
        if decision.allowed {
            Ok(decision)
        } else {
            debug!(key, count = decision.count, "Rate limit exceeded");
            Err(DocweaveError::RateLimited {
                key: key.to_string(),
                retry_after_secs: ceil_secs(decision.reset_after),
            })
        }
    }

    /// Run [`sweep`](Self::sweep) every `config.sweep_interval` on the tokio
    /// runtime.
    ///
    /// The task holds only a weak reference and exits once the last `Arc`
    /// to the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    debug!("Rate limiter dropped; sweeper exiting");
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    info!(removed, remaining = limiter.len(), "Swept expired rate-limit records");
                }
            }
        })
    }
}

/// Longest window an `Instant` is trusted to represent; larger windows are
/// clamped to it.
const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn window_end(now: Instant, window: Duration) -> Instant {
    now.checked_add(window)
        .or_else(|| now.checked_add(MAX_WINDOW))
        .unwrap_or(now)
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

// ── External-store surface ───────────────────────────────────────────────

/// The subset of a networked counter store's commands that rate limiting
/// needs, so an in-process limiter can stand in for one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, returning the new count.
    async fn incr(&self, key: &str) -> u64;
    /// Set a key's expiry in seconds. Stores with fixed windows only
    /// acknowledge the call and return `true`.
    async fn expire(&self, key: &str, seconds: u64) -> bool;
    /// Seconds until `key` expires; 0 if absent.
    async fn ttl(&self, key: &str) -> u64;
    /// Current count, `None` for absent or expired keys.
    async fn get(&self, key: &str) -> Option<u64>;
    async fn ping(&self) -> String;
}

#[async_trait]
impl CounterStore for RateLimiter {
    async fn incr(&self, key: &str) -> u64 {
        self.increment(key, self.config.window)
    }

    /// Windows are fixed at creation, so this only acknowledges the call.
    async fn expire(&self, _key: &str, _seconds: u64) -> bool {
        true
    }

    async fn ttl(&self, key: &str) -> u64 {
        RateLimiter::ttl(self, key)
    }

    async fn get(&self, key: &str) -> Option<u64> {
        match RateLimiter::get(self, key) {
            0 => None,
            n => Some(n),
        }
    }

    async fn ping(&self) -> String {
        "PONG".to_string()
    }
}
