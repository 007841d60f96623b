//! Per-key and per-model rate limiting (SPEC_FULL.md §4.2, §4.3).
//!
//! The spec's "natural fit: a single-thread-per-op Redis instance" is an
//! implementation suggestion, not a requirement — this gateway runs as a
//! single process, so the same atomicity is had cheaper with in-process
//! maps. `DashMap` gives per-shard locking so concurrent requests for
//! different keys/models never contend; entries for the same key still
//! serialize correctly because `DashMap::entry` holds the shard lock for
//! the duration of the read-modify-write.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

const WINDOW_SECS: i64 = 60;
const WINDOW_MS: i64 = WINDOW_SECS * 1000;

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Fixed 60s window RPM counter, keyed `rpm:{key_id}:{floor(now/60)}`.
pub struct RpmLimiter {
    counters: DashMap<(i64, i64), AtomicU64>,
}

impl Default for RpmLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RpmLimiter {
    pub fn new() -> Self {
        Self { counters: DashMap::new() }
    }

    /// Increments the counter for the current window and reports whether
    /// the post-increment value exceeds `limit`. Also returns the
    /// remaining budget for the `X-RateLimit-Remaining-RPM` header.
    pub fn check_and_increment(&self, key_id: i64, limit: u32) -> RpmOutcome {
        let window = now_ms() / WINDOW_MS;
        let counter = self.counters.entry((key_id, window)).or_insert_with(|| AtomicU64::new(0));
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        // Opportunistically drop the previous window's counter; bounded
        // growth without a background sweep thread.
        self.counters.remove(&(key_id, window - 1));
        RpmOutcome {
            allowed: count <= limit as u64,
            limit,
            remaining: limit.saturating_sub(count as u32),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RpmOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Rolling 60s window of token consumption per key, keyed `tpm:{key_id}`.
/// Modeled as a time-ordered deque rather than a true sorted set since
/// entries are always appended in non-decreasing timestamp order.
pub struct TpmLimiter {
    windows: DashMap<i64, Mutex<VecDeque<(i64, i64)>>>,
}

impl Default for TpmLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TpmLimiter {
    pub fn new() -> Self {
        Self { windows: DashMap::new() }
    }

    fn prune_and_sum(deque: &mut VecDeque<(i64, i64)>, now: i64) -> i64 {
        while let Some(&(ts, _)) = deque.front() {
            if now - ts > WINDOW_MS {
                deque.pop_front();
            } else {
                break;
            }
        }
        deque.iter().map(|(_, tokens)| tokens).sum()
    }

    /// Pre-flight check only — does not consume. Returns the current
    /// rolling-window sum and whether it already meets or exceeds `limit`.
    pub fn check(&self, key_id: i64, limit: u32) -> TpmOutcome {
        let now = now_ms();
        let entry = self.windows.entry(key_id).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut deque = entry.lock().expect("tpm window lock poisoned");
        let sum = Self::prune_and_sum(&mut deque, now);
        TpmOutcome {
            allowed: sum < limit as i64,
            limit,
            remaining: (limit as i64 - sum).max(0) as u32,
        }
    }

    /// Post-flight consumption (§4.2, §4.8): appends `(now_ms, tokens)`.
    /// Callers must pass `max(0, tokens)` so unknown/negative counts
    /// degrade to zero charge rather than corrupting the window.
    pub fn consume(&self, key_id: i64, tokens: i64) {
        if tokens <= 0 {
            return;
        }
        let now = now_ms();
        let entry = self.windows.entry(key_id).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut deque = entry.lock().expect("tpm window lock poisoned");
        Self::prune_and_sum(&mut deque, now);
        deque.push_back((now, tokens));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TpmOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Independent per-model (optionally per-key) token bucket (§4.3). Default
/// capacity/refill come from `GlobalConfig`; per-model overrides are a
/// read-mostly map replaced wholesale on admin edit (§9 "Global mutable
/// config").
struct BucketState {
    tokens: f64,
    last_refill_ms: AtomicI64,
}

pub struct TokenBucketLimiter {
    buckets: DashMap<String, Mutex<BucketState>>,
    default_capacity: f64,
    default_refill_per_sec: f64,
    overrides: DashMap<String, (f64, f64)>,
}

impl TokenBucketLimiter {
    pub fn new(default_capacity: f64, default_refill_per_sec: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            default_capacity,
            default_refill_per_sec,
            overrides: DashMap::new(),
        }
    }

    /// Replaces the override for `identifier` (a logical model name).
    /// Copy-on-write: admin edits call this once, readers never block on
    /// it since `DashMap::insert` only holds the shard lock briefly.
    pub fn set_override(&self, identifier: impl Into<String>, capacity: f64, refill_per_sec: f64) {
        self.overrides.insert(identifier.into(), (capacity, refill_per_sec));
    }

    fn params(&self, identifier: &str) -> (f64, f64) {
        self.overrides
            .get(identifier)
            .map(|v| *v)
            .unwrap_or((self.default_capacity, self.default_refill_per_sec))
    }

    /// `identifier` is `model` or `model:{api_key}` when scoped per key
    /// (§4.3). Returns `Some(remaining)` on success, `None` if the bucket
    /// doesn't have `n` tokens.
    pub fn consume(&self, identifier: &str, n: f64) -> TokenBucketOutcome {
        let (capacity, refill_per_sec) = self.params(identifier);
        let now = now_ms();
        let entry = self.buckets.entry(identifier.to_string()).or_insert_with(|| {
            Mutex::new(BucketState {
                tokens: capacity,
                last_refill_ms: AtomicI64::new(now),
            })
        });
        let mut state = entry.lock().expect("token bucket lock poisoned");
        let last = state.last_refill_ms.load(Ordering::Relaxed);
        let elapsed_secs = ((now - last).max(0) as f64) / 1000.0;
        state.tokens = (state.tokens + elapsed_secs * refill_per_sec).min(capacity);
        state.last_refill_ms.store(now, Ordering::Relaxed);

        if state.tokens >= n {
            state.tokens -= n;
            TokenBucketOutcome {
                allowed: true,
                limit: capacity as u32,
                remaining: state.tokens as u32,
            }
        } else {
            TokenBucketOutcome {
                allowed: false,
                limit: capacity as u32,
                remaining: state.tokens as u32,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBucketOutcome {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// `metrics:rate_limit_rejections` — a hash of `{comment}:{rpm|tpm}` ->
/// count (§4.2). Kept here rather than shipped to Prometheus since
/// formatting metrics for scraping is explicitly out of scope (§1).
#[derive(Default)]
pub struct RateLimitRejectionMetrics {
    counts: DashMap<String, AtomicU64>,
}

impl RateLimitRejectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, comment: &str, kind: &str) {
        let key = format!("{comment}:{kind}");
        self.counts.entry(key).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, comment: &str, kind: &str) -> u64 {
        let key = format!("{comment}:{kind}");
        self.counts.get(&key).map(|v| v.load(Ordering::Relaxed)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpm_allows_up_to_limit() {
        let limiter = RpmLimiter::new();
        assert!(limiter.check_and_increment(1, 2).allowed);
        assert!(limiter.check_and_increment(1, 2).allowed);
        assert!(!limiter.check_and_increment(1, 2).allowed);
    }

    #[test]
    fn tpm_preflight_does_not_consume() {
        let limiter = TpmLimiter::new();
        limiter.consume(1, 50);
        let first = limiter.check(1, 100);
        let second = limiter.check(1, 100);
        assert_eq!(first.remaining, second.remaining);
    }

    #[test]
    fn tpm_rejects_unknown_negative_tokens() {
        let limiter = TpmLimiter::new();
        limiter.consume(1, -5);
        let outcome = limiter.check(1, 10);
        assert_eq!(outcome.remaining, 10);
    }

    #[test]
    fn token_bucket_rejects_when_empty() {
        let bucket = TokenBucketLimiter::new(1.0, 0.0);
        assert!(bucket.consume("gpt-4", 1.0).allowed);
        assert!(!bucket.consume("gpt-4", 1.0).allowed);
    }
}
