use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    /// Rejected; one more token accrues after `retry_after`.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// Suggested wait before retrying. Zero when allowed.
    pub fn retry_after(&self) -> Duration {
        match self {
            Admission::Allowed => Duration::ZERO,
            Admission::Denied { retry_after } => *retry_after,
        }
    }
}

/// Token bucket for a single client.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Accrue tokens for the time since the last refill, saturating at `capacity`.
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Time for one token to accrue at `rate`, rounded up so that waiting exactly
/// this long always yields a whole token.
///
/// Degenerate rates are rejected by config validation; saturate rather than panic.
fn token_interval(rate: f64) -> Duration {
    let nanos = (1e9 / rate).ceil();
    if !nanos.is_finite() || nanos <= 0.0 || nanos >= u64::MAX as f64 {
        return Duration::MAX;
    }
    let mut interval = Duration::from_nanos(nanos as u64);
    // as_secs_f64 may land a hair under one token after rounding
    if interval.as_secs_f64() * rate < 1.0 {
        interval += Duration::from_nanos(1);
    }
    interval
}

/// Identity → bucket map shared by request handlers and the eviction sweep.
///
/// Each `allow` holds the shard write lock for its key across refill and
/// consumption, so concurrent callers for one identity never spend the same token.
pub struct BucketRegistry {
    buckets: DashMap<String, TokenBucket>,
    rate: f64,
    capacity: f64,
    burst: u32,
    retry_after: Duration,
}

impl BucketRegistry {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rate,
            capacity: burst as f64,
            burst,
            retry_after: token_interval(rate),
        }
    }

    /// Check and consume one token for `identity`, creating a full bucket on first sight.
    pub fn allow(&self, identity: &str) -> Admission {
        let now = Instant::now();

        // Avoid allocating the key on the hot path when the bucket already exists.
        let admitted = match self.buckets.get_mut(identity) {
            Some(mut bucket) => {
                bucket.refill(now, self.rate, self.capacity);
                bucket.try_consume()
            }
            None => {
                let mut bucket = self
                    .buckets
                    .entry(identity.to_string())
                    .or_insert_with(|| TokenBucket::full(self.capacity, now));
                bucket.refill(now, self.rate, self.capacity);
                bucket.try_consume()
            }
        };

        if admitted {
            Admission::Allowed
        } else {
            Admission::Denied {
                retry_after: self.retry_after,
            }
        }
    }

    /// Remove every bucket that has refilled to full capacity. Returns how many were removed.
    pub fn evict_full(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            bucket.refill(now, self.rate, self.capacity);
            let keep = bucket.tokens < self.capacity;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.buckets.contains_key(identity)
    }

    /// Current token count for `identity` without refilling, if tracked.
    #[cfg(test)]
    pub(crate) fn tokens(&self, identity: &str) -> Option<f64> {
        self.buckets.get(identity).map(|b| b.tokens)
    }
}
