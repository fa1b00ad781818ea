// Per-client admission control
//
// One token bucket per client identity, refilled continuously at `rps` tokens/sec
// up to `burst`. Buckets are created lazily on first request and evicted by a
// background sweep once they have refilled to full capacity.

mod bucket;
mod sweeper;

#[cfg(test)]
mod tests;

pub use bucket::{Admission, BucketRegistry};

use crate::config::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Span};

/// Token-bucket rate limiter keyed by client identity.
///
/// When disabled every request is admitted and the bucket registry is never touched.
/// When enabled, constructing the limiter spawns the eviction task on the current
/// Tokio runtime; it runs until [`shutdown`](RateLimiter::shutdown) is called or
/// the limiter is dropped.
pub struct RateLimiter {
    enabled: bool,
    registry: Arc<BucketRegistry>,
    eviction_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl RateLimiter {
    /// Build a limiter from config.
    ///
    /// `span` is the logging context for the limiter: the sweeper task is
    /// instrumented with it and every limiter log line is emitted inside it.
    ///
    /// # Panics
    /// Panics if `config.enabled` is true and this is called outside a Tokio runtime.
    pub fn new(config: &RateLimitConfig, span: Span) -> Self {
        let registry = Arc::new(BucketRegistry::new(config.rps, config.burst));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = if config.enabled {
            let handle = tokio::spawn(
                sweeper::run_eviction_loop(
                    Arc::clone(&registry),
                    config.eviction_interval,
                    shutdown_rx,
                )
                .instrument(span.clone()),
            );
            Some(handle)
        } else {
            None
        };

        span.in_scope(|| {
            info!(
                enabled = config.enabled,
                rps = config.rps,
                burst = config.burst,
                eviction_interval_ms = config.eviction_interval.as_millis() as u64,
                "Rate limiter initialized"
            );
        });

        Self {
            enabled: config.enabled,
            registry,
            eviction_interval: config.eviction_interval,
            shutdown_tx,
            sweeper: Mutex::new(sweeper),
            span,
        }
    }

    /// Decide whether a request from `identity` may proceed.
    ///
    /// The identity is an opaque key (the empty string included). Never fails.
    pub fn allow(&self, identity: &str) -> Admission {
        if !self.enabled {
            return Admission::Allowed;
        }
        self.registry.allow(identity)
    }

    /// Run one eviction sweep now. Returns the number of buckets removed.
    pub fn evict_idle(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.registry.evict_full()
    }

    /// Signal the eviction task to stop. Safe to call more than once.
    pub fn shutdown(&self) {
        // send_replace never fails, even once the receiver is gone
        let was_shut_down = self.shutdown_tx.send_replace(true);
        if !was_shut_down && self.enabled {
            self.span.in_scope(|| info!("Rate limiter shutdown requested"));
        }
    }

    /// Wait for the eviction task to exit.
    ///
    /// Returns immediately when the limiter is disabled or was already joined.
    /// Does not request shutdown by itself.
    pub async fn join(&self) {
        let handle = self.sweeper.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                self.span
                    .in_scope(|| warn!(error = %e, "Rate limiter eviction task ended abnormally"));
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sustained refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.registry.rate()
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.registry.burst()
    }

    pub fn eviction_interval(&self) -> Duration {
        self.eviction_interval
    }

    /// Number of client buckets currently tracked.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
