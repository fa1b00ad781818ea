use super::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::advance;

fn config(enabled: bool, rps: f64, burst: u32, eviction_interval: Duration) -> RateLimitConfig {
    RateLimitConfig {
        enabled,
        rps,
        burst,
        eviction_interval,
    }
}

fn assert_close(actual: Duration, expected_secs: f64) {
    let diff = (actual.as_secs_f64() - expected_secs).abs();
    assert!(diff < 1e-6, "expected ~{}s, got {:?}", expected_secs, actual);
}

// ── BucketRegistry ───────────────────────────────────────────────────────────

#[test]
fn test_burst_then_deny() {
    let registry = BucketRegistry::new(5.0, 3);

    // Bucket starts full
    for _ in 0..3 {
        assert_eq!(registry.allow("10.0.0.1"), Admission::Allowed);
    }

    let denied = registry.allow("10.0.0.1");
    assert!(!denied.is_allowed());
    assert!(denied.retry_after() > Duration::ZERO);
}

#[test]
fn test_retry_after_is_one_token_interval() {
    let registry = BucketRegistry::new(4.0, 1);
    assert!(registry.allow("c").is_allowed());

    let denied = registry.allow("c");
    assert_close(denied.retry_after(), 0.25);
    assert_eq!(Admission::Allowed.retry_after(), Duration::ZERO);
}

#[test]
fn test_denial_does_not_consume() {
    let registry = BucketRegistry::new(0.001, 1);
    assert!(registry.allow("c").is_allowed());

    for _ in 0..5 {
        assert!(!registry.allow("c").is_allowed());
    }

    let tokens = registry.tokens("c").unwrap();
    assert!(tokens >= 0.0 && tokens < 1.0, "tokens went to {}", tokens);
}

#[test]
fn test_separate_buckets_per_client() {
    let registry = BucketRegistry::new(0.001, 1);

    // Drain client a
    assert!(registry.allow("a").is_allowed());
    assert!(!registry.allow("a").is_allowed());

    // Client b is unaffected
    assert!(registry.allow("b").is_allowed());
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_empty_identity_is_a_bucket() {
    let registry = BucketRegistry::new(0.001, 1);
    assert!(registry.allow("").is_allowed());
    assert!(!registry.allow("").is_allowed());
    assert!(registry.contains(""));
}

#[tokio::test(start_paused = true)]
async fn test_one_token_after_retry_interval() {
    let registry = BucketRegistry::new(4.0, 2);
    assert!(registry.allow("c").is_allowed());
    assert!(registry.allow("c").is_allowed());

    let denied = registry.allow("c");
    assert!(!denied.is_allowed());

    advance(denied.retry_after()).await;

    // Exactly one token refilled
    assert!(registry.allow("c").is_allowed());
    assert!(!registry.allow("c").is_allowed());
}

#[tokio::test(start_paused = true)]
async fn test_retry_interval_with_inexact_rate() {
    // 1/3 s and 1/7 s are not whole nanoseconds
    for rate in [3.0, 7.0] {
        let registry = BucketRegistry::new(rate, 1);
        assert!(registry.allow("c").is_allowed());

        let denied = registry.allow("c");
        assert!(!denied.is_allowed());

        advance(denied.retry_after()).await;

        assert!(registry.allow("c").is_allowed(), "rate {} denied after retry_after", rate);
        assert!(!registry.allow("c").is_allowed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_refill_saturates_at_burst() {
    let registry = BucketRegistry::new(100.0, 3);
    for _ in 0..3 {
        assert!(registry.allow("c").is_allowed());
    }

    // Far longer than needed to refill
    advance(Duration::from_secs(3600)).await;

    for _ in 0..3 {
        assert!(registry.allow("c").is_allowed());
    }
    assert!(!registry.allow("c").is_allowed());
    assert!(registry.tokens("c").unwrap() <= 3.0);
}

#[tokio::test(start_paused = true)]
async fn test_ten_per_second_scenario() {
    let registry = BucketRegistry::new(10.0, 10);

    for _ in 0..10 {
        assert!(registry.allow("A").is_allowed());
    }

    let denied = registry.allow("A");
    assert!(!denied.is_allowed());
    assert_close(denied.retry_after(), 0.1);

    advance(Duration::from_millis(200)).await;

    assert!(registry.allow("A").is_allowed());
    assert!(registry.allow("A").is_allowed());
    assert!(!registry.allow("A").is_allowed());
}

#[test]
fn test_concurrent_callers_share_burst_exactly() {
    const BURST: u32 = 50;
    const CALLERS: usize = 400;

    // Negligible refill during the test
    let registry = BucketRegistry::new(0.001, BURST);
    let allowed = AtomicUsize::new(0);
    let denied = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..CALLERS / 8 {
                    if registry.allow("shared").is_allowed() {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        denied.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::Relaxed), BURST as usize);
    assert_eq!(denied.load(Ordering::Relaxed), CALLERS - BURST as usize);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_sweeps_interleaved_with_callers_keep_burst_exact() {
    const BURST: u32 = 50;
    const CALLERS: usize = 400;

    let registry = BucketRegistry::new(0.001, BURST);
    let allowed = AtomicUsize::new(0);
    let sweeps = AtomicUsize::new(0);
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                registry.evict_full();
                sweeps.fetch_add(1, Ordering::Relaxed);
            }
        });

        let callers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    for _ in 0..CALLERS / 8 {
                        if registry.allow("shared").is_allowed() {
                            allowed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    // A drained bucket is never swept, so no caller got a fresh one
    assert_eq!(allowed.load(Ordering::Relaxed), BURST as usize);
    assert!(sweeps.load(Ordering::Relaxed) > 0);
    assert!(registry.contains("shared"));
}

#[tokio::test(start_paused = true)]
async fn test_evict_full_keeps_partial_buckets() {
    let registry = BucketRegistry::new(1.0, 5);

    // idle: one token used, refills within a second
    assert!(registry.allow("idle").is_allowed());
    // busy: fully drained
    for _ in 0..5 {
        assert!(registry.allow("busy").is_allowed());
    }

    advance(Duration::from_secs(1)).await;

    assert_eq!(registry.evict_full(), 1);
    assert!(!registry.contains("idle"));
    assert!(registry.contains("busy"));

    // Evicted client comes back at full capacity
    for _ in 0..5 {
        assert!(registry.allow("idle").is_allowed());
    }
    assert!(!registry.allow("idle").is_allowed());
}

#[test]
fn test_recently_used_bucket_survives_sweep() {
    let registry = BucketRegistry::new(0.001, 2);
    assert!(registry.allow("c").is_allowed());

    assert_eq!(registry.evict_full(), 0);
    assert!(registry.contains("c"));
}

#[test]
fn test_sweep_on_empty_registry() {
    let registry = BucketRegistry::new(1.0, 1);
    assert_eq!(registry.evict_full(), 0);
    assert!(registry.is_empty());
}

// ── RateLimiter ──────────────────────────────────────────────────────────────

#[test]
fn test_disabled_allows_everything_without_buckets() {
    // No runtime needed: a disabled limiter never spawns the sweeper
    let limiter = RateLimiter::new(&config(false, 1.0, 1, Duration::from_secs(60)), Span::none());

    for i in 0..10_000 {
        let identity = format!("10.0.{}.{}", i / 256, i % 256);
        let decision = limiter.allow(&identity);
        assert_eq!(decision, Admission::Allowed);
        assert_eq!(decision.retry_after(), Duration::ZERO);
    }
    for _ in 0..100 {
        assert!(limiter.allow("same").is_allowed());
    }

    assert_eq!(limiter.client_count(), 0);
    assert_eq!(limiter.evict_idle(), 0);
    assert!(!limiter.is_enabled());
}

#[tokio::test]
async fn test_enabled_limiter_denies_after_burst() {
    let limiter = RateLimiter::new(&config(true, 0.5, 2, Duration::from_secs(60)), Span::none());

    assert!(limiter.allow("a").is_allowed());
    assert!(limiter.allow("a").is_allowed());

    let denied = limiter.allow("a");
    assert!(!denied.is_allowed());
    assert_close(denied.retry_after(), 2.0);
    assert_eq!(limiter.client_count(), 1);
    assert_eq!(limiter.burst(), 2);
    assert_eq!(limiter.rate(), 0.5);

    limiter.shutdown();
    limiter.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_refilled_buckets() {
    let limiter = RateLimiter::new(&config(true, 1.0, 2, Duration::from_secs(10)), Span::none());

    assert!(limiter.allow("a").is_allowed());
    assert_eq!(limiter.client_count(), 1);

    // Paused clock auto-advances through the first sweep at t=10s
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(limiter.client_count(), 0);

    limiter.shutdown();
    limiter.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_keeps_drained_buckets() {
    // 0.05 tokens/sec: a drained bucket holds 0.5 tokens at the first sweep
    let limiter = RateLimiter::new(&config(true, 0.05, 1, Duration::from_secs(10)), Span::none());

    assert!(limiter.allow("b").is_allowed());
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(limiter.client_count(), 1);

    limiter.shutdown();
    limiter.join().await;
}

#[tokio::test]
async fn test_shutdown_stops_sweeper() {
    let limiter = RateLimiter::new(&config(true, 10.0, 10, Duration::from_millis(5)), Span::none());
    assert!(limiter.allow("a").is_allowed());

    limiter.shutdown();
    // Idempotent
    limiter.shutdown();

    let joined = tokio::time::timeout(Duration::from_secs(5), limiter.join()).await;
    assert!(joined.is_ok(), "eviction task did not exit after shutdown");

    // Second join has nothing left to wait for
    let joined = tokio::time::timeout(Duration::from_secs(1), limiter.join()).await;
    assert!(joined.is_ok());

    // Admission keeps working without the sweeper
    assert!(limiter.allow("a").is_allowed());
}

#[tokio::test]
async fn test_drop_stops_sweeper() {
    let limiter = RateLimiter::new(&config(true, 1.0, 1, Duration::from_secs(3600)), Span::none());
    let registry = Arc::downgrade(&limiter.registry);

    drop(limiter);

    // The sweeper holds the last strong reference until it exits
    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while registry.upgrade().is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(released.is_ok(), "eviction task outlived the limiter");
}

#[tokio::test]
async fn test_disabled_join_returns_immediately() {
    let limiter = RateLimiter::new(&config(false, 10.0, 10, Duration::from_secs(60)), Span::none());
    let joined = tokio::time::timeout(Duration::from_secs(1), limiter.join()).await;
    assert!(joined.is_ok());
}

#[tokio::test]
async fn test_eviction_loop_exits_when_sender_dropped() {
    let registry = Arc::new(BucketRegistry::new(1.0, 1));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(sweeper::run_eviction_loop(
        Arc::clone(&registry),
        Duration::from_secs(3600),
        rx,
    ));

    drop(tx);

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn test_eviction_loop_exits_if_already_shut_down() {
    let registry = Arc::new(BucketRegistry::new(1.0, 1));
    let (tx, rx) = watch::channel(true);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        sweeper::run_eviction_loop(registry, Duration::from_secs(3600), rx),
    )
    .await;
    assert!(result.is_ok());
    drop(tx);
}
