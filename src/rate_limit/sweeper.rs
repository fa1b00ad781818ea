use super::BucketRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Periodically evict fully refilled buckets until shutdown is signalled.
///
/// The first sweep runs one `period` after start. Exits when the shutdown flag
/// flips to true or the sender side is dropped.
pub(super) async fn run_eviction_loop(
    registry: Arc<BucketRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // interval_at panics on a zero period
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);

    // A stalled runtime should not trigger a burst of back-to-back sweeps
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let evicted = registry.evict_full();
                info!(
                    evicted,
                    clients = registry.len(),
                    "Rate limiter client map cleaned up"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Rate limiter eviction task stopped");
}
