use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use nook_booking::PendingReaper;

use crate::state::LiveAvailability;

/// A guest's debounced checker is dropped after this long without a request.
pub const LIVE_CHECKER_IDLE: Duration = Duration::from_secs(600);

/// Periodically cancels PENDING bookings whose checkout was abandoned and
/// drops idle per-guest availability checkers.
pub async fn start_reaper_worker(reaper: Arc<PendingReaper>, live: LiveAvailability, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Pending reaper started, sweeping every {:?} (ttl {}s)",
        every,
        reaper.ttl().num_seconds()
    );

    loop {
        ticker.tick().await;
        match reaper.sweep().await {
            Ok(0) => {}
            Ok(n) => info!("Reaped {} stale pending bookings", n),
            Err(e) => error!("Pending sweep failed: {}", e),
        }

        let evicted = live.evict_idle(LIVE_CHECKER_IDLE);
        if evicted > 0 {
            debug!("Evicted {} idle availability checkers", evicted);
        }
    }
}
