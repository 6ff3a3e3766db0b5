//! Periodic re-assertion loop
//!
//! The consuming side caches positions and the platform may invalidate that
//! cache at any time, so the target is pushed again on a fixed cadence even
//! when it has not changed. Each tick hands the sink call to the blocking
//! pool and moves on; a slow sink never delays the next tick.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SpoofController;

/// Arm the loop for session `generation` until `token` is cancelled
pub(super) fn spawn(
    controller: SpoofController,
    generation: u64,
    token: CancellationToken,
    interval: Duration,
) {
    let runtime = controller.runtime().clone();

    runtime.spawn(async move {
        log::debug!(
            "Re-assertion loop for session {} armed ({} ms)",
            generation,
            interval.as_millis()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; start() already asserted
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = ticker.tick() => {
                    let controller = controller.clone();
                    let token = token.clone();
                    tokio::task::spawn_blocking(move || {
                        if !token.is_cancelled() {
                            controller.push_current(generation);
                        }
                    });
                }
            }
        }

        log::debug!("Re-assertion loop for session {} disarmed", generation);
    });
}
