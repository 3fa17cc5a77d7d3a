//! Background expiry sweeping.
//!
//! Runs [`ExpirySweeper::sweep_once`] on a fixed interval for the lifetime
//! of the process. Sweep errors are logged and the loop carries on.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use xfer_core::ExpirySweeper;

/// Spawn the sweep loop.
pub fn spawn(sweeper: ExpirySweeper, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "expiry sweeper started");
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup is not
        // slowed by a sweep.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep_once(Utc::now()).await {
                tracing::error!(error = %e, "expiry sweep failed");
            }
        }
    })
}
