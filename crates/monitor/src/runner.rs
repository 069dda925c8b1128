//! Periodic trigger for the poll scheduler.
//!
//! The runner awaits each tick before waiting for the next interval, so at
//! most one tick is ever in flight. Ticks that fall behind are skipped
//! rather than queued.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::poller::PollScheduler;
use crate::session::ManagerTransport;

/// Drives [`PollScheduler::tick`] on a fixed interval until cancelled.
#[derive(Debug, Clone)]
pub struct PollRunner {
    interval: Duration,
    shutdown: CancellationToken,
}

impl PollRunner {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self { interval, shutdown }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs ticks until the shutdown token is cancelled. The first tick
    /// starts immediately. A tick in progress at cancellation is
    /// abandoned.
    ///
    /// Returns the number of completed ticks.
    pub async fn run<T: ManagerTransport>(&self, scheduler: &mut PollScheduler<T>) -> u64 {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut completed = 0;

        info!(interval_secs = self.interval.as_secs(), "Polling started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Abandoning tick in progress");
                    break;
                }
                report = scheduler.tick() => {
                    completed += 1;
                    debug!(tick = report.tick, failed = report.failed, "Tick finished");
                }
            }
        }

        info!(ticks = completed, "Polling stopped");
        completed
    }
}
