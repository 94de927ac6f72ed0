use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Repeating tick that drives the progress indicator of the displayed image.
///
/// Idle until the first image is displayed; `tick` never resolves while idle.
pub(super) struct ProgressTicker {
    period: Duration,
    interval: Option<Interval>,
}

impl ProgressTicker {
    pub(super) fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Restart counting for an image that entered the display at `now`.
    pub(super) fn restart(&mut self, now: Instant) {
        let mut interval = interval_at(now + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.interval = Some(interval);
    }

    pub(super) fn halt(&mut self) {
        self.interval = None;
    }

    pub(super) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
