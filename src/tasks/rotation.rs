//! The fetch → preload → display → wait loop.
//!
//! Rules:
//! - A cycle asks the [`ImageSource`] for a record, preloads it and only then
//!   replaces the displayed image. The cycle's minimum wait runs alongside the
//!   fetch and preload, so the image changes after whichever finishes last.
//! - After a successful display the next cycle starts once the pacing delay has
//!   passed, with the full rotation interval as its minimum wait.
//! - Any failure becomes a transient `Error` state and the whole cycle is
//!   retried one rotation interval later. Rotation never stops on its own.
//! - `stop` bumps the controller epoch; results carrying an older epoch are
//!   dropped without touching the published snapshot.

mod progress;
mod state;

pub use state::{RotationSnapshot, RotationState};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RotationError;
use crate::events::PreparedImage;
use crate::tasks::preload::Preloader;
use crate::tasks::source::ImageSource;
use progress::ProgressTicker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationTiming {
    /// Minimum time an image stays up; also the retry delay after a failure.
    pub interval: Duration,
    /// Gap between a transition and the next fetch.
    pub pacing_delay: Duration,
    /// Discrete steps of the progress indicator per interval.
    pub progress_steps: u32,
}

impl RotationTiming {
    pub fn tick_period(&self) -> Duration {
        (self.interval / self.progress_steps.max(1)).max(Duration::from_nanos(1))
    }
}

impl Default for RotationTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            pacing_delay: Duration::from_millis(500),
            progress_steps: 100,
        }
    }
}

struct Shared<S, P> {
    source: S,
    preloader: P,
    timing: RotationTiming,
    epoch: AtomicU64,
    snapshot_tx: watch::Sender<RotationSnapshot>,
}

impl<S: ImageSource, P: Preloader> Shared<S, P> {
    fn publish(&self, epoch: u64, apply: impl FnOnce(&mut RotationSnapshot) -> bool) -> bool {
        self.snapshot_tx.send_if_modified(|snap| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            apply(snap)
        })
    }

    async fn load_next(&self, deadline: Instant) -> Result<PreparedImage, RotationError> {
        let record = self.source.next_image().await?;
        debug!(id = %record.id, "preloading");
        let prepared = self.preloader.preload(record).await?;
        sleep_until(deadline).await;
        Ok(prepared)
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RotationController<S, P> {
    shared: Arc<Shared<S, P>>,
    running: Mutex<Option<Running>>,
}

impl<S, P> RotationController<S, P>
where
    S: ImageSource + 'static,
    P: Preloader + 'static,
{
    pub fn new(source: S, preloader: P, timing: RotationTiming) -> Self {
        let (snapshot_tx, _) = watch::channel(RotationSnapshot::new(timing.progress_steps));
        Self {
            shared: Arc::new(Shared {
                source,
                preloader,
                timing,
                epoch: AtomicU64::new(0),
                snapshot_tx,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RotationSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> RotationSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Begin rotating. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            debug!("rotation already running");
            return;
        }
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.shared.clone(), epoch, cancel.clone()));
        *running = Some(Running { cancel, handle });
        info!(
            interval = %humantime::format_duration(self.shared.timing.interval),
            epoch,
            "rotation started"
        );
    }

    /// Cancel pending timers and preloads and return to `Idle`.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(Running { cancel, .. }) = running.take() {
            cancel.cancel();
            info!("rotation stopped");
        }
        self.shared
            .snapshot_tx
            .send_if_modified(RotationSnapshot::reset);
    }
}

impl<S, P> Drop for RotationController<S, P> {
    fn drop(&mut self) {
        if let Some(Running { cancel, .. }) = self.running.get_mut().take() {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
        }
    }
}

async fn run<S: ImageSource, P: Preloader>(
    shared: Arc<Shared<S, P>>,
    epoch: u64,
    cancel: CancellationToken,
) {
    let timing = shared.timing;
    let mut progress = ProgressTicker::new(timing.tick_period());
    let mut min_wait = Duration::ZERO;

    loop {
        shared.publish(epoch, RotationSnapshot::begin_loading);
        let deadline = Instant::now() + min_wait;
        let cycle = shared.load_next(deadline);
        let Some(outcome) = drive(&shared, epoch, &cancel, &mut progress, cycle).await else {
            break;
        };

        let pause = match outcome {
            Ok(prepared) => {
                let now = Instant::now();
                debug!(
                    id = %prepared.record.id,
                    width = prepared.width,
                    height = prepared.height,
                    "displaying"
                );
                let image = Arc::new(prepared);
                shared.publish(epoch, |snap| snap.display(image, now.into_std()));
                progress.restart(now);
                min_wait = timing.interval;
                timing.pacing_delay
            }
            Err(err) => {
                warn!(
                    error = %err,
                    retry_in = %humantime::format_duration(timing.interval),
                    "rotation cycle failed"
                );
                shared.publish(epoch, |snap| snap.fail(err.to_string()));
                min_wait = Duration::ZERO;
                timing.interval
            }
        };

        if drive(&shared, epoch, &cancel, &mut progress, sleep(pause))
            .await
            .is_none()
        {
            break;
        }
    }
    debug!(epoch, "rotation loop exited");
}

/// Await `fut` while keeping the progress indicator ticking.
///
/// Returns `None` when the run is cancelled first.
async fn drive<S, P, F>(
    shared: &Shared<S, P>,
    epoch: u64,
    cancel: &CancellationToken,
    progress: &mut ProgressTicker,
    fut: F,
) -> Option<F::Output>
where
    S: ImageSource,
    P: Preloader,
    F: Future,
{
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            out = &mut fut => return Some(out),
            _ = progress.tick() => {
                if !shared.publish(epoch, RotationSnapshot::tick) {
                    progress.halt();
                }
            }
        }
    }
}
