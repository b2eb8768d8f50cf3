//! Background invalidation scheduler.
//!
//! The scheduler owns one timer task per configured period. A task only ever raises a
//! [`StalenessFlag`]; it never touches cached payloads, so it cannot race with an in-flight
//! recomputation. Consumers observe the flag lazily on their next access.
//!
//! # Timer Tasks
//!
//! ```text
//!                     ┌───────────────── broadcast shutdown ─────────────────┐
//!                     ▼                                                      │
//! start(m, c) ─► [model task]   every m: model_flag.raise()                  │
//!             └► [content task] every c: content_flag.raise()          stop()
//!                                         sweep abandoned in-flight cells
//! ```
//!
//! A zero period spawns no task. Zero means "recompute on every access", which the consumers
//! implement themselves, so there is nothing for a timer to do.

mod staleness;

pub use staleness::StalenessFlag;

use crate::metrics::{CacheEvent, EventSink};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Upper bound on how long `stop()` waits for each timer task before aborting it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Cached artifacts watched by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Model,
    Content,
}

impl Artifact {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Removes in-flight computation cells that no caller holds any more.
///
/// Implemented by the content cache; invoked from the content timer.
pub trait InflightSweeper: Send + Sync {
    /// Removes abandoned cells older than `older_than`, returning how many were removed.
    fn sweep_abandoned(&self, older_than: Duration) -> usize;
}

struct RunningTasks {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(Artifact, JoinHandle<()>)>,
}

/// Periodically raises the model and content staleness flags.
///
/// `start` and `stop` may be called any number of times in any order: starting a running
/// scheduler and stopping a stopped one are no-ops, and a stopped scheduler can be started
/// again with different periods.
pub struct InvalidationScheduler {
    model_flag: Arc<StalenessFlag>,
    content_flag: Arc<StalenessFlag>,
    events: Arc<dyn EventSink>,
    sweeper: Option<Arc<dyn InflightSweeper>>,
    running: Mutex<Option<RunningTasks>>,
}

impl InvalidationScheduler {
    #[must_use]
    pub fn new(
        model_flag: Arc<StalenessFlag>,
        content_flag: Arc<StalenessFlag>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { model_flag, content_flag, events, sweeper: None, running: Mutex::new(None) }
    }

    /// Attaches the sweeper run on every content tick.
    #[must_use]
    pub fn with_sweeper(mut self, sweeper: Arc<dyn InflightSweeper>) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Spawns the timer tasks. Must be called within a tokio runtime.
    ///
    /// Returns `false` without spawning anything if the scheduler is already running.
    pub fn start(&self, model_period: Duration, content_period: Duration) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("invalidation scheduler already running, ignoring start");
            return false;
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::with_capacity(2);

        if !model_period.is_zero() {
            let handle = tokio::spawn(run_invalidation_timer(
                Artifact::Model,
                model_period,
                Arc::clone(&self.model_flag),
                Arc::clone(&self.events),
                None,
                shutdown_tx.subscribe(),
            ));
            handles.push((Artifact::Model, handle));
        }

        if !content_period.is_zero() {
            let handle = tokio::spawn(run_invalidation_timer(
                Artifact::Content,
                content_period,
                Arc::clone(&self.content_flag),
                Arc::clone(&self.events),
                self.sweeper.clone(),
                shutdown_tx.subscribe(),
            ));
            handles.push((Artifact::Content, handle));
        }

        info!(
            model_period_secs = model_period.as_secs_f64(),
            content_period_secs = content_period.as_secs_f64(),
            timers = handles.len(),
            "invalidation scheduler started"
        );

        *running = Some(RunningTasks { shutdown_tx, handles });
        true
    }

    /// Signals every timer task to stop and waits for them, bounded by [`STOP_TIMEOUT`] per
    /// task. Tasks that do not finish in time are aborted.
    pub async fn stop(&self) {
        // Never hold the mutex across an await.
        let Some(tasks) = self.running.lock().take() else {
            debug!("invalidation scheduler not running, ignoring stop");
            return;
        };

        if tasks.shutdown_tx.send(()).is_err() {
            debug!("no timer tasks listening for shutdown");
        }

        for (artifact, mut handle) in tasks.handles {
            match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!(artifact = artifact.as_str(), "timer task stopped"),
                Ok(Err(e)) => warn!(artifact = artifact.as_str(), error = %e, "timer task failed"),
                Err(_) => {
                    warn!(artifact = artifact.as_str(), "timer task did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        info!("invalidation scheduler stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    #[must_use]
    pub fn model_flag(&self) -> &Arc<StalenessFlag> {
        &self.model_flag
    }

    #[must_use]
    pub fn content_flag(&self) -> &Arc<StalenessFlag> {
        &self.content_flag
    }
}

impl fmt::Debug for InvalidationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationScheduler")
            .field("running", &self.is_running())
            .field("model_flag", &self.model_flag)
            .field("content_flag", &self.content_flag)
            .finish_non_exhaustive()
    }
}

/// Timer loop for one artifact. Runs until the shutdown signal is received.
async fn run_invalidation_timer(
    artifact: Artifact,
    period: Duration,
    flag: Arc<StalenessFlag>,
    events: Arc<dyn EventSink>,
    sweeper: Option<Arc<dyn InflightSweeper>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // First tick one full period after start; the initial state is fresh by definition.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                debug!(artifact = artifact.as_str(), "invalidation timer shutting down");
                break;
            }

            _ = interval.tick() => {
                if flag.raise() {
                    events.record(&CacheEvent::Invalidated { artifact });
                    debug!(artifact = artifact.as_str(), "staleness flag raised");
                }

                if let Some(sweeper) = &sweeper {
                    let removed = sweeper.sweep_abandoned(period);
                    if removed > 0 {
                        warn!(removed, "removed abandoned in-flight computations");
                    }
                }
            }
        }
    }
}
