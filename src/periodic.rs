use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

/// One unit of periodic work.
///
/// `run` executes on the blocking pool, so it may call into the OS synchronously.
pub trait Job: Send + Sync + 'static {
    fn run(&self);
}

/// A loop that calls a [`Job`] every `period` until stopped.
///
/// Only one tick runs at a time. The stop signal and period changes are observed between ticks,
/// so a tick in progress always completes.
pub struct PeriodicTask {
    name: &'static str,
    period: watch::Sender<Duration>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns the loop on the current tokio runtime. The first tick fires one `period` from now.
    pub fn start<J: Job>(name: &'static str, period: Duration, job: Arc<J>) -> Self {
        let (period_tx, period_rx) = watch::channel(period);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_loop(name, job, period_rx, stop_rx));
        debug!(task = name, ?period, "periodic task started");

        Self {
            name,
            period: period_tx,
            stop: stop_tx,
            handle,
        }
    }

    /// Re-times the loop. If the period actually changes, the wait restarts from now.
    pub fn reset_period(&self, period: Duration) {
        let changed = self.period.send_if_modified(|current| {
            if *current == period {
                return false;
            }
            *current = period;
            true
        });
        if changed {
            debug!(task = self.name, ?period, "periodic task re-timed");
        }
    }

    #[cfg(test)]
    fn period(&self) -> Duration {
        *self.period.borrow()
    }

    /// Signals the loop and waits for it to finish its current tick.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "periodic task ended abnormally");
        }
        debug!(task = self.name, "periodic task stopped");
    }
}

async fn run_loop<J: Job>(
    name: &'static str,
    job: Arc<J>,
    mut period: watch::Receiver<Duration>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow_and_update() {
            break;
        }
        let wait = *period.borrow_and_update();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = period.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = stop.changed() => break,
        }

        let job = Arc::clone(&job);
        if let Err(e) = tokio::task::spawn_blocking(move || job.run()).await {
            warn!(task = name, error = %e, "tick panicked");
        }
    }
}
