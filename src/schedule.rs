use chrono::{DateTime, Datelike as _, Local, NaiveDateTime, Timelike as _};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    block::ProductiveTime,
    periodic::{Job, PeriodicTask},
    snapshot::{ConfigSnapshot, ConfigUpdater, SharedConfig, TimeWindow},
};

/// How often the schedule is re-evaluated. Window boundaries are minute-granular, so this
/// stays independent of the much denser process scan.
pub const SCHEDULE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Whether `now` falls in productive time under `snapshot`.
pub fn evaluate(snapshot: &ConfigSnapshot, now: NaiveDateTime) -> bool {
    matching_window(snapshot, now).is_some()
}

/// The first window covering `now`, after the enabled flag and the weekday have been checked.
///
/// Both window ends are inclusive. Windows that fail to parse are skipped.
pub fn matching_window(snapshot: &ConfigSnapshot, now: NaiveDateTime) -> Option<&TimeWindow> {
    if !snapshot.enabled {
        return None;
    }

    if !snapshot.active_days.contains(&now.weekday()) {
        return None;
    }

    let now_minutes = now.hour() * 60 + now.minute();
    snapshot.time_windows.iter().find(|window| {
        window
            .minutes()
            .is_some_and(|(start, end)| start <= now_minutes && now_minutes <= end)
    })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Status {
    Active { window: TimeWindow },
    Idle,
}

impl Status {
    pub fn at(snapshot: &ConfigSnapshot, now: NaiveDateTime) -> Self {
        match matching_window(snapshot, now) {
            Some(window) => Self::Active {
                window: window.clone(),
            },
            None => Self::Idle,
        }
    }

    /// Returns `true` if the status is [`Active`].
    ///
    /// [`Active`]: Status::Active
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub is_productive: bool,
    pub last_transition_at: Option<DateTime<Local>>,
}

pub type StatusObserver = Arc<dyn Fn(bool) + Send + Sync>;

/// Keeps the productive-time flag current on a fixed 30 second cadence.
pub struct ScheduleEvaluator {
    config: SharedConfig,
    state: RwLock<ScheduleState>,
    /// Numbers transitions in the order they were applied to `state`.
    issued: AtomicU64,
    /// Last transition handed to observers.
    delivered: Mutex<u64>,
    observers: Mutex<Vec<StatusObserver>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl ScheduleEvaluator {
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            config: SharedConfig::new(snapshot),
            state: RwLock::new(ScheduleState::default()),
            issued: AtomicU64::new(0),
            delivered: Mutex::new(0),
            observers: Mutex::new(Vec::new()),
            task: Mutex::new(None),
        }
    }

    /// Registers `observer` to be called with the new value on every transition.
    ///
    /// Observers run one at a time in transition order and must not call back into
    /// [`ScheduleEvaluator::refresh`].
    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.observers.lock().push(Arc::new(observer));
    }

    /// Computes the initial state, then starts the periodic re-evaluation.
    pub fn start(self: &Arc<Self>) {
        if self.task.lock().is_some() {
            warn!("schedule evaluator already running");
            return;
        }

        let productive = self.refresh();
        let now = Local::now().format("%H:%M");
        if productive {
            info!(current = %now, "starting in productive time, blocking active");
        } else {
            info!(current = %now, "starting outside productive time, blocking idle");
        }

        *self.task.lock() = Some(PeriodicTask::start(
            "schedule",
            SCHEDULE_CHECK_INTERVAL,
            Arc::clone(self),
        ));
        info!(interval = ?SCHEDULE_CHECK_INTERVAL, "schedule evaluator started");
    }

    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("schedule evaluator stopped");
        }
    }

    /// Re-evaluates right away, outside the regular cadence.
    pub fn refresh(&self) -> bool {
        self.refresh_at(Local::now())
    }

    fn refresh_at(&self, now: DateTime<Local>) -> bool {
        let (productive, transition, enabled) = {
            let mut state = self.state.write();
            let snapshot = self.config.load();
            let productive = evaluate(&snapshot, now.naive_local());
            let mut transition = None;
            if state.is_productive != productive {
                state.is_productive = productive;
                state.last_transition_at = Some(now);
                transition = Some(self.issued.fetch_add(1, Ordering::SeqCst) + 1);
            }
            (productive, transition, snapshot.enabled)
        };

        let at = now.format("%H:%M");
        debug!(%at, enabled, productive, "productive time check");

        if let Some(seq) = transition {
            if productive {
                info!(%at, "entered productive time, blocking now active");
            } else {
                info!(%at, "left productive time, blocking now idle");
            }
            self.notify(seq, productive);
        }

        productive
    }

    /// Hands transition `seq` to the observers unless a later one already went out.
    fn notify(&self, seq: u64, productive: bool) {
        let mut delivered = self.delivered.lock();
        if *delivered >= seq {
            debug!(seq, productive, "dropping superseded status change");
            return;
        }
        *delivered = seq;

        let observers = self.observers.lock().clone();
        for observer in observers {
            observer(productive);
        }
    }

    pub fn state(&self) -> ScheduleState {
        *self.state.read()
    }
}

impl ProductiveTime for ScheduleEvaluator {
    fn is_productive(&self) -> bool {
        self.state.read().is_productive
    }
}

impl ConfigUpdater for ScheduleEvaluator {
    fn update_config(&self, snapshot: Arc<ConfigSnapshot>) {
        self.config.replace(snapshot);
        info!("schedule config updated");
    }
}

impl Job for ScheduleEvaluator {
    fn run(&self) {
        self.refresh();
    }
}
