use std::sync::Arc;
use tracing::info;

use crate::{
    block::{ProcessEnforcer, ProductiveTime},
    gate::NotificationGate,
    process::ProcessTable,
    schedule::ScheduleEvaluator,
    snapshot::{ConfigSnapshot, ConfigUpdater},
};

/// Wires the schedule, the enforcer and its notification gate together.
pub struct Engine {
    schedule: Arc<ScheduleEvaluator>,
    enforcer: Arc<ProcessEnforcer>,
}

impl Engine {
    pub fn new(
        snapshot: Arc<ConfigSnapshot>,
        processes: Arc<dyn ProcessTable>,
        gate: NotificationGate,
    ) -> Self {
        let schedule = Arc::new(ScheduleEvaluator::new(Arc::clone(&snapshot)));
        let enforcer = Arc::new(ProcessEnforcer::new(
            snapshot,
            Arc::clone(&schedule) as Arc<dyn ProductiveTime>,
            processes,
            gate,
        ));

        Self { schedule, enforcer }
    }

    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.schedule.on_status_change(observer);
    }

    /// Must be called from inside a tokio runtime.
    pub fn start(&self) {
        self.schedule.start();
        self.enforcer.start();
    }

    pub fn is_productive(&self) -> bool {
        self.schedule.is_productive()
    }

    pub async fn shutdown(&self) {
        self.enforcer.stop().await;
        self.schedule.stop().await;
        info!("engine shut down");
    }
}

impl ConfigUpdater for Engine {
    /// Hands the snapshot to every component, then re-evaluates the schedule so a disabled or
    /// re-scheduled config takes effect before the next scan.
    fn update_config(&self, snapshot: Arc<ConfigSnapshot>) {
        self.schedule.update_config(Arc::clone(&snapshot));
        self.enforcer.update_config(snapshot);
        self.schedule.refresh();
    }
}
