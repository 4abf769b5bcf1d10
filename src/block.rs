use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::{
    gate::NotificationGate,
    periodic::{Job, PeriodicTask},
    process::{ProcessError, ProcessTable},
    snapshot::{ConfigSnapshot, ConfigUpdater, SharedConfig},
};

/// Read side of the schedule, consulted before every scan.
pub trait ProductiveTime: Send + Sync {
    fn is_productive(&self) -> bool;
}

/// One process closed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub process_name: String,
    pub pid: u32,
    pub detected_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Graceful,
    Forced,
}

/// Scans running processes during productive time and closes the denied ones.
pub struct ProcessEnforcer {
    config: SharedConfig,
    schedule: Arc<dyn ProductiveTime>,
    processes: Arc<dyn ProcessTable>,
    gate: NotificationGate,
    task: Mutex<Option<PeriodicTask>>,
}

impl ProcessEnforcer {
    pub fn new(
        snapshot: Arc<ConfigSnapshot>,
        schedule: Arc<dyn ProductiveTime>,
        processes: Arc<dyn ProcessTable>,
        gate: NotificationGate,
    ) -> Self {
        Self {
            config: SharedConfig::new(snapshot),
            schedule,
            processes,
            gate,
            task: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("blocker already running");
            return;
        }

        let interval = self.config.load().scan_interval;
        *task = Some(PeriodicTask::start("blocker", interval, Arc::clone(self)));
        info!(?interval, "blocker started");
    }

    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("blocker stopped");
        }
    }

    /// One scan: closes every denied process and hands a [`BlockEvent`] per closed process to
    /// the notification gate, in enumeration order.
    pub fn tick(&self) -> Vec<BlockEvent> {
        // Only block during productive time
        if !self.schedule.is_productive() {
            return Vec::new();
        }

        let snapshot = self.config.load();
        debug!("scanning for blocked processes");

        let processes = match self.processes.list() {
            Ok(processes) => processes,
            Err(e) => {
                error!(error = %e, "failed to list processes");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for process in processes {
            let Some(name) = process.name else {
                trace!(pid = process.pid, "skipping process without a readable name");
                continue;
            };

            if !snapshot.denylist.contains(&name) {
                continue;
            }

            match self.terminate(process.pid) {
                Ok(termination) => {
                    info!(app = %name, pid = process.pid, ?termination, "terminated blocked process");
                    let event = BlockEvent {
                        process_name: name,
                        pid: process.pid,
                        detected_at: Local::now(),
                    };
                    self.gate.request(&event, snapshot.notification_cooldown);
                    events.push(event);
                }
                Err(e) => {
                    error!(app = %name, pid = process.pid, error = %e, "failed to kill process");
                }
            }
        }

        if events.is_empty() {
            debug!("scan complete, no blocked apps found");
        }

        events
    }

    fn terminate(&self, pid: u32) -> Result<Termination, ProcessError> {
        match self.processes.terminate(pid) {
            Ok(()) => Ok(Termination::Graceful),
            Err(e) => {
                debug!(pid, error = %e, "graceful termination failed, killing");
                self.processes.kill(pid).map(|()| Termination::Forced)
            }
        }
    }
}

impl ConfigUpdater for ProcessEnforcer {
    fn update_config(&self, snapshot: Arc<ConfigSnapshot>) {
        let interval = snapshot.scan_interval;
        self.config.replace(snapshot);

        if let Some(task) = self.task.lock().as_ref() {
            task.reset_period(interval);
        }
        info!(?interval, "blocker config updated");
    }
}

impl Job for ProcessEnforcer {
    fn run(&self) {
        self.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gate::tests::recording_gate,
        process::ProcessEntry,
        snapshot::{Denylist, test_snapshot},
    };
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    struct Flag(AtomicBool);

    impl ProductiveTime for Flag {
        fn is_productive(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeProcesses {
        running: Mutex<Vec<ProcessEntry>>,
        fail_listing: AtomicBool,
        list_calls: AtomicUsize,
        refuse_terminate: HashSet<u32>,
        refuse_kill: HashSet<u32>,
        signals: Mutex<Vec<(&'static str, u32)>>,
        on_terminate: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    }

    impl FakeProcesses {
        fn running(entries: Vec<ProcessEntry>) -> Self {
            Self {
                running: Mutex::new(entries),
                ..Self::default()
            }
        }

        fn signals(&self) -> Vec<(&'static str, u32)> {
            self.signals.lock().clone()
        }
    }

    impl ProcessTable for FakeProcesses {
        fn list(&self) -> Result<Vec<ProcessEntry>, ProcessError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(ProcessError::Enumerate("access denied".to_string()));
            }
            Ok(self.running.lock().clone())
        }

        fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.signals.lock().push(("terminate", pid));
            if let Some(hook) = self.on_terminate.lock().as_ref() {
                hook();
            }
            if self.refuse_terminate.contains(&pid) {
                return Err(ProcessError::Rejected { pid });
            }
            self.running.lock().retain(|entry| entry.pid != pid);
            Ok(())
        }

        fn kill(&self, pid: u32) -> Result<(), ProcessError> {
            self.signals.lock().push(("kill", pid));
            if self.refuse_kill.contains(&pid) {
                return Err(ProcessError::Rejected { pid });
            }
            self.running.lock().retain(|entry| entry.pid != pid);
            Ok(())
        }
    }

    fn enforcer(
        processes: Arc<FakeProcesses>,
        productive: bool,
        cooldown: Duration,
    ) -> (ProcessEnforcer, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (gate, shown) = recording_gate();
        let mut snapshot = test_snapshot();
        snapshot.notification_cooldown = cooldown;

        let enforcer = ProcessEnforcer::new(
            Arc::new(snapshot),
            Arc::new(Flag(AtomicBool::new(productive))),
            processes,
            gate,
        );
        (enforcer, shown)
    }

    #[tokio::test]
    async fn denied_process_is_terminated_and_reported() {
        let processes = Arc::new(FakeProcesses::running(vec![
            ProcessEntry::new(10, "explorer.exe"),
            ProcessEntry::new(11, "CHROME.EXE"),
        ]));
        let (enforcer, mut shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        let events = enforcer.tick();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].process_name, "CHROME.EXE");
        assert_eq!(events[0].pid, 11);
        assert_eq!(processes.signals(), vec![("terminate", 11)]);
        assert!(shown.recv().await.unwrap().contains("CHROME.EXE"));
    }

    #[tokio::test]
    async fn idle_schedule_skips_enumeration() {
        let processes = Arc::new(FakeProcesses::running(vec![ProcessEntry::new(11, "chrome.exe")]));
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), false, Duration::from_secs(60));

        assert!(enforcer.tick().is_empty());
        assert_eq!(processes.list_calls.load(Ordering::SeqCst), 0);
        assert!(processes.signals().is_empty());
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_only_that_tick() {
        let processes = Arc::new(FakeProcesses::running(vec![ProcessEntry::new(11, "chrome.exe")]));
        processes.fail_listing.store(true, Ordering::SeqCst);
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        assert!(enforcer.tick().is_empty());
        assert!(processes.signals().is_empty());

        processes.fail_listing.store(false, Ordering::SeqCst);
        assert_eq!(enforcer.tick().len(), 1);
        assert_eq!(processes.signals(), vec![("terminate", 11)]);
    }

    #[tokio::test]
    async fn unreadable_names_are_skipped() {
        let processes = Arc::new(FakeProcesses::running(vec![
            ProcessEntry { pid: 5, name: None },
            ProcessEntry::new(6, "chrome.exe"),
        ]));
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        let events = enforcer.tick();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid, 6);
    }

    #[tokio::test]
    async fn similar_names_are_left_alone() {
        let processes = Arc::new(FakeProcesses::running(vec![
            ProcessEntry::new(7, "chromehelper.exe"),
            ProcessEntry::new(8, "chrome"),
        ]));
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        assert!(enforcer.tick().is_empty());
        assert!(processes.signals().is_empty());
    }

    #[tokio::test]
    async fn refused_terminate_escalates_to_kill() {
        let processes = Arc::new(FakeProcesses {
            refuse_terminate: HashSet::from([11]),
            ..FakeProcesses::running(vec![ProcessEntry::new(11, "chrome.exe")])
        });
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        assert_eq!(enforcer.tick().len(), 1);
        assert_eq!(processes.signals(), vec![("terminate", 11), ("kill", 11)]);
    }

    #[tokio::test]
    async fn unkillable_process_does_not_stop_the_scan() {
        let processes = Arc::new(FakeProcesses {
            refuse_terminate: HashSet::from([11]),
            refuse_kill: HashSet::from([11]),
            ..FakeProcesses::running(vec![
                ProcessEntry::new(11, "chrome.exe"),
                ProcessEntry::new(12, "chrome.exe"),
            ])
        });
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));

        let events = enforcer.tick();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid, 12);
        assert_eq!(
            processes.signals(),
            vec![("terminate", 11), ("kill", 11), ("terminate", 12)]
        );
    }

    #[tokio::test]
    async fn every_match_yields_an_event_but_one_popup() {
        let processes = Arc::new(FakeProcesses::running(vec![
            ProcessEntry::new(20, "discord.exe"),
            ProcessEntry::new(21, "chrome.exe"),
            ProcessEntry::new(22, "Discord.exe"),
        ]));
        let (enforcer, mut shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));
        let mut snapshot = test_snapshot();
        snapshot.denylist = Denylist::new(["chrome.exe", "discord.exe"]);
        enforcer.update_config(Arc::new(snapshot));

        let pids = enforcer.tick().iter().map(|e| e.pid).collect::<Vec<_>>();

        assert_eq!(pids, vec![20, 21, 22]);
        assert!(shown.recv().await.unwrap().contains("discord.exe"));
        tokio::task::yield_now().await;
        assert!(shown.try_recv().is_err());
    }

    #[tokio::test]
    async fn reload_during_scan_keeps_the_scan_on_one_snapshot() {
        let processes = Arc::new(FakeProcesses::running(vec![
            ProcessEntry::new(1, "chrome.exe"),
            ProcessEntry::new(2, "chrome.exe"),
        ]));
        let (gate, mut shown) = recording_gate();
        let enforcer = Arc::new(ProcessEnforcer::new(
            Arc::new(test_snapshot()),
            Arc::new(Flag(AtomicBool::new(true))),
            Arc::clone(&processes) as Arc<dyn ProcessTable>,
            gate,
        ));

        let weak = Arc::downgrade(&enforcer);
        *processes.on_terminate.lock() = Some(Box::new(move || {
            if let Some(enforcer) = weak.upgrade() {
                let mut next = test_snapshot();
                next.denylist = Denylist::new(Vec::<String>::new());
                next.notification_cooldown = Duration::ZERO;
                enforcer.update_config(Arc::new(next));
            }
        }));

        // the scan keeps the old denylist, so it also keeps the old 60s cooldown
        assert_eq!(enforcer.tick().len(), 2);
        assert!(shown.recv().await.unwrap().contains("chrome.exe"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(shown.try_recv().is_err());

        *processes.on_terminate.lock() = None;
        processes
            .running
            .lock()
            .push(ProcessEntry::new(3, "chrome.exe"));
        assert!(enforcer.tick().is_empty());
    }

    #[tokio::test]
    async fn config_swap_applies_on_next_tick() {
        let processes = Arc::new(FakeProcesses::running(vec![ProcessEntry::new(30, "slack.exe")]));
        let (enforcer, _shown) = enforcer(Arc::clone(&processes), true, Duration::from_secs(60));
        assert!(enforcer.tick().is_empty());

        let mut snapshot = test_snapshot();
        snapshot.denylist = Denylist::new(["slack.exe"]);
        enforcer.update_config(Arc::new(snapshot));

        assert_eq!(enforcer.tick().len(), 1);
    }

    #[tokio::test]
    async fn scan_interval_update_retimes_running_loop() {
        let processes = Arc::new(FakeProcesses::default());
        let (gate, _shown) = recording_gate();
        let mut slow = test_snapshot();
        slow.scan_interval = Duration::from_secs(3600);
        let enforcer = Arc::new(ProcessEnforcer::new(
            Arc::new(slow),
            Arc::new(Flag(AtomicBool::new(true))),
            Arc::clone(&processes) as Arc<dyn ProcessTable>,
            gate,
        ));

        enforcer.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(processes.list_calls.load(Ordering::SeqCst), 0);

        let mut fast = test_snapshot();
        fast.scan_interval = Duration::from_millis(10);
        enforcer.update_config(Arc::new(fast));
        tokio::time::sleep(Duration::from_millis(150)).await;
        enforcer.stop().await;

        let scans = processes.list_calls.load(Ordering::SeqCst);
        assert!(scans >= 2, "expected the faster cadence to scan repeatedly, got {scans}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(processes.list_calls.load(Ordering::SeqCst), scans);
    }
}
