use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

use super::{ProcessEntry, ProcessError, ProcessTable};

/// [`ProcessTable`] backed by the live process list of this machine.
pub struct SystemProcesses {
    sys: Mutex<System>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    pub fn is_running(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = self.sys.lock();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid).is_some()
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), ProcessError> {
        let sys = self.sys.lock();
        let process = sys
            .process(Pid::from_u32(pid))
            .ok_or(ProcessError::NotFound { pid })?;

        match process.kill_with(signal) {
            Some(true) => Ok(()),
            Some(false) => Err(ProcessError::Rejected { pid }),
            None => Err(ProcessError::Unsupported),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcesses {
    fn list(&self) -> Result<Vec<ProcessEntry>, ProcessError> {
        let mut sys = self.sys.lock();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        if sys.processes().is_empty() {
            return Err(ProcessError::Enumerate(
                "no processes visible to this user".to_string(),
            ));
        }

        let mut entries = sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_str().map(str::to_string),
            })
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.pid);

        Ok(entries)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        self.signal(pid, Signal::Term)
    }

    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        self.signal(pid, Signal::Kill)
    }
}
