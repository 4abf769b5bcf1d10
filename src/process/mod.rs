mod system;

pub use system::SystemProcesses;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to enumerate processes: {0}")]
    Enumerate(String),

    #[error("process {pid} is no longer running")]
    NotFound { pid: u32 },

    #[error("signal not supported on this platform")]
    Unsupported,

    #[error("signal to process {pid} was rejected")]
    Rejected { pid: u32 },
}

/// A running process as seen by one enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    /// `None` when the name could not be resolved, e.g. the process exited mid-scan
    pub name: Option<String>,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            pid,
            name: Some(name.to_string()),
        }
    }
}

/// The OS process layer the enforcer scans and signals.
///
/// Every call is synchronous and completes (or fails) before returning.
pub trait ProcessTable: Send + Sync {
    /// Lists running processes ordered by pid.
    fn list(&self) -> Result<Vec<ProcessEntry>, ProcessError>;

    /// Asks the process to exit.
    fn terminate(&self, pid: u32) -> Result<(), ProcessError>;

    /// Forcefully stops the process.
    fn kill(&self, pid: u32) -> Result<(), ProcessError>;
}
