use anyhow::{Context, Result};
use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    process,
};
use tracing::{debug, warn};

use crate::process::SystemProcesses;

const LOCK_DIR: &str = "appblock";
const LOCK_FILE: &str = "appblock.lock";

/// Guards against two enforcers fighting over the same processes.
///
/// The lock file holds the owner's pid and is removed when the guard is dropped. A lock left
/// behind by a crashed run is taken over.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(processes: &SystemProcesses) -> Result<Self> {
        Self::acquire_in(&env::temp_dir().join(LOCK_DIR), |pid| {
            processes.is_running(pid)
        })
    }

    fn acquire_in(dir: &Path, is_running: impl Fn(u32) -> bool) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create lock directory `{}`", dir.display()))?;
        let path = dir.join(LOCK_FILE);

        match Self::create(&path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to create lock file `{}`", path.display()));
            }
        }

        let owner = fs::read_to_string(&path)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok());
        if let Some(pid) = owner {
            if pid != process::id() && is_running(pid) {
                anyhow::bail!("appblock is already running (pid {pid})");
            }
        }

        warn!(path = %path.display(), ?owner, "taking over stale lock file");
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove stale lock file `{}`", path.display()))?;

        Self::create(&path)
            .with_context(|| format!("Failed to create lock file `{}`", path.display()))
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", process::id())?;
        debug!(path = %path.display(), "instance lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
