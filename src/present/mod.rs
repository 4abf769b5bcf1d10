#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

use std::process::{Command, ExitStatus};
use tracing::info;

#[cfg(target_os = "linux")]
pub use linux::NotifySendPresenter as DesktopPresenter;
#[cfg(target_os = "macos")]
pub use macos::DialogPresenter as DesktopPresenter;
#[cfg(target_os = "windows")]
pub use windows::MessageBoxPresenter as DesktopPresenter;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub use LogPresenter as DesktopPresenter;

pub const BLOCKED_TITLE: &str = "appblock - productive time";
pub const TEST_TITLE: &str = "appblock - test popup";
pub const TEST_BODY: &str = "Popups are working.\n\nIf you can read this, block notifications will show up here.";

#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: ExitStatus,
        stderr: String,
    },
}

/// Shows a notification to the user.
///
/// Implementations may block until the user dismisses it, so callers must not hold locks or run
/// this on a latency-sensitive thread.
pub trait Presenter: Send + Sync {
    fn display(&self, title: &str, body: &str) -> Result<(), PresentError>;
}

/// Writes notifications to the log instead of the desktop.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn display(&self, title: &str, body: &str) -> Result<(), PresentError> {
        info!(title, body, "notification");
        Ok(())
    }
}

pub fn blocked_body(app_name: &str, message: &str) -> String {
    format!("App closed: {app_name}\n\n{message}\n\nStay focused and keep going!")
}

#[cfg_attr(
    not(any(target_os = "linux", target_os = "macos", target_os = "windows")),
    allow(dead_code)
)]
fn run(program: &'static str, command: &mut Command) -> Result<(), PresentError> {
    let output = command
        .output()
        .map_err(|source| PresentError::Spawn { program, source })?;

    if !output.status.success() {
        return Err(PresentError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
