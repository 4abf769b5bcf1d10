use std::process::Command;

use super::{PresentError, Presenter, run};

/// Desktop notification through `notify-send` (libnotify).
pub struct NotifySendPresenter;

impl Presenter for NotifySendPresenter {
    fn display(&self, title: &str, body: &str) -> Result<(), PresentError> {
        run(
            "notify-send",
            Command::new("notify-send")
                .arg("--app-name=appblock")
                .arg("--urgency=critical")
                .arg(title)
                .arg(body),
        )
    }
}
