#![cfg(target_os = "macos")]

use std::process::Command;

use super::{PresentError, Presenter, run};

/// Modal dialog through `osascript`, returns once the user clicks OK.
pub struct DialogPresenter;

impl Presenter for DialogPresenter {
    fn display(&self, title: &str, body: &str) -> Result<(), PresentError> {
        let script = format!(
            r#"display dialog "{}" with title "{}" buttons {{"OK"}} default button "OK" with icon caution"#,
            escape(body),
            escape(title),
        );

        run("osascript", Command::new("osascript").arg("-e").arg(script))
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
