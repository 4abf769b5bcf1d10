use std::process::Command;

use super::{PresentError, Presenter, run};

/// Topmost message box through PowerShell, returns once the user clicks OK.
pub struct MessageBoxPresenter;

impl Presenter for MessageBoxPresenter {
    fn display(&self, title: &str, body: &str) -> Result<(), PresentError> {
        let script = format!(
            "Add-Type -AssemblyName PresentationFramework; \
             [System.Windows.MessageBox]::Show('{}', '{}', 'OK', 'Information') | Out-Null",
            escape(body),
            escape(title),
        );

        run(
            "powershell",
            Command::new("powershell")
                .args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(script),
        )
    }
}

// single-quoted PowerShell strings only need `'` doubled
fn escape(text: &str) -> String {
    text.replace('\'', "''")
}
