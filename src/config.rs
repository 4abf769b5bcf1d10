use anyhow::{Context, Ok, Result};
use chrono::Weekday;
use config::{Config, File};
use humantime_serde::re::humantime::format_duration;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use url::Url;

use crate::{
    message::{DEFAULT_ENDPOINT, GeminiProvider, MessageSource},
    snapshot::{ConfigSnapshot, Denylist, TimeWindow},
};

const CONFIG_FILE_NAME: &str = "appblock.yaml";

/// How often `run` checks the config file for edits.
pub const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    /// Master switch, nothing is blocked while this is off
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub scan_interval: Duration,
    /// Minimum time between two block popups
    #[serde(with = "humantime_serde")]
    pub notification_cooldown: Duration,
    pub active_days: Vec<Weekday>,
    pub time_windows: Vec<TimeWindow>,
    /// Process names to close, e.g. `chrome.exe` on Windows or `chrome` on Linux
    pub denylist: Vec<String>,
    pub ai: AiConfig,
}

/// Settings for the generated motivational message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AiConfig {
    pub enabled: bool,
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub personality: String,
    pub endpoint: Url,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_interval: Duration::from_secs(5),
            notification_cooldown: Duration::from_secs(60),
            active_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            time_windows: vec![
                TimeWindow::new("09:00", "12:00"),
                TimeWindow::new("13:00", "17:00"),
                TimeWindow::new("19:00", "21:00"),
            ],
            denylist: vec![
                "chrome.exe".to_string(),
                "discord.exe".to_string(),
                "telegram.exe".to_string(),
            ],
            ai: AiConfig::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash".to_string(),
            personality: String::new(),
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            timeout: Duration::from_secs(8),
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = Self::resolve_path(path)?;

        let config = Config::builder()
            .add_source(File::from(config_path.as_path()))
            .build()
            .with_context(|| format!("Failed to read config `{}`", config_path.display()))?
            .try_deserialize::<Self>()
            .with_context(|| format!("Failed to parse config `{}`", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// The explicit `path` if given, otherwise the first config found in the usual places.
    pub fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file()
                .with_context(|| "No config file found, run `appblock init` to create one")?,
        };

        if !config_path.exists() {
            anyhow::bail!(
                "Config file `{}` does not exist",
                config_path.to_string_lossy()
            );
        }

        Ok(config_path)
    }

    fn validate(&self) -> Result<()> {
        if self.scan_interval < Duration::from_secs(1) {
            anyhow::bail!(
                "`scan-interval` must be at least 1s, found `{}`",
                format_duration(self.scan_interval)
            );
        }

        for window in &self.time_windows {
            if window.minutes().is_none() {
                anyhow::bail!("Invalid time window `{}`, expected `HH:MM`", window);
            }

            if window.is_overnight() {
                warn!(%window, "time windows cannot cross midnight, this one will never match");
            }
        }

        if self.ai.enabled {
            Self::validate_endpoint(&self.ai.endpoint)
                .with_context(|| format!("Invalid AI endpoint `{}`", self.ai.endpoint))?;
        }

        Ok(())
    }

    fn validate_endpoint(url: &Url) -> Result<()> {
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("URL scheme must be http or https, found `{}`", url.scheme());
        }

        if url.host().is_none() {
            anyhow::bail!("URL must have a valid host, found `{}`", url);
        }

        Ok(())
    }

    /// The immutable view the enforcement loops run against.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            enabled: self.enabled,
            active_days: self.active_days.iter().copied().collect::<HashSet<_>>(),
            time_windows: self.time_windows.clone(),
            denylist: Denylist::new(&self.denylist),
            scan_interval: self.scan_interval,
            notification_cooldown: self.notification_cooldown,
        }
    }

    fn find_config_file() -> Option<PathBuf> {
        Self::find_config_in(Path::new(""), dirs::home_dir().as_deref())
    }

    /// The working directory wins, the home locations are only tried when a home is known.
    fn find_config_in(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
        let mut possible_paths = vec![cwd.join(CONFIG_FILE_NAME)];
        if let Some(home) = home {
            possible_paths.push(home.join(".config/appblock").join(CONFIG_FILE_NAME));
            possible_paths.push(home.join(".config").join(CONFIG_FILE_NAME));
        }

        possible_paths.into_iter().find(|path| path.exists())
    }

    fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .with_context(|| "Could not determine the home directory, pass `--output`")?;

        Ok(home.join(".config/appblock").join(CONFIG_FILE_NAME))
    }

    pub fn generate_sample(output_path: Option<PathBuf>) -> Result<String> {
        let config_path = match output_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let sample_config = Self {
            enabled: true,
            ..Self::default()
        };

        let yaml_content = serde_yml::to_string(&sample_config)?;
        fs::write(&config_path, &yaml_content)?;

        eprintln!(
            "Sample config file created at `{}`",
            config_path.to_string_lossy()
        );

        Ok(yaml_content)
    }
}

impl AiConfig {
    /// Where block popups get their text from, falling back to the fixed message when AI is off
    /// or unavailable.
    pub fn message_source(&self) -> MessageSource {
        if !self.enabled {
            return MessageSource::fixed();
        }

        match GeminiProvider::from_env(
            &self.endpoint,
            &self.model,
            self.personality.clone(),
            self.timeout,
        ) {
            std::result::Result::Ok(provider) => {
                info!(model = %self.model, "Gemini message provider initialized");
                MessageSource::new(Arc::new(provider), self.timeout)
            }
            Err(e) => {
                warn!(error = %e, "AI messages disabled");
                MessageSource::fixed()
            }
        }
    }
}

/// Polls `path` and publishes every edit that loads and validates.
///
/// Edits that fail to load are logged and skipped, the receiver keeps the last good config.
pub fn watch_file(path: PathBuf, initial: AppConfig, poll: Duration) -> watch::Receiver<AppConfig> {
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        let mut last_modified = modified_at(&path);
        loop {
            tokio::time::sleep(poll).await;
            if tx.is_closed() {
                break;
            }

            let modified = modified_at(&path);
            if modified.is_none() || modified == last_modified {
                continue;
            }
            last_modified = modified;

            info!(path = %path.display(), "config file changed, reloading");
            match AppConfig::load(Some(path.clone())) {
                std::result::Result::Ok(config) => {
                    tx.send_replace(config);
                }
                Err(e) => error!(error = format!("{e:#}"), "failed to reload config"),
            }
        }
    });

    rx
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let w_name = 22;

        let join = |items: Vec<String>| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join(", ")
            }
        };

        let rows = [
            ("Enabled", if self.enabled { "yes" } else { "no" }.to_string()),
            (
                "Scan interval",
                format_duration(self.scan_interval).to_string(),
            ),
            (
                "Notification cooldown",
                format_duration(self.notification_cooldown).to_string(),
            ),
            (
                "Active days",
                join(self.active_days.iter().map(ToString::to_string).collect()),
            ),
            (
                "Time windows",
                join(self.time_windows.iter().map(ToString::to_string).collect()),
            ),
            ("Denylist", join(self.denylist.clone())),
            (
                "AI messages",
                if self.ai.enabled {
                    format!(
                        "{} ({} timeout)",
                        self.ai.model,
                        format_duration(self.ai.timeout)
                    )
                } else {
                    "off".to_string()
                },
            ),
        ];

        writeln!(f, "  {:<w_name$} {}", "Setting", "Value", w_name = w_name)?;
        write!(f, "  {:-<w_name$} {:-<30}", "", "", w_name = w_name)?;
        for (name, value) in rows {
            write!(f, "\n• {:<w_name$} {}", name, value, w_name = w_name)?;
        }

        std::fmt::Result::Ok(())
    }
}
