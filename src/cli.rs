use anyhow::{Context, Ok, Result};
use chrono::Local;
use clap::{CommandFactory as _, Parser, Subcommand};
use std::{io, path::PathBuf, sync::Arc, time::Duration};
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

use crate::{
    config::{self, AppConfig, RELOAD_POLL_INTERVAL},
    engine::Engine,
    gate::NotificationGate,
    instance::InstanceLock,
    present::{DesktopPresenter, LogPresenter, Presenter, TEST_BODY, TEST_TITLE},
    process::SystemProcesses,
    schedule::Status,
    snapshot::ConfigUpdater as _,
};

/// How long exit waits for blocking work, such as a popup nobody dismissed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Close distracting apps during your productive hours
#[derive(Debug, Parser)]
#[clap(
    version,
    about,
    author,
    long_about=None,
    after_help="Denied apps are closed without asking, so save your work in them before productive time starts",
)]
pub struct AppblockCLI {
    #[clap(subcommand)]
    command: AppblockOptions,
}

impl AppblockCLI {
    pub fn run(self) -> Result<()> {
        self.command.parse()
    }
}

#[derive(Debug, Subcommand)]
#[clap(rename_all = "kebab-case")]
enum AppblockOptions {
    /// Initialize by creating a sample config file
    Init {
        /// Path to the config file
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Watch running apps and close denied ones during productive time
    Run {
        /// Path to the config file to use
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Log block notifications instead of showing popups
        #[clap(long)]
        headless: bool,
    },
    /// Show whether productive time is active right now
    Status {
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Print the status as JSON
        #[clap(long)]
        json: bool,
    },
    /// Show the loaded configuration
    Config {
        #[clap(short, long)]
        config: Option<PathBuf>,
    },
    /// Show a test popup to check that notifications work
    Popup,
    /// Generate shell completions
    Completions {
        /// The shell to generate the completions for
        shell: clap_complete::Shell,
    },
}

impl AppblockOptions {
    fn parse(self) -> Result<()> {
        match self {
            Self::Init { output } => {
                AppConfig::generate_sample(output)
                    .with_context(|| "Failed to create config sample file")?;
            }
            Self::Run { config, headless } => {
                let config_path = AppConfig::resolve_path(config)?;
                let conf = AppConfig::load(Some(config_path.clone()))?;
                if !conf.enabled {
                    eprintln!("Blocking is disabled in the config, nothing will be closed until `enabled: true`");
                }

                let processes = Arc::new(SystemProcesses::new());
                let _lock = InstanceLock::acquire(&processes)?;

                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .with_context(|| "Failed to start the async runtime")?;
                let presenter: Arc<dyn Presenter> = if headless {
                    Arc::new(LogPresenter)
                } else {
                    Arc::new(DesktopPresenter)
                };
                run_to_completion(runtime, supervise(config_path, conf, processes, presenter))?;
            }
            Self::Status { config, json } => {
                let conf = AppConfig::load(config)?;
                let snapshot = conf.snapshot();
                let now = Local::now();
                let status = Status::at(&snapshot, now.naive_local());

                if json {
                    let report = serde_json::json!({
                        "enabled": snapshot.enabled,
                        "productive": status.is_active(),
                        "status": status,
                        "denylisted": snapshot.denylist.len(),
                        "checked-at": now.to_rfc3339(),
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    return Ok(());
                }

                match status {
                    Status::Active { window } => println!(
                        "Productive time is active ({}, until {})",
                        now.format("%a %H:%M"),
                        window.end.trim()
                    ),
                    Status::Idle if !snapshot.enabled => {
                        println!("Blocking is disabled in the config")
                    }
                    Status::Idle => println!(
                        "Outside productive time ({})",
                        now.format("%a %H:%M")
                    ),
                }
                println!("• {} apps on the denylist", snapshot.denylist.len());
            }
            Self::Config { config } => {
                let conf = AppConfig::load(config)?;
                println!("{}", conf);
            }
            Self::Popup => {
                DesktopPresenter
                    .display(TEST_TITLE, TEST_BODY)
                    .with_context(|| "Failed to show the test popup")?;
            }
            Self::Completions { shell } => {
                let mut cmd = AppblockCLI::command();
                clap_complete::generate(
                    shell,
                    &mut cmd,
                    env!("CARGO_PKG_NAME"),
                    &mut io::stdout(),
                );
            }
        }

        Ok(())
    }
}

/// Drives `future` to completion, then drops the runtime without waiting on open popups.
fn run_to_completion<F: Future>(runtime: Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

/// Runs the engine until Ctrl-C, applying config edits as they land.
async fn supervise(
    config_path: PathBuf,
    conf: AppConfig,
    processes: Arc<SystemProcesses>,
    presenter: Arc<dyn Presenter>,
) -> Result<()> {
    let snapshot = Arc::new(conf.snapshot());
    let gate = NotificationGate::new(conf.ai.message_source(), presenter, Handle::current());

    let engine = Engine::new(snapshot, processes, gate);
    engine.on_status_change(|productive| {
        if productive {
            eprintln!("Productive time started, denied apps will be closed");
        } else {
            eprintln!("Productive time over, apps are allowed again");
        }
    });
    engine.start();

    let mut updates = config::watch_file(config_path, conf.clone(), RELOAD_POLL_INTERVAL);
    let mut watching = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            changed = updates.changed(), if watching => {
                if changed.is_err() {
                    warn!("config watcher stopped, keeping the current config");
                    watching = false;
                    continue;
                }

                let next = updates.borrow_and_update().clone();
                if next.ai != conf.ai {
                    warn!("AI settings changed, restart appblock to apply them");
                }
                engine.update_config(Arc::new(next.snapshot()));
                info!("config reloaded");
            }
            signal = &mut shutdown => {
                if signal.is_ok() {
                    info!("received Ctrl-C, shutting down");
                }
                break signal.with_context(|| "Failed to listen for Ctrl-C");
            }
        }
    };

    engine.shutdown().await;
    result
}
