mod block;
mod cli;
mod config;
mod engine;
mod gate;
mod instance;
mod message;
mod periodic;
mod present;
mod process;
mod schedule;
mod snapshot;

use clap::Parser as _;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::cli::AppblockCLI;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // GEMINI_API_KEY may live in a .env next to the config
    dotenvy::dotenv().ok();

    let cli = AppblockCLI::parse();

    if let Err(e) = cli.run() {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
