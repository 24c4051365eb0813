//! navtest - run declarative test plans against network devices
//!
//! Each plan step runs a discovered script and can verify the result by
//! querying the device.

use clap::Parser;
use navtest::common::{config::Config, logging};
use navtest::{cli, commands::Commands, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "navtest", about = "Device configuration test runner")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/navtest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Management platform host, overriding [navigator] host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let log_guard = logging::init_cli(args.log_file.as_deref());

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        // exit() skips destructors; flush the file log first
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(host) = args.host {
        config.navigator.host = Some(host);
    }
    cli::dispatch(args.command, config).await
}
