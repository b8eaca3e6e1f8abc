mod error;
mod logging;
mod settings;
mod updater;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, warn};
use swapkit_ledger::clean_previous_helper;

use crate::settings::AppSettings;

/// Demo application that updates itself from GitHub or GitLab releases.
#[derive(Debug, Parser)]
#[command(name = "swapkit", version)]
struct Cli {
    /// Settings file to read instead of the per-user one
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Enable debug logging regardless of the settings file
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List releases newer than the running version
    Check,
    /// Download the newest release and replace this executable after exit
    Update {
        /// Start the new version once it is in place
        #[arg(long)]
        restart: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (settings, settings_error) = AppSettings::load(cli.settings.as_deref());
    logging::init_logging(
        cli.debug || settings.debug_logging,
        settings.max_log_size_bytes,
    );
    if let Some(settings_error) = settings_error {
        warn!("{settings_error}; using default settings");
    }

    clean_previous_helper(settings.helper_sub_directory.as_deref());

    let result = match cli.command {
        Command::Check => updater::run_check(&settings).await,
        Command::Update { restart } => updater::run_update(&settings, restart).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("swapkit: {err}");
            ExitCode::FAILURE
        }
    }
}
