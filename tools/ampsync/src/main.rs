//! ampsync - replicate a template instance's schedule or settings across its
//! AMP panel group

use ampsync::{
    run_schedule_sync, run_settings_sync, with_session, ScheduleSyncOptions, SettingsSyncOptions,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use common::config_loader::DEFAULT_CONFIG_FILE;
use common::{init_logging, load_panel_config, PanelConfig};
use errors::{SyncError, SyncResult};
use std::path::PathBuf;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "ampsync")]
#[command(about = "Replicate a template instance's schedule or settings across its AMP group")]
#[command(long_about = "Replicate a template instance's schedule or settings across its AMP group

The template's friendly name carries '-TEMPLATE <GROUP>-'; every running instance
whose friendly name carries '-<GROUP>-' is a destination.

Credentials come from the config file (url, username, password) or from
AMP_URL / AMP_USER / AMP_PASS, which take precedence.

Examples:
  ampsync schedules --dry-run     # Preview trigger replacement
  ampsync settings                # Stop, update and restart changed targets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Panel configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace target schedules with the template schedule
    Schedules {
        /// Preview deletes/creates without applying schedule changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Report statuses and sync game settings from the template
    Settings {
        /// Show what settings would change without stopping or updating instances
        #[arg(long)]
        dry_run: bool,
    },
}

async fn run(command: Commands, config: &PanelConfig) -> SyncResult<()> {
    match command {
        Commands::Schedules { dry_run } => {
            let options = ScheduleSyncOptions::new(dry_run);
            let summary =
                with_session(config, move |client| {
                    Box::pin(async move { run_schedule_sync(client, &options).await })
                })
                .await?;
            let failed = summary.failed_targets();
            if failed > 0 {
                warn!("{} target(s) were not fully synced", failed);
            }
        },
        Commands::Settings { dry_run } => {
            let options = SettingsSyncOptions {
                dry_run,
                profile: config.settings_profile.clone(),
                ..Default::default()
            };
            with_session(config, move |client| {
                Box::pin(async move { run_settings_sync(client, &options).await })
            })
            .await?;
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose, !cli.no_color);

    let outcome = match load_panel_config(&cli.config) {
        Ok(config) => run(cli.command, &config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        report_failure(&e);
        std::process::exit(e.exit_code());
    }
    Ok(())
}

fn report_failure(err: &SyncError) {
    match err.log_level() {
        tracing::Level::WARN => warn!("{}", err),
        _ => error!("{}", err),
    }
}
