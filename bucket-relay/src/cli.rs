///
/// This module implements the CLI interface for bucket-relay: command parsing,
/// wiring of the real bucket and Telegram clients, and the async entrypoint.
///
/// All orchestration logic (ledger, captions, retries, cycles) lives in the
/// [`bucket-relay-core`] crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - Command line: `bucket-relay run --config relay.yaml`, or `bucket-relay validate --config relay.yaml`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`bucket-relay-core`]: ../../bucket-relay-core/
use crate::gcs::GcsStore;
use crate::load_config::{load_config, Secrets};
use crate::telegram::TelegramChannel;
use anyhow::{Context, Result};
use bucket_relay_core::contract::TokioSleeper;
use bucket_relay_core::ledger::{FileLedgerStore, SentLedger};
use bucket_relay_core::scheduler::CycleScheduler;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// CLI for bucket-relay: relay bucket media to a Telegram channel at a steady pace.
#[derive(Parser)]
#[clap(
    name = "bucket-relay",
    version,
    about = "Relay media from a storage bucket to a Telegram channel, paced and deduplicated"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run delivery cycles using the given config file
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override schedule.total_cycles from the config file
        #[clap(long)]
        cycles: Option<u32>,
    },
    /// Check the config file and required environment without contacting any service
    Validate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Validate { config } => {
            let config = load_config(config)?;
            Secrets::from_env()?;
            tracing::info!(command = "validate", "Configuration valid");
            println!(
                "Configuration valid: {} folder(s), target {}",
                config.folders.len(),
                config.target
            );
            Ok(())
        }
        Commands::Run { config, cycles } => {
            let mut config = load_config(config)?;
            if let Some(cycles) = cycles {
                tracing::info!(cycles, "Overriding total cycles from command line");
                config.schedule.total_cycles = cycles;
            }
            let secrets = Secrets::from_env()?;

            let store = GcsStore::new(
                &secrets.gcs_endpoint,
                &config.bucket,
                &secrets.gcs_access_token,
            );
            let channel =
                TelegramChannel::new(&secrets.telegram_api_url, &secrets.telegram_bot_token);
            let ledger = SentLedger::open(FileLedgerStore::new(&config.ledger_path))
                .await
                .with_context(|| {
                    format!("Failed to load ledger {}", config.ledger_path.display())
                })?;

            tracing::info!(command = "run", "Starting relay");
            let sleeper = TokioSleeper;
            let mut scheduler = CycleScheduler::new(
                &config,
                &store,
                &channel,
                &sleeper,
                ledger,
                StdRng::from_entropy(),
            );
            let report = scheduler.run().await;
            tracing::info!(
                command = "run",
                cycles = report.cycles.len(),
                delivered = report.delivered(),
                "Relay run complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
