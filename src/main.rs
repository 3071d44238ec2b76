use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use subrecon::application::verification::VerificationService;
use subrecon::config::ReconcileConfig;
use subrecon::domain::payment::OrderId;
use subrecon::domain::ports::GuardStoreBox;
use subrecon::domain::tariff::FallbackContext;
use subrecon::infrastructure::http::HttpVerificationClient;
use subrecon::infrastructure::in_memory::InMemoryGuardStore;
#[cfg(feature = "storage-rocksdb")]
use subrecon::infrastructure::rocksdb::RocksDBGuardStore;
use subrecon::interfaces::csv::event_writer::EventWriter;
use subrecon::interfaces::json::scenario::Scenario;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted checkout and print its event log as CSV
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Timings config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to a persistent guard database (optional). If provided, uses RocksDB.
        #[arg(long)]
        guard_db: Option<PathBuf>,
    },
    /// Verify one order against a live verification endpoint
    Check {
        #[arg(long)]
        order_id: String,

        /// Overrides `verifyUrl` from the config file
        #[arg(long)]
        verify_url: Option<String>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> Result<ReconcileConfig> {
    match path {
        Some(path) => ReconcileConfig::from_file(path).into_diagnostic(),
        None => Ok(ReconcileConfig::default()),
    }
}

fn guard_store(path: Option<PathBuf>) -> Result<GuardStoreBox> {
    match path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Box::new(RocksDBGuardStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --guard-db, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryGuardStore::new()))
        }
        None => Ok(Box::new(InMemoryGuardStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            scenario,
            config,
            guard_db,
        } => {
            let config = load_config(config)?;
            let guards = guard_store(guard_db)?;
            let file = File::open(scenario).into_diagnostic()?;
            let scenario = Scenario::from_reader(file).into_diagnostic()?;

            let report = scenario.run(&config, guards).await.into_diagnostic()?;
            if let Some(manual) = &report.manual {
                info!(?manual, "manual check finished");
            }

            let stdout = io::stdout();
            let mut writer = EventWriter::new(stdout.lock());
            writer.write_events(&report.events).into_diagnostic()?;
        }
        Command::Check {
            order_id,
            verify_url,
            config,
        } => {
            let config = load_config(config)?;
            let url = verify_url
                .or_else(|| config.verify_url.clone())
                .ok_or_else(|| miette!("no verification URL: pass --verify-url or set verifyUrl"))?;
            let client =
                HttpVerificationClient::new(url, config.verify_timeout()).into_diagnostic()?;
            let verifier = VerificationService::new(Box::new(client), config.verify_timeout());

            let order_id = OrderId::new(order_id);
            let fallback = FallbackContext::for_order(order_id.clone());
            match verifier.check(&order_id, &fallback).await.into_diagnostic()? {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record).into_diagnostic()?)
                }
                None => println!("not yet paid"),
            }
        }
    }

    Ok(())
}
