use bankledger::application::engine::TransferEngine;
use bankledger::config::{LogFormat, Settings};
use bankledger::domain::account::NewAccount;
use bankledger::domain::country::Country;
use bankledger::domain::ports::{AccountRepository, CountryRepository, LedgerBox, Page};
use bankledger::domain::transfer::TransferRequest;
use bankledger::error::LedgerError;
use bankledger::infrastructure::StoreOptions;
use bankledger::infrastructure::in_memory::InMemoryLedger;
use bankledger::interfaces::csv::account_writer::AccountWriter;
use bankledger::interfaces::csv::record_reader::RecordReader;
use bankledger::telemetry;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Transfers CSV file (`from, to, amount`)
    transfers: PathBuf,

    /// JSON settings file
    #[arg(long, env = "LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Countries to register first (`code, name, continent_name`)
    #[arg(long)]
    countries: Option<PathBuf>,

    /// Accounts to open before transferring (`owner, balance, currency, country_code`)
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Transfers in flight at once
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: u32,

    /// Extra attempts for transfers that failed on lock contention or a deadline
    #[arg(long, default_value_t = 3)]
    retries: u32,

    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    #[arg(long)]
    transfer_timeout_ms: Option<u64>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path).into_diagnostic()?,
            None => Settings::default(),
        }
        .with_env()
        .into_diagnostic()?;

        if let Some(millis) = self.lock_timeout_ms {
            settings.lock_timeout_ms = millis;
        }
        if let Some(millis) = self.transfer_timeout_ms {
            settings.transfer_timeout_ms = Some(millis);
        }
        if let Some(path) = &self.db_path {
            settings.db_path = Some(path.clone());
        }
        if let Some(format) = self.log_format {
            settings.log_format = format;
        }
        Ok(settings)
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_ledger(db_path: Option<&Path>, options: StoreOptions) -> Result<LedgerBox> {
    use bankledger::infrastructure::rocksdb::RocksDBLedger;

    match db_path {
        Some(path) => {
            let ledger = RocksDBLedger::open(path, options).into_diagnostic()?;
            tracing::info!(path = %path.display(), "Opened persistent ledger");
            Ok(Arc::new(ledger))
        }
        None => Ok(Arc::new(InMemoryLedger::with_options(options))),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_ledger(db_path: Option<&Path>, options: StoreOptions) -> Result<LedgerBox> {
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "storage-rocksdb feature not enabled. Falling back to in-memory storage."
        );
    }
    Ok(Arc::new(InMemoryLedger::with_options(options)))
}

async fn seed_countries(ledger: &LedgerBox, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for (row, record) in RecordReader::new(file).records::<Country>().enumerate() {
        let result = match record {
            Ok(country) => ledger.create_country(country).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            eprintln!("Error loading country on row {}: {}", row + 1, e);
        }
    }
    Ok(())
}

async fn seed_accounts(ledger: &LedgerBox, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for (row, record) in RecordReader::new(file).records::<NewAccount>().enumerate() {
        let result = match record {
            Ok(account) => ledger.create_account(account).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            eprintln!("Error loading account on row {}: {}", row + 1, e);
        }
    }
    Ok(())
}

/// Runs one transfer, retrying failures that a later attempt may not hit.
async fn transfer_with_retries(
    engine: &TransferEngine,
    request: TransferRequest,
    retries: u32,
) -> Result<(), LedgerError> {
    let mut attempt = 0;
    loop {
        match engine.execute_transfer(request).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::debug!(attempt, error = %e, "Retrying transfer");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    telemetry::init(settings.log_format);

    let ledger = open_ledger(settings.db_path.as_deref(), settings.store_options())?;

    if let Some(path) = &cli.countries {
        seed_countries(&ledger, path).await?;
    }
    if let Some(path) = &cli.accounts {
        seed_accounts(&ledger, path).await?;
    }

    let engine = TransferEngine::with_options(ledger.clone(), settings.engine_options());
    let permits = Arc::new(Semaphore::new(cli.concurrency as usize));
    let mut tasks = JoinSet::new();

    let file = File::open(&cli.transfers).into_diagnostic()?;
    for (row, record) in RecordReader::new(file).records::<TransferRequest>().enumerate() {
        let request = match record {
            Ok(request) => request,
            Err(e) => {
                eprintln!("Error reading transfer on row {}: {}", row + 1, e);
                continue;
            }
        };

        let permit = permits.clone().acquire_owned().await.into_diagnostic()?;
        let engine = engine.clone();
        let retries = cli.retries;
        tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = transfer_with_retries(&engine, request, retries).await {
                eprintln!("Error processing transfer on row {}: {}", row + 1, e);
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.into_diagnostic()?;
    }

    let accounts = ledger.list_accounts(Page::all()).await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
