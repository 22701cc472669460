//! CLI entry point for stowage.
//!
//! Loads `.env`, sets up tracing, builds the storage stack and dispatches
//! one subcommand.

mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use stowage_core::impls::InMemoryConnector;
use stowage_core::ports::{FixedClock, SystemClock};
use stowage_core::{DistributedStorage, SessionFactory, StorageConfig, StorageEntryOptions};
use stowage_drive::DriveConnector;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{BackendArgs, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is normal
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cli = Cli::parse();
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::Demo => cmd_demo(&cancel).await,
        Commands::Serve => cmd_serve(&cli.backend, &cancel).await,
        command => {
            let storage = connect(&cli.backend).await?;
            let result = run_command(&storage, command, &cancel).await;
            storage.factory().shutdown().await;
            result
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn connect(args: &BackendArgs) -> Result<DistributedStorage> {
    let config = args.to_config()?;
    let connector = DriveConnector::new(&config).context("failed to build Drive client")?;
    let factory = SessionFactory::initialize(Arc::new(connector), &config, Arc::new(SystemClock))
        .await
        .with_context(|| format!("failed to open storage folder {:?}", config.storage_name))?;
    Ok(DistributedStorage::new(factory))
}

async fn run_command(
    storage: &DistributedStorage,
    command: Commands,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Commands::Get { key } => {
            let value = storage
                .get(&key, cancel)
                .await
                .with_context(|| format!("failed to read {key:?}"))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.flush()?;
        }
        Commands::Set {
            key,
            value,
            file,
            expiry,
        } => {
            let bytes = match (value, file) {
                (Some(value), _) => value.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("provide a value or --file"),
            };
            let options = expiry.to_options(Utc::now())?;
            storage
                .set(&key, &bytes, &options, cancel)
                .await
                .with_context(|| format!("failed to write {key:?}"))?;
            info!(key = %key, bytes = bytes.len(), "stored");
        }
        Commands::Remove { key } => {
            storage
                .remove(&key, cancel)
                .await
                .with_context(|| format!("failed to remove {key:?}"))?;
            info!(key = %key, "removed");
        }
        Commands::Ids => {
            let session = storage.factory().open_session().await?;
            for id in session.list_ids(cancel).await? {
                println!("{id}");
            }
        }
        Commands::Entries => {
            let session = storage.factory().open_session().await?;
            for entry in session.list_entries(cancel).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        Commands::Sweep => {
            let report = storage.factory().sweep_now(cancel).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Serve | Commands::Demo => anyhow::bail!("not a one-shot storage command"),
    }
    Ok(())
}

async fn cmd_serve(args: &BackendArgs, cancel: &CancellationToken) -> Result<()> {
    let storage = connect(args).await?;
    info!(
        container = %storage.factory().container_id(),
        interval_secs = args.sweep_interval_secs,
        "sweeping until interrupted"
    );
    cancel.cancelled().await;
    storage.factory().shutdown().await;
    info!("stopped");
    Ok(())
}

/// In-memory walkthrough: write, read, expire, sweep.
async fn cmd_demo(cancel: &CancellationToken) -> Result<()> {
    let clock = FixedClock::new(Utc::now());
    let backend = InMemoryConnector::new(Arc::new(clock.clone()));
    let config = StorageConfig::new("demo", "stowage-demo");
    let factory =
        SessionFactory::initialize(Arc::new(backend.clone()), &config, Arc::new(clock.clone()))
            .await?;
    let storage = DistributedStorage::new(Arc::clone(&factory));

    let sliding = StorageEntryOptions::never_expires().with_sliding_expiration(TimeDelta::hours(1));
    storage.set("session:42", b"{\"step\":1}", &sliding, cancel).await?;
    storage
        .set_json(
            "profile:kim",
            &serde_json::json!({ "name": "kim", "visits": 3 }),
            &StorageEntryOptions::never_expires(),
            cancel,
        )
        .await?;

    let value = storage.get("session:42", cancel).await?;
    info!(value = %String::from_utf8_lossy(&value), "read back session:42");

    clock.advance(TimeDelta::hours(2));
    info!("advanced the clock by two hours");

    let report = factory.sweep_now(cancel).await?;
    info!(
        scanned = report.scanned,
        evicted = report.evicted,
        failed = report.failed,
        "sweep finished"
    );

    match storage.get("session:42", cancel).await {
        Err(err) if err.is_not_found() => info!("session:42 was evicted"),
        other => warn!(?other, "session:42 should have been evicted"),
    }
    let profile: serde_json::Value = storage.get_json("profile:kim", cancel).await?;
    info!(%profile, remaining = backend.object_count(), "profile:kim survived");

    factory.shutdown().await;
    Ok(())
}
