//! CLI argument definitions for the `stowage` binary.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use stowage_core::{StorageConfig, StorageEntryOptions};

/// stowage -- a TTL key/value store kept in a Google Drive folder.
#[derive(Parser)]
#[command(name = "stowage", version, about = "TTL key/value store on Google Drive")]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct BackendArgs {
    /// OAuth 2.0 access token for the Drive API.
    #[arg(long, env = "STOWAGE_CREDENTIAL", hide_env_values = true, global = true)]
    pub credential: Option<String>,

    /// Application name sent to Drive as the User-Agent.
    #[arg(long, env = "STOWAGE_APPLICATION_NAME", default_value = "stowage", global = true)]
    pub application_name: String,

    /// Name of the Drive folder that holds every entry.
    #[arg(long, env = "STOWAGE_STORAGE_NAME", default_value = "stowage", global = true)]
    pub storage_name: String,

    /// Account granted writer access when the folder is first created.
    #[arg(long, env = "STOWAGE_SHARE_TO", global = true)]
    pub share_to: Option<String>,

    /// Seconds between background sweeps.
    #[arg(long, env = "STOWAGE_SWEEP_INTERVAL_SECS", default_value_t = 86_400, global = true)]
    pub sweep_interval_secs: u64,
}

impl BackendArgs {
    pub fn to_config(&self) -> Result<StorageConfig> {
        let credential = self
            .credential
            .clone()
            .context("no credential: pass --credential or set STOWAGE_CREDENTIAL")?;
        let mut config = StorageConfig::new(credential, self.application_name.clone())
            .with_storage_name(self.storage_name.clone())
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs));
        if let Some(principal) = &self.share_to {
            config = config.with_share_to(principal.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value stored under a key.
    Get {
        key: String,
    },

    /// Store a value under a key, replacing any existing one.
    Set {
        key: String,

        /// Value to store. Read from --file when omitted.
        value: Option<String>,

        /// Read the value from a file instead.
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,

        #[command(flatten)]
        expiry: ExpiryArgs,
    },

    /// Delete a key.
    Remove {
        key: String,
    },

    /// List every entry id in the folder.
    Ids,

    /// List every entry with its timestamp and expiration metadata (JSON lines).
    Entries,

    /// Evict expired entries now.
    Sweep,

    /// Keep the background sweep running until interrupted.
    Serve,

    /// Walk through set/get/expire/sweep against an in-memory backend.
    Demo,
}

#[derive(Args)]
pub struct ExpiryArgs {
    /// Evict after this many seconds without a write.
    #[arg(long)]
    pub sliding_secs: Option<i64>,

    /// Evict after this many seconds from now.
    #[arg(long, conflicts_with = "absolute")]
    pub ttl_secs: Option<i64>,

    /// Evict at this RFC 3339 instant.
    #[arg(long)]
    pub absolute: Option<DateTime<Utc>>,
}

impl ExpiryArgs {
    pub fn to_options(&self, now: DateTime<Utc>) -> Result<StorageEntryOptions> {
        let mut options = StorageEntryOptions::never_expires();
        if let Some(secs) = self.sliding_secs {
            options = options.with_sliding_expiration(seconds(secs, "--sliding-secs")?);
        }
        if let Some(secs) = self.ttl_secs {
            let deadline = now
                .checked_add_signed(seconds(secs, "--ttl-secs")?)
                .with_context(|| format!("--ttl-secs is out of range: {secs}"))?;
            options = options.with_absolute_expiration(deadline);
        }
        if let Some(at) = self.absolute {
            options = options.with_absolute_expiration(at);
        }
        Ok(options)
    }
}

fn seconds(secs: i64, flag: &str) -> Result<TimeDelta> {
    if secs <= 0 {
        bail!("{flag} must be positive, got {secs}");
    }
    TimeDelta::try_seconds(secs).with_context(|| format!("{flag} is out of range: {secs}"))
}
