// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sealgen - lock event log inspection
//!
//! Runs migrations against the configured database and prints the event log
//! or derived lock state of a key.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use sealgen_core::LockCoordinator;
use sealgen_core::config::Config;
use sealgen_core::lock::LockKey;

/// Sealgen lock event log tool
#[derive(Parser, Debug)]
#[command(name = "sealgen")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Print every event of a key as JSON lines
    Events {
        /// Lock key, e.g. `audit_trail:42`
        key: String,
    },

    /// Print the derived lock state of a key
    State {
        /// Lock key, e.g. `audit_trail:42`
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sealgen_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    // Connecting runs migrations
    let coordinator = LockCoordinator::connect(&config).await?;

    match cli.command {
        Commands::Migrate => {
            info!("Migrations completed");
        }
        Commands::Events { key } => {
            let key = parse_key(&key)?;
            for event in coordinator.store().list_events(&key.to_string()).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::State { key } => {
            let key = parse_key(&key)?;
            println!("{}", coordinator.state(&key.to_string()).await?);
        }
    }

    Ok(())
}

fn parse_key(raw: &str) -> Result<LockKey> {
    raw.parse().map_err(|e: String| anyhow!(e))
}
