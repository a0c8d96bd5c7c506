//! atlas-tail - live event tail for the Atlas sync service
//!
//! # Usage
//!
//! ```bash
//! # Tail one region
//! ATLAS_TOKEN=... atlas-tail -u https://sync.example.com -r 10,0,10,0
//!
//! # Regions and endpoint from ~/.atlas/config.toml, JSON Lines output
//! atlas-tail --json
//!
//! # Connection status only, for 60 seconds
//! atlas-tail --status-only --duration 60
//! ```

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use atlas_cli::{logging, CLIConfiguration, EventFormatter, OutputFormat};
use atlas_link::{topics, ConnectionState};

mod args;
mod connect;

use args::Cli;
use connect::{create_client, resolve_regions, resolve_token};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CLIConfiguration::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let log_config = config.resolved_logging();
    let level = match (&cli.log_level, cli.verbose) {
        (Some(level), _) => level.clone(),
        (None, true) => "debug".to_string(),
        (None, false) => log_config.level.clone(),
    };
    let format = cli.log_format.clone().unwrap_or(log_config.format.clone());
    let file = cli.log_file.clone().or(log_config.file.clone());
    logging::init_logging(&level, &format, file.as_deref())?;

    let token = resolve_token(&cli, &config)?;
    let regions = resolve_regions(&cli, &config)?;
    let client = create_client(&cli, &config)?;

    let output = if cli.json { OutputFormat::Json } else { cli.format };
    if cli.no_color {
        colored::control::set_override(false);
    }
    let formatter = Arc::new(EventFormatter::new(output, !cli.no_color));

    let topics_to_print: &[&str] = if cli.status_only {
        &[topics::CONNECTION_STATUS]
    } else {
        &[
            topics::CONNECTION_STATUS,
            topics::DATA_UPDATE,
            topics::PRIVATE_UPDATE,
            topics::SUBSCRIPTION_ACK,
            topics::SUBSCRIPTION_NACK,
        ]
    };
    for topic in topics_to_print {
        let formatter = formatter.clone();
        client.on(topic, move |event| {
            println!("{}", formatter.format_event(event));
            Ok(())
        });
    }

    for bounds in &regions {
        client.subscribe(*bounds).await?;
    }
    if regions.is_empty() {
        log::warn!("No regions configured; only status and private updates will arrive");
    }

    let session = client.connect(token.as_str()).await?;
    tracing::info!(%session, regions = regions.len(), "atlas-tail connected");

    let mut status = client.watch_status();
    let gave_up = async {
        // Terminal states: retries exhausted, auth rejected, server close.
        let _ = status
            .wait_for(|s| s.state == ConnectionState::Disconnected && s.error.is_some())
            .await;
    };
    let deadline = async {
        if cli.duration == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(cli.duration)).await
        }
    };

    let exit_error = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        _ = deadline => None,
        _ = gave_up => client.status().error,
    };

    client.shutdown().await;
    match exit_error {
        Some(error) => Err(anyhow::anyhow!("connection ended: {}", error)),
        None => Ok(()),
    }
}
