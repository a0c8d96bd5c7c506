use crate::args::Cli;
use atlas_cli::config::parse_transport;
use atlas_cli::{CLIConfiguration, CLIError, Result};
use atlas_link::{AtlasLinkClient, LinkTimeouts, RegionBounds};

/// Timeout presets win over the `[connection]` table.
fn build_timeouts(cli: &Cli, config: &CLIConfiguration) -> LinkTimeouts {
    if cli.fast_timeouts {
        return LinkTimeouts::fast();
    }
    if cli.relaxed_timeouts {
        return LinkTimeouts::relaxed();
    }
    config.to_timeouts()
}

/// Flags and `ATLAS_TOKEN` override the config file.
pub fn resolve_token(cli: &Cli, config: &CLIConfiguration) -> Result<String> {
    cli.token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| config.token())
        .ok_or_else(|| {
            CLIError::ConfigurationError(
                "No token: pass --token, set ATLAS_TOKEN or add [auth].token to the config".into(),
            )
        })
}

/// Command-line regions replace the configured ones.
pub fn resolve_regions(cli: &Cli, config: &CLIConfiguration) -> Result<Vec<RegionBounds>> {
    if cli.regions.is_empty() {
        config.region_bounds()
    } else {
        Ok(cli.regions.clone())
    }
}

pub fn create_client(cli: &Cli, config: &CLIConfiguration) -> Result<AtlasLinkClient> {
    let server_url = cli
        .url
        .clone()
        .or_else(|| config.resolved_server().url)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let mut options = config.to_connection_options()?;
    if let Some(transport) = &cli.transport {
        options = options.with_transport(parse_transport(transport)?);
    }

    log::debug!("Connecting to {} with {:?}", server_url, options);
    let client = AtlasLinkClient::builder()
        .base_url(server_url)
        .connection_options(options)
        .timeouts(build_timeouts(cli, config))
        .build()?;
    Ok(client)
}
