use atlas_cli::OutputFormat;
use atlas_link::RegionBounds;
use clap::Parser;
use std::path::PathBuf;

/// atlas-tail - live event tail for the Atlas sync service
#[derive(Parser, Debug)]
#[command(name = "atlas-tail")]
#[command(author = "Atlas Team")]
#[command(version = atlas_link::VERSION)]
#[command(about = "Connect, subscribe to regions and print live events", long_about = None)]
pub struct Cli {
    /// Server URL (e.g., https://sync.example.com)
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// Authentication token
    #[arg(long = "token", env = "ATLAS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Region to subscribe to as NORTH,SOUTH,EAST,WEST (repeatable)
    #[arg(short = 'r', long = "region", value_parser = parse_region)]
    pub regions: Vec<RegionBounds>,

    /// Transport preference: message, degraded or auto
    #[arg(long = "transport")]
    pub transport: Option<String>,

    /// Output format
    #[arg(long = "format", default_value = "text")]
    pub format: OutputFormat,

    /// Enable JSON output (shorthand for --format=json)
    #[arg(long = "json", conflicts_with = "format")]
    pub json: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Only print connection status changes
    #[arg(long = "status-only")]
    pub status_only: bool,

    /// Configuration file path
    #[arg(long = "config", default_value = "~/.atlas/config.toml")]
    pub config: PathBuf,

    /// Log level or filter directive (overrides [logging].level)
    #[arg(long = "log-level")]
    pub log_level: Option<String>,

    /// Log format: compact or json (overrides [logging].format)
    #[arg(long = "log-format")]
    pub log_format: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long = "log-file")]
    pub log_file: Option<String>,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Exit after this many seconds (0 = run until Ctrl-C)
    #[arg(long = "duration", value_name = "SECONDS", default_value_t = 0)]
    pub duration: u64,

    /// Use fast timeout preset (optimized for local development)
    #[arg(long = "fast-timeouts", conflicts_with = "relaxed_timeouts")]
    pub fast_timeouts: bool,

    /// Use relaxed timeout preset (optimized for high-latency networks)
    #[arg(long = "relaxed-timeouts")]
    pub relaxed_timeouts: bool,
}

fn parse_region(value: &str) -> Result<RegionBounds, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<Result<_, _>>()?;
    let &[north, south, east, west] = parts.as_slice() else {
        return Err(format!("expected NORTH,SOUTH,EAST,WEST, got {} value(s)", parts.len()));
    };
    let bounds = RegionBounds::new(north, south, east, west);
    bounds.validate().map_err(|e| e.to_string())?;
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("10, 0, 10, 0").unwrap(), RegionBounds::new(10.0, 0.0, 10.0, 0.0));
        assert!(parse_region("10,0,10").is_err());
        assert!(parse_region("10,0,ten,0").is_err());
        assert!(parse_region("0,10,10,0").is_err());
    }

    #[test]
    fn test_cli_parses_repeated_regions() {
        let cli = Cli::try_parse_from([
            "atlas-tail",
            "--url",
            "http://localhost:8080",
            "-r",
            "1,0,1,0",
            "-r",
            "2,1,2,1",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.regions.len(), 2);
        assert!(cli.json);
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
