//! Library entry point for atlas-cli components.
//!
//! Exposes the config loader, logging setup and event formatter so tests can
//! exercise them without going through the `atlas-tail` binary.

pub mod config;
pub mod error;
pub mod formatter;
pub mod logging;

pub use config::{CLIConfiguration, RegionConfig};
pub use error::{CLIError, Result};
pub use formatter::{EventFormatter, OutputFormat};
