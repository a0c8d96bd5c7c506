//! Error types for atlas-cli
//!
//! Provides user-friendly messages for the failures a tail session can hit.

use atlas_link::AtlasLinkError;
use std::fmt;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CLIError>;

/// Errors that can occur in the CLI
#[derive(Debug)]
pub enum CLIError {
    /// Error from atlas-link library
    LinkError(AtlasLinkError),

    /// Configuration file or flag error
    ConfigurationError(String),

    /// File I/O error
    FileError(String),

    /// Logging could not be initialised
    LoggingError(String),
}

impl CLIError {
    fn format_link_error(err: &AtlasLinkError) -> String {
        match err {
            AtlasLinkError::TransportError(msg) => Self::clean_nested_message(msg),
            AtlasLinkError::AuthenticationError(msg) => format!("Authentication failed: {}", msg),
            AtlasLinkError::ServerClose(msg) => format!("Disconnected by server: {}", msg),
            AtlasLinkError::HandlerError { topic, message } => format!("{}: {}", topic, message),
            AtlasLinkError::SubscriptionError(msg)
            | AtlasLinkError::ConfigurationError(msg)
            | AtlasLinkError::SerializationError(msg)
            | AtlasLinkError::TimeoutError(msg)
            | AtlasLinkError::Cancelled(msg)
            | AtlasLinkError::InternalError(msg) => msg.clone(),
        }
    }

    fn clean_nested_message(message: &str) -> String {
        let mut cleaned = message.trim();
        let prefixes = ["Connection failed:", "connection failed:", "Transport error:"];

        loop {
            let mut stripped = false;
            for prefix in &prefixes {
                if let Some(rest) = cleaned.strip_prefix(prefix) {
                    cleaned = rest.trim_start();
                    stripped = true;
                    break;
                }
            }
            if !stripped {
                break;
            }
        }

        cleaned.to_string()
    }
}

impl fmt::Display for CLIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CLIError::LinkError(e) => write!(f, "{}", Self::format_link_error(e)),
            CLIError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CLIError::FileError(msg) => write!(f, "File error: {}", msg),
            CLIError::LoggingError(msg) => write!(f, "Logging error: {}", msg),
        }
    }
}

impl std::error::Error for CLIError {}

impl From<AtlasLinkError> for CLIError {
    fn from(err: AtlasLinkError) -> Self {
        CLIError::LinkError(err)
    }
}

impl From<std::io::Error> for CLIError {
    fn from(err: std::io::Error) -> Self {
        CLIError::FileError(err.to_string())
    }
}

impl From<toml::de::Error> for CLIError {
    fn from(err: toml::de::Error) -> Self {
        CLIError::ConfigurationError(format!("TOML parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CLIError::ConfigurationError("missing url".into());
        assert_eq!(err.to_string(), "Configuration error: missing url");
    }

    #[test]
    fn test_link_error_prefixes_are_stripped() {
        let err = CLIError::from(AtlasLinkError::TransportError(
            "Connection failed: connection refused".into(),
        ));
        assert_eq!(err.to_string(), "connection refused");

        let err = CLIError::from(AtlasLinkError::AuthenticationError("expired".into()));
        assert_eq!(err.to_string(), "Authentication failed: expired");
    }
}
