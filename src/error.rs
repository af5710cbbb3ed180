#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const CLI_ERROR: &str = "CLI_ERROR";
    pub const EXISTS: &str = "EXISTS";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const INVALID: &str = "INVALID";
    pub const CONFLICT: &str = "CONFLICT";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Pattern error: {0}")]
    PatternError(String),

    #[error("Pattern instance already exists: {0}")]
    PatternExists(String),

    #[error("Pattern instance not found: {0}")]
    PatternNotFound(String),

    #[error("Daemon error: {0}")]
    DaemonError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SwarmError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::InvalidIdentifier(_) | Self::SerializationError(_) => {
                code::INVALID
            }
            Self::DatabaseError(_) | Self::SqlxError(_) => code::INTERNAL,
            Self::PatternError(_) => code::CONFLICT,
            Self::PatternExists(_) => code::EXISTS,
            Self::PatternNotFound(_) => code::NOTFOUND,
            Self::DaemonError(_) | Self::IoError(_) => code::DEPENDENCY,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) | Self::InvalidIdentifier(_) => 2,
            Self::DatabaseError(_) | Self::SqlxError(_) => 3,
            Self::PatternError(_) | Self::PatternExists(_) => 4,
            Self::PatternNotFound(_) => 5,
            Self::DaemonError(_) => 6,
            Self::IoError(_) => 7,
            Self::SerializationError(_) => 8,
        }
    }
}

/// Protocol error codes as documented in the CLI
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::CLI_ERROR,
        "Invalid CLI usage",
        "Run 'swarm-hooks --help' for valid options",
    ),
    (
        code::EXISTS,
        "Pattern instance already exists",
        "Pick another id or run 'swarm-hooks pattern reset'",
    ),
    (
        code::NOTFOUND,
        "Pattern instance was not found",
        "Run 'swarm-hooks pattern list' and verify the type and id",
    ),
    (
        code::INVALID,
        "Invalid identifier or payload",
        "Ids must match [A-Za-z0-9_-]{1,64}",
    ),
    (
        code::CONFLICT,
        "Conflicting pattern state",
        "Run 'swarm-hooks pattern show' to inspect the instance",
    ),
    (
        code::DEPENDENCY,
        "Daemon or filesystem unavailable",
        "Start the daemon manually or check permissions",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs (SWARM_LOG=debug) and retry",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::{code, get_error_info, SwarmError};

    #[test]
    fn every_variant_code_is_documented() {
        let samples = [
            SwarmError::ConfigError("x".to_string()),
            SwarmError::InvalidIdentifier("a b".to_string()),
            SwarmError::PatternError("x".to_string()),
            SwarmError::PatternExists("x".to_string()),
            SwarmError::PatternNotFound("x".to_string()),
            SwarmError::DaemonError("x".to_string()),
            SwarmError::IoError(std::io::Error::other("x")),
        ];
        for err in samples {
            assert!(get_error_info(err.code()).is_some(), "{err}");
        }
    }

    #[test]
    fn exit_code_mapping_is_stable() {
        assert_eq!(SwarmError::ConfigError("x".to_string()).exit_code(), 2);
        assert_eq!(SwarmError::PatternNotFound("x".to_string()).exit_code(), 5);
        assert_eq!(SwarmError::InvalidIdentifier(String::new()).code(), code::INVALID);
    }

    #[test]
    fn sqlx_failures_convert_to_internal_database_errors() {
        let err: SwarmError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, SwarmError::SqlxError(_)));
        assert_eq!(err.code(), code::INTERNAL);
        assert_eq!(err.exit_code(), 3);
    }
}
