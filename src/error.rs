//! Error types for stockfetch
//!
//! This module provides the error hierarchy for the library:
//! - [`Error`] - the run-level error returned by public entry points
//! - [`TransferError`] - failures of the remote transfer session (connect, list, fetch)
//! - [`LedgerError`] - failures reading or appending ledger files
//! - [`ExtractionError`] - failures of the post-download unpack step, reported as an event
//! - [`NotificationError`] - failures delivering the run report, logged and never fatal
//!
//! Entry-level failures never escape a download task; they are converted into
//! [`DownloadOutcome::Failed`](crate::types::DownloadOutcome::Failed) there. Only
//! run-level failures (configuration, listing, ledger load) surface as [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stockfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stockfetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage.fotolia")
        key: Option<String>,
    },

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Remote transfer failure (connect, listing)
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Ledger could not be loaded or written
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Remote transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// Could not reach or authenticate against the remote endpoint
    #[error("cannot connect to {endpoint}: {reason}")]
    Connection {
        /// host:port of the remote endpoint
        endpoint: String,
        /// The underlying failure
        reason: String,
        /// Whether a later attempt may succeed (network-level failure vs. rejected login)
        transient: bool,
    },

    /// The server rejected or garbled a command
    #[error("{operation} failed: {reason}")]
    Protocol {
        /// The command that failed (e.g., "list", "pwd")
        operation: &'static str,
        /// The server's answer or the decoding problem
        reason: String,
    },

    /// Fetching a single entry failed
    #[error("fetch of {name} failed: {reason}")]
    Fetch {
        /// Remote entry name
        name: String,
        /// The underlying failure
        reason: String,
        /// Whether retrying the fetch on a fresh session may succeed
        transient: bool,
    },

    /// The session was already closed or lost while a command was in flight
    #[error("transfer session is closed")]
    SessionClosed,

    /// Local I/O while writing to the sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file exists but cannot be read
    #[error("failed to read ledger {path}: {source}")]
    Read {
        /// Ledger file path
        path: PathBuf,
        /// The I/O failure
        source: std::io::Error,
    },

    /// Appending to a ledger file failed
    #[error("failed to append to ledger {path}: {source}")]
    Write {
        /// Ledger file path
        path: PathBuf,
        /// The I/O failure
        source: std::io::Error,
    },

    /// No ledger is configured for the category
    #[error("no ledger configured for category {0}")]
    UnknownCategory(String),

    /// The name cannot be stored as a single ledger line
    #[error("entry name {0:?} cannot be recorded in a line-based ledger")]
    InvalidName(String),
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The archive could not be opened or one of its members could not be written
    #[error("extraction failed for {archive}: {reason}")]
    Failed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Members were extracted but the archive itself could not be removed
    #[error("failed to remove extracted archive {archive}: {reason}")]
    RemoveArchive {
        /// The archive that should have been deleted
        archive: PathBuf,
        /// The reason removal failed
        reason: String,
    },
}

/// Report delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The channel could not be reached (DNS, connect, TLS, timeout)
    #[error("{channel} unreachable: {reason}")]
    Transport {
        /// Channel name (e.g., "telegram", "mail")
        channel: &'static str,
        /// The underlying failure
        reason: String,
    },

    /// The channel answered but refused the report
    #[error("{channel} rejected the report: {reason}")]
    Rejected {
        /// Channel name
        channel: &'static str,
        /// What the remote side said
        reason: String,
    },

    /// The report file could not be read
    #[error("cannot read report {path}: {source}")]
    Report {
        /// Run-log path
        path: PathBuf,
        /// The I/O failure
        source: std::io::Error,
    },
}

impl NotificationError {
    /// Whether this failure should trigger the fallback channel
    pub fn is_transport(&self) -> bool {
        matches!(self, NotificationError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key() {
        let err = Error::config("missing destination", "storage.fotolia");
        match &err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("storage.fotolia")),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "configuration error: missing destination"
        );
    }

    #[test]
    fn transfer_errors_render_with_context() {
        let err = TransferError::Connection {
            endpoint: "ftp.example.com:21".into(),
            reason: "connection refused".into(),
            transient: true,
        };
        assert_eq!(
            err.to_string(),
            "cannot connect to ftp.example.com:21: connection refused"
        );

        let err = TransferError::Fetch {
            name: "shutterstock_1.zip".into(),
            reason: "550 not found".into(),
            transient: false,
        };
        assert_eq!(
            err.to_string(),
            "fetch of shutterstock_1.zip failed: 550 not found"
        );
    }

    #[test]
    fn transfer_error_converts_into_run_error() {
        let err: Error = TransferError::Protocol {
            operation: "list",
            reason: "425 can't open data connection".into(),
        }
        .into();
        assert!(matches!(err, Error::Transfer(TransferError::Protocol { .. })));
        assert_eq!(
            err.to_string(),
            "transfer error: list failed: 425 can't open data connection"
        );
    }

    #[test]
    fn only_transport_failures_trigger_fallback() {
        let transport = NotificationError::Transport {
            channel: "telegram",
            reason: "timed out".into(),
        };
        let rejected = NotificationError::Rejected {
            channel: "telegram",
            reason: "chat not found".into(),
        };
        assert!(transport.is_transport());
        assert!(!rejected.is_transport());
    }

    #[test]
    fn ledger_invalid_name_is_debug_quoted() {
        let err = LedgerError::InvalidName("a\nb".into());
        assert_eq!(
            err.to_string(),
            "entry name \"a\\nb\" cannot be recorded in a line-based ledger"
        );
    }
}
