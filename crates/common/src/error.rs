//! Error types for StateHub

use thiserror::Error;

use crate::types::LockMetadata;

/// Result type alias using StateHub Error
pub type Result<T> = std::result::Result<T, Error>;

/// StateHub error types
///
/// Transport failures are always translated into one of these variants at the
/// client boundary; callers never see raw HTTP client errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("State not found: {key}{}", .version.map(|v| format!(" (version {v})")).unwrap_or_default())]
    NotFound { key: String, version: Option<u64> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Version conflict on {key}: expected version {expected}, current is {}", .current.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string()))]
    VersionConflict {
        key: String,
        expected: u64,
        current: Option<u64>,
    },

    #[error("State {key} is locked by another holder")]
    LockConflict {
        key: String,
        holder: Option<LockMetadata>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Invalid state key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Taxonomy-level classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    VersionConflict,
    LockConflict,
    Network,
    Timeout,
    MalformedContent,
    Local,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::VersionConflict { .. } => ErrorKind::VersionConflict,
            Error::LockConflict { .. } => ErrorKind::LockConflict,
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::MalformedContent(_) => ErrorKind::MalformedContent,
            Error::InvalidKey(_)
            | Error::InvalidConfig(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Local,
        }
    }

    /// Message suitable for end users: describes what went wrong without
    /// transport detail.
    pub fn user_message(&self) -> String {
        match self {
            Error::NotFound { key, version: Some(v) } => {
                format!("Version {v} of state '{key}' does not exist")
            }
            Error::NotFound { key, version: None } => {
                format!("No state file exists for '{key}'")
            }
            Error::Unauthorized(_) => {
                "You are not signed in or lack access to this state".to_string()
            }
            Error::VersionConflict { key, .. } => format!(
                "State '{key}' was modified by someone else; reload and try again"
            ),
            Error::LockConflict { key, holder } => match holder.as_ref().and_then(|h| h.who()) {
                Some(who) => format!("State '{key}' is locked by {who}"),
                None => format!("State '{key}' is locked by another holder"),
            },
            Error::Network(_) => "The state backend could not be reached".to_string(),
            Error::Timeout { seconds } => {
                format!("The state backend did not answer within {seconds}s")
            }
            Error::MalformedContent(_) => "State content could not be parsed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::LockConflict => "lock_conflict",
            ErrorKind::Network => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedContent => "malformed_content",
            ErrorKind::Local => "local_error",
        };
        f.write_str(s)
    }
}
