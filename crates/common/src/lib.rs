//! StateHub Common Library
//!
//! Shared types, the error taxonomy, wire formats and the state comparison
//! engine used by both the StateHub client and the reference backend.

pub mod diff;
pub mod error;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use diff::{build_diff, prepare_for_diff, ChangeKind, DiffResult, DiffRow, DisplayOptions};
pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// StateHub version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default per-call network ceiling, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default configuration directory
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".statehub")
}

/// Default client configuration file
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
