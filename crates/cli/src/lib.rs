//! StateHub client
//!
//! Versioned remote storage for Terraform state: a transport for the six
//! state verbs, a catalog view over versions, version comparison and scoped
//! locking, plus the pieces the `statehub` CLI is built from.

pub mod catalog;
pub mod client;
pub mod commands;
pub mod compare;
pub mod config;
pub mod lock;
pub mod output;
pub mod session;
pub mod transport;

pub use catalog::VersionCatalog;
pub use client::HttpStateTransport;
pub use compare::CompareEngine;
pub use config::ClientConfig;
pub use lock::{lock_info, with_lock};
pub use session::{Credentials, SessionContext};
pub use transport::StateTransport;
