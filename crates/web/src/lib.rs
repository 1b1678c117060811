//! StateHub reference backend
//!
//! An in-memory, versioned Terraform remote-state backend with locking and
//! optimistic concurrency, served over HTTP.

pub mod auth;
pub mod server;
pub mod store;

pub use auth::{AuthenticatedUser, TokenTable};
pub use server::{router, serve, serve_on, AppState, WebAuth, WebServerConfig};
pub use store::StateStore;
