//! Session context
//!
//! Holds the credentials of the signed-in user. A session starts on login and
//! ends on logout; transports read credentials from it on every call rather
//! than from any process-global token.

use parking_lot::RwLock;

use statehub_common::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SessionContext {
    credentials: RwLock<Option<Credentials>>,
}

impl SessionContext {
    /// A signed-out session
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: RwLock::new(Some(credentials)),
        }
    }

    pub fn login(&self, credentials: Credentials) {
        *self.credentials.write() = Some(credentials);
    }

    pub fn logout(&self) {
        *self.credentials.write() = None;
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.read().is_some()
    }

    pub fn user(&self) -> Option<String> {
        self.credentials.read().as_ref().map(|c| c.user.clone())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        self.credentials
            .read()
            .clone()
            .ok_or_else(|| Error::Unauthorized("not logged in".to_string()))
    }
}
