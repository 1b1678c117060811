//! Version catalog: current/previous view over a state object's versions

use std::sync::Arc;
use tracing::warn;

use statehub_common::{CurrentAndPrevious, Result, StateObjectKey};

use crate::transport::StateTransport;

pub struct VersionCatalog<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: StateTransport + ?Sized> VersionCatalog<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Split the version list into the current version and the older ones.
    /// An object that was never written is a valid, empty result.
    pub async fn get_current_and_previous(&self, key: &StateObjectKey) -> Result<CurrentAndPrevious> {
        let index = self.transport.list_versions(key).await?;
        Ok(CurrentAndPrevious::from(index))
    }

    /// Advisory: any failure reads as "does not exist".
    pub async fn exists(&self, key: &StateObjectKey) -> bool {
        match self.transport.list_versions(key).await {
            Ok(index) => !index.is_empty(),
            Err(e) => {
                warn!("existence check for {} failed: {}", key, e);
                false
            }
        }
    }
}
