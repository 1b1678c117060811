//! Version-addressed state comparison

use std::sync::Arc;

use statehub_common::{build_diff, DiffResult, Result, StateObjectKey};

use crate::transport::StateTransport;

pub struct CompareEngine<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: StateTransport + ?Sized> CompareEngine<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Fetch two versions and diff them, `left` as the old side. Read errors
    /// propagate; content that cannot be diffed yields `None`.
    pub async fn compare_versions(
        &self,
        key: &StateObjectKey,
        left: u64,
        right: u64,
    ) -> Result<Option<DiffResult>> {
        let (left, right) = futures::try_join!(
            self.transport.read_state(key, Some(left)),
            self.transport.read_state(key, Some(right)),
        )?;
        Ok(build_diff(&left, &right))
    }
}
