//! The six state-store verbs
//!
//! Every call is a single attempt whose outcome is reported as-is: no retry,
//! no caching. Implementations translate their own failures into the
//! [`statehub_common::Error`] taxonomy before returning.

use async_trait::async_trait;

use statehub_common::{
    LockHandle, LockMetadata, Result, StateObjectKey, StateVersion, VersionIndex,
    WritePrecondition,
};

#[async_trait]
pub trait StateTransport: Send + Sync {
    /// Content of `version`, or of the current version when `None`.
    async fn read_state(&self, key: &StateObjectKey, version: Option<u64>) -> Result<Vec<u8>>;

    /// All versions, most recent first. Empty when never written.
    async fn list_versions(&self, key: &StateObjectKey) -> Result<VersionIndex>;

    /// Store `content` as a new version.
    async fn write_state(
        &self,
        key: &StateObjectKey,
        content: Vec<u8>,
        precondition: &WritePrecondition,
    ) -> Result<StateVersion>;

    /// Delete one version, or every version when `None`. Deleting something
    /// that does not exist succeeds.
    async fn delete_state(&self, key: &StateObjectKey, version: Option<u64>) -> Result<()> {
        self.delete_state_locked(key, version, None).await
    }

    /// Delete while holding the lock identified by `lock_id`. A locked object
    /// refuses deletes that do not carry its lock ID.
    async fn delete_state_locked(
        &self,
        key: &StateObjectKey,
        version: Option<u64>,
        lock_id: Option<&str>,
    ) -> Result<()>;

    async fn acquire_lock(&self, key: &StateObjectKey, metadata: &LockMetadata) -> Result<LockHandle>;

    /// `metadata` is passed through for the backend's ownership check.
    async fn release_lock(&self, key: &StateObjectKey, metadata: &LockMetadata) -> Result<()>;
}
