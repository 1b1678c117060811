//! Scoped lock acquisition
//!
//! Every successful acquire is paired with exactly one release, whatever way
//! the guarded work ends.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use statehub_common::{LockMetadata, Result, StateObjectKey};

use crate::transport::StateTransport;

/// Terraform-style lock info: a fresh `ID` plus who/what/when.
pub fn lock_info(operation: &str, who: &str) -> LockMetadata {
    LockMetadata::new()
        .with("ID", uuid::Uuid::new_v4().to_string())
        .with("Operation", operation)
        .with("Who", who)
        .with("Version", statehub_common::VERSION)
        .with("Created", chrono::Utc::now().to_rfc3339())
}

/// Hold the lock on `key` while `work` runs, then release it.
///
/// The release happens after `Ok`, after `Err` and after a panic (which is
/// resumed once the lock is released). When both the work and the release
/// fail, the work's error is returned and the release failure is logged.
pub async fn with_lock<T, F, Fut, R>(
    transport: &T,
    key: &StateObjectKey,
    metadata: &LockMetadata,
    work: F,
) -> Result<R>
where
    T: StateTransport + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    transport.acquire_lock(key, metadata).await?;
    info!("acquired lock on {}", key);

    let outcome = AssertUnwindSafe(async move { work().await }).catch_unwind().await;
    let released = transport.release_lock(key, metadata).await;
    if released.is_ok() {
        info!("released lock on {}", key);
    }

    match outcome {
        Err(panic) => {
            if let Err(e) = &released {
                warn!("failed to release lock on {} after panic: {}", key, e);
            }
            std::panic::resume_unwind(panic)
        }
        Ok(Ok(value)) => released.map(|_| value),
        Ok(Err(e)) => {
            if let Err(release_err) = released {
                warn!("failed to release lock on {}: {}", key, release_err);
            }
            Err(e)
        }
    }
}
