//! State store trait definition.
//!
//! Commands talk to the record store through [`StateStore`]; the executor
//! only needs `save`, the CLI uses the lock operations.

use async_trait::async_trait;
use tracing::error;

use crate::error::Result;
use super::types::ProviderState;
use super::lock::LockInfo;

/// Persistent home of [`ProviderState`] and its lock.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the provider state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<ProviderState>>;

    /// Saves the provider state.
    async fn save(&self, state: &ProviderState) -> Result<()>;

    /// Deletes the provider state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires a lock on the state.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases a lock on the state.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of who holds it.
    async fn force_unlock(&self) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is locked.
    async fn is_locked(&self) -> Result<bool>;
}


/// Releases `lock_id` once a locked command has produced `result`.
///
/// A failed release is logged. It only becomes the returned error when the
/// command itself succeeded, so the command's own failure is never lost.
///
/// # Errors
///
/// Returns `result`'s error, or the release error if `result` was `Ok`.
pub async fn release_after<S, T>(store: &S, lock_id: &str, result: Result<T>) -> Result<T>
where
    S: StateStore + ?Sized,
{
    match store.release_lock(lock_id).await {
        Ok(()) => result,
        Err(e) => {
            error!("Failed to release state lock {lock_id}: {e}");
            Err(result.err().unwrap_or(e))
        }
    }
}
