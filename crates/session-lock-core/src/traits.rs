//! The lock session contract shared by every backend.

use std::future::Future;

use crate::budget::WaitBudget;
use crate::context::Context;
use crate::error::{LockResult, Operation};

// ============================================================================
// Lock Session Trait
// ============================================================================

/// A named actor issuing lock operations over one database connection.
///
/// The session does not remember which keys it holds; the database is the
/// only source of truth. Ownership is tied to the underlying connection, so
/// closing the connection frees every lock the session held.
///
/// Operations are request/response. A session does not serialize calls for
/// its callers: concurrent operations on overlapping keys should go through
/// separate sessions.
///
/// # Example
///
/// ```rust,ignore
/// use session_lock_core::prelude::*;
///
/// async fn nightly<S: LockSession<Key = str>>(session: &S) -> LockResult<()> {
///     let ctx = Context::background().with_timeout(Duration::from_secs(30));
///     session.acquire_lock(&ctx, "nightly-report", WaitBudget::from_secs(5)).await?;
///     build_report().await;
///     session.release_lock(&ctx, "nightly-report").await
/// }
/// ```
pub trait LockSession: Send + Sync {
    /// The lock key type the backend understands.
    type Key: ?Sized + Sync;

    /// Diagnostic label of this session. Not a uniqueness key.
    fn name(&self) -> &str;

    /// Short backend identifier used in errors and spans.
    fn backend(&self) -> &'static str;

    /// Returns whether the backend has a native primitive for `operation`.
    ///
    /// Unsupported operations fail with
    /// [`LockErrorKind::NotImplemented`](crate::error::LockErrorKind::NotImplemented).
    fn supports(&self, _operation: Operation) -> bool {
        true
    }

    /// Acquires `key`, waiting at most `wait`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The lock is held by this session
    /// * `Err(Timeout)` - The wait budget ran out
    /// * `Err(AcquisitionFailed)` - The server refused for another reason
    /// * `Err(Cancelled | DeadlineExceeded)` - `ctx` fired first
    fn acquire_lock(
        &self,
        ctx: &Context,
        key: &Self::Key,
        wait: WaitBudget,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Releases `key`.
    ///
    /// Fails with `NotOwned` when another session holds it. Releasing a key
    /// nobody holds is `DoesNotExist` on MySQL. On PostgreSQL it is also
    /// `NotOwned` rather than a silent no-op, because `pg_advisory_unlock`
    /// cannot tell "held by someone else" from "held by nobody".
    fn release_lock(
        &self,
        ctx: &Context,
        key: &Self::Key,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Returns whether any session currently holds `key`.
    fn is_lock_acquired(
        &self,
        ctx: &Context,
        key: &Self::Key,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Returns whether `key` is free to acquire.
    fn is_lock_free(
        &self,
        ctx: &Context,
        key: &Self::Key,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Releases every lock held by this session's connection and returns how
    /// many were released, when the backend reports it.
    fn release_all_locks(&self, ctx: &Context) -> impl Future<Output = LockResult<u64>> + Send;
}

// ============================================================================
// Convenience Extensions
// ============================================================================

/// Extension trait providing convenience methods for lock sessions.
pub trait LockSessionExt: LockSession {
    /// Runs `critical` while holding `key`.
    ///
    /// The release always runs on a background context, so a caller context
    /// that expires during `critical` does not leave the lock behind. A failed
    /// release is returned in place of `critical`'s output.
    fn with_lock<F, Fut, T>(
        &self,
        ctx: &Context,
        key: &Self::Key,
        wait: WaitBudget,
        critical: F,
    ) -> impl Future<Output = LockResult<T>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        async move {
            self.acquire_lock(ctx, key, wait).await?;
            let output = critical().await;
            self.release_lock(&Context::background(), key).await?;
            Ok(output)
        }
    }
}

// Blanket implementation for all LockSessions
impl<T: LockSession + ?Sized> LockSessionExt for T {}
