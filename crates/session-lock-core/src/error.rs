//! Error types for lock session operations.

use std::fmt;
use thiserror::Error;

use crate::context::ContextError;

/// Boxed underlying cause carried by a [`LockError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The closed set of ways a lock session operation can fail.
///
/// Callers branch on this instead of matching message text. The enum is
/// `Copy` and carries no state, so it can be compared freely across threads.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockErrorKind {
    /// The wait budget ran out before the lock was acquired.
    #[error("timeout")]
    Timeout,

    /// The server refused the lock for a reason other than a timeout
    /// (e.g. it ran out of memory or the waiting thread was killed).
    #[error("failed to acquire lock")]
    AcquisitionFailed,

    /// Release was attempted on a key that has no holder.
    #[error("lock does not exist")]
    DoesNotExist,

    /// Release was attempted by a session that is not the holder.
    #[error("lock not owned")]
    NotOwned,

    /// The server answered with something other than a recognized signal.
    #[error("unknown error")]
    Unknown,

    /// The backend has no primitive for this operation.
    #[error("operation not implemented")]
    NotImplemented,

    /// The caller's deadline passed before or during the call.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled before or during the call.
    #[error("context canceled")]
    Cancelled,

    /// The database driver failed while the caller's context was still live.
    #[error("transport error")]
    Transport,

    /// The session's connection has been discarded.
    #[error("session closed")]
    SessionClosed,
}

impl LockErrorKind {
    /// Returns true when the caller's own context fired, as opposed to the
    /// lock wait budget running out.
    pub fn is_cancellation(self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<ContextError> for LockErrorKind {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// The operations of the lock session contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AcquireLock,
    ReleaseLock,
    IsLockAcquired,
    IsLockFree,
    ReleaseAllLocks,
}

impl Operation {
    /// Every operation, in contract order.
    pub const ALL: [Operation; 5] = [
        Operation::AcquireLock,
        Operation::ReleaseLock,
        Operation::IsLockAcquired,
        Operation::IsLockFree,
        Operation::ReleaseAllLocks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::AcquireLock => "AcquireLock",
            Operation::ReleaseLock => "ReleaseLock",
            Operation::IsLockAcquired => "IsLockAcquired",
            Operation::IsLockFree => "IsLockFree",
            Operation::ReleaseAllLocks => "ReleaseAllLocks",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by lock session operations.
///
/// Carries the backend, operation and session that produced it so that logs
/// from a fleet of workers can be attributed without extra context.
///
/// # Example
///
/// ```rust,ignore
/// match session.acquire_lock(&ctx, "jobs", WaitBudget::from_secs(1)).await {
///     Ok(()) => run_job().await,
///     Err(e) if e.kind() == LockErrorKind::Timeout => reschedule(),
///     Err(e) if e.is_cancellation() => return,
///     Err(e) => return Err(e.into()),
/// }
/// ```
#[derive(Error, Debug)]
#[error("{backend}::{operation}::{session}::{message}: {kind}")]
pub struct LockError {
    backend: &'static str,
    operation: Operation,
    session: String,
    message: String,
    kind: LockErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl LockError {
    pub fn new(
        backend: &'static str,
        operation: Operation,
        session: impl Into<String>,
        kind: LockErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            operation,
            session: session.into(),
            message: message.into(),
            kind,
            source: None,
        }
    }

    /// Builds the error for a call abandoned because the caller's context fired.
    pub fn from_context(
        backend: &'static str,
        operation: Operation,
        session: impl Into<String>,
        err: ContextError,
        stage: &str,
    ) -> Self {
        Self::new(
            backend,
            operation,
            session,
            err.into(),
            format!("{} while {}", err, stage),
        )
        .with_source(err)
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> LockErrorKind {
        self.kind
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// See [`LockErrorKind::is_cancellation`].
    pub fn is_cancellation(&self) -> bool {
        self.kind.is_cancellation()
    }
}

/// Result type for lock session operations.
pub type LockResult<T> = Result<T, LockError>;
