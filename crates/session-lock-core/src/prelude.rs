//! Convenience prelude for lock session types.

pub use crate::budget::WaitBudget;
pub use crate::context::{Canceller, Context, ContextError};
pub use crate::error::{LockError, LockErrorKind, LockResult, Operation};
pub use crate::traits::{LockSession, LockSessionExt};
