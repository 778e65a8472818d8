//! Core contract for database-backed lock sessions.
//!
//! Backends implement [`LockSession`] over one database connection. This
//! crate holds what they share: the error taxonomy, the caller's
//! cancellation [`Context`], the [`WaitBudget`], and the poll coordinator
//! used by backends without a native wait timeout.

pub mod budget;
pub mod context;
pub mod error;
pub mod prelude;
pub mod traits;
pub mod wait;

pub use error::{LockError, LockErrorKind, LockResult};
pub use prelude::*;
