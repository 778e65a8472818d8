//! MySQL backend for lock sessions.
//!
//! Uses MySQL's user-level named locks (`GET_LOCK`, `RELEASE_LOCK`,
//! `IS_USED_LOCK`, `IS_FREE_LOCK`, `RELEASE_ALL_LOCKS`). Locks are keyed by
//! arbitrary strings and owned by the connection that took them.
//!
//! ```rust,ignore
//! use session_lock_core::prelude::*;
//! use session_lock_mysql::MySqlLockSession;
//!
//! let session = MySqlLockSession::connect("worker-1", "mysql://root:pw@localhost/app").await?;
//! let ctx = Context::background().with_timeout(Duration::from_secs(10));
//! session.acquire_lock(&ctx, "invoices", WaitBudget::from_secs(2)).await?;
//! ```

pub mod connection;
pub mod name;
pub mod session;

pub use connection::MySqlConnectionSource;
pub use session::{MySqlLockSession, MySqlLockSessionBuilder};
