//! Cross-process mutual exclusion on top of database locks.
//!
//! Independent processes (workers, cron jobs, service replicas) agree on who
//! may act on a resource by asking the database they already share. Lock
//! state lives entirely in the database; a [`LockSession`] only translates
//! the uniform contract onto the backend's native primitives.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use session_lock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = MySqlLockSession::connect("worker-1", "mysql://root:pw@localhost/app").await?;
//!
//!     // Give up entirely after 10 seconds, whatever happens.
//!     let ctx = Context::background().with_timeout(Duration::from_secs(10));
//!
//!     // Wait at most 2 seconds for another worker to let go.
//!     session.acquire_lock(&ctx, "invoices", WaitBudget::from_secs(2)).await?;
//!
//!     // Critical section - no other session holds "invoices"
//!     println!("Doing critical work...");
//!
//!     session.release_lock(&ctx, "invoices").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! ## MySQL
//!
//! Named locks (`GET_LOCK`) keyed by strings. Supports every operation and
//! native wait timeouts.
//!
//! ## PostgreSQL
//!
//! Advisory locks keyed by `i64`. Bounded waits are emulated by polling
//! `pg_try_advisory_lock`; holder introspection is not available.
//!
//! | Operation | MySQL | PostgreSQL |
//! |---|---|---|
//! | `acquire_lock` | `GET_LOCK` | `pg_advisory_lock` / polled `pg_try_advisory_lock` |
//! | `release_lock` of an unheld key | `DoesNotExist` | `NotOwned` (not a no-op) |
//! | `is_lock_acquired`, `is_lock_free` | yes | `NotImplemented` |
//! | `release_all_locks` count | released count | always `0` |
//!
//! `pg_advisory_unlock` answers `false` both for a key held by another
//! session and for a key held by nobody, so PostgreSQL reports `NotOwned` for
//! both instead of treating the second case as a successful no-op.
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `session-lock-core`: contract, errors, context, wait coordinator
//! - `session-lock-mysql`: MySQL backend (feature `mysql`)
//! - `session-lock-postgres`: PostgreSQL backend (feature `postgres`)

// Re-export core types, traits and modules (including the wait coordinator)
pub use session_lock_core::*;

#[cfg(feature = "mysql")]
pub use session_lock_mysql::{MySqlConnectionSource, MySqlLockSession, MySqlLockSessionBuilder};

#[cfg(feature = "postgres")]
pub use session_lock_postgres::{
    advisory_key, PostgresConnectionSource, PostgresLockSession, PostgresLockSessionBuilder,
};
