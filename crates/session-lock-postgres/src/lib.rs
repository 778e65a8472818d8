//! PostgreSQL backend for lock sessions.
//!
//! Uses session-level advisory locks (`pg_advisory_lock`,
//! `pg_try_advisory_lock`, `pg_advisory_unlock`, `pg_advisory_unlock_all`).
//! Keys are 64-bit integers; bounded waits are emulated by polling.

pub mod connection;
pub mod key;
pub mod session;

pub use connection::PostgresConnectionSource;
pub use key::advisory_key;
pub use session::{PostgresLockSession, PostgresLockSessionBuilder};
