//! Where a PostgreSQL lock session gets its connection from.

use sqlx::{Connection, PgConnection, PgPool};
use std::fmt;

/// Connection source for a PostgreSQL lock session.
///
/// Session-level advisory locks belong to the backend process serving the
/// connection, so every source ends up as one dedicated connection.
pub enum PostgresConnectionSource {
    /// Open a new connection from a connection string.
    ConnectionString(String),
    /// Take one connection out of an existing pool, detached from it.
    Pool(PgPool),
    /// Use an already open connection.
    Connection(PgConnection),
}

impl PostgresConnectionSource {
    /// Opens (or takes) the dedicated connection.
    pub async fn open(self) -> Result<PgConnection, sqlx::Error> {
        match self {
            Self::ConnectionString(url) => PgConnection::connect(&url).await,
            Self::Pool(pool) => Ok(pool.acquire().await?.detach()),
            Self::Connection(connection) => Ok(connection),
        }
    }
}

impl fmt::Debug for PostgresConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(_) => {
                write!(f, "PostgresConnectionSource::ConnectionString([REDACTED])")
            }
            Self::Pool(_) => write!(f, "PostgresConnectionSource::Pool([POOL])"),
            Self::Connection(_) => {
                write!(f, "PostgresConnectionSource::Connection([CONNECTION])")
            }
        }
    }
}
