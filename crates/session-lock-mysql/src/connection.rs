//! Where a MySQL lock session gets its connection from.

use sqlx::{Connection, MySqlConnection, MySqlPool};
use std::fmt;

/// Connection source for a MySQL lock session.
///
/// Named locks belong to the connection that took them, so every source ends
/// up as one dedicated connection that the session keeps for its lifetime.
pub enum MySqlConnectionSource {
    /// Open a new connection from a connection string.
    ConnectionString(String),
    /// Take one connection out of an existing pool.
    ///
    /// The connection is detached and never returned to the pool, so locks
    /// cannot leak to another pool user.
    Pool(MySqlPool),
    /// Use an already open connection.
    Connection(MySqlConnection),
}

impl MySqlConnectionSource {
    /// Opens (or takes) the dedicated connection.
    pub async fn open(self) -> Result<MySqlConnection, sqlx::Error> {
        match self {
            Self::ConnectionString(url) => MySqlConnection::connect(&url).await,
            Self::Pool(pool) => Ok(pool.acquire().await?.detach()),
            Self::Connection(connection) => Ok(connection),
        }
    }
}

impl fmt::Debug for MySqlConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(_) => {
                write!(f, "MySqlConnectionSource::ConnectionString([REDACTED])")
            }
            Self::Pool(_) => write!(f, "MySqlConnectionSource::Pool([POOL])"),
            Self::Connection(_) => write!(f, "MySqlConnectionSource::Connection([CONNECTION])"),
        }
    }
}
