//! Bounded connection pools.
//!
//! Two variants share one contract ([`ConnectionPool`]):
//!
//! - [`LockedPool`] serialises bookkeeping behind a lock and never waits: when
//!   nothing is idle and the pool is at capacity, `acquire` fails with
//!   [`SqlPoolError::MaxConnectionsReached`].
//! - [`CooperativePool`] suspends the caller instead, creates connections in the
//!   background, sweeps idle ones on a timer and can be destroyed while callers
//!   are waiting.
//!
//! In both, live plus in-creation connections never exceed `max_conn`, idle
//! connections are handed out most recently released first, and a connection
//! that is invalid, closed or still inside a transaction is closed on release
//! rather than recycled.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::SqlPoolError;
use crate::session::NativeSession;

pub mod config;
pub(crate) mod core;
pub mod cooperative;
pub mod guard;
mod idle;
pub mod locked;

pub use config::PoolConfig;
pub use cooperative::CooperativePool;
pub use guard::{PooledConnection, with_connection};
pub use locked::LockedPool;

/// Point-in-time counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting on the idle stack.
    pub idle: usize,
    /// Connections handed out and not yet released.
    pub in_use: usize,
    /// Connection attempts in flight.
    pub creating: usize,
    pub max: usize,
    pub closed: bool,
}

impl PoolStatus {
    /// Live connections, idle or in use.
    #[must_use]
    pub fn live(&self) -> usize {
        self.idle + self.in_use
    }
}

#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Session: NativeSession;

    /// Hand out an idle connection or open a new one.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::PoolClosed`] after `destroy`, or the variant's
    /// capacity error.
    async fn acquire(&self) -> Result<Connection<Self::Session>, SqlPoolError>;

    /// Give a connection back. Never fails; unusable connections are closed.
    fn release(&self, conn: Connection<Self::Session>);

    /// Close every idle connection and refuse further acquisition. Idempotent.
    async fn destroy(&self);

    fn status(&self) -> PoolStatus;

    fn idle_len(&self) -> usize {
        self.status().idle
    }

    /// Acquire a connection that goes back to the pool when dropped.
    ///
    /// # Errors
    /// Same as [`ConnectionPool::acquire`].
    async fn get<'p>(&'p self) -> Result<PooledConnection<'p, Self>, SqlPoolError>
    where
        Self: Sized,
    {
        let conn = self.acquire().await?;
        Ok(PooledConnection::new(self, conn))
    }
}
