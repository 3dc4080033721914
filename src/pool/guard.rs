use std::fmt;
use std::ops::{Deref, DerefMut};

use futures_util::future::BoxFuture;

use super::ConnectionPool;
use crate::connection::Connection;
use crate::error::SqlPoolError;

/// A connection checked out for the lifetime of this guard.
///
/// Dropping the guard releases the connection on every exit path, including
/// errors, panics and cancelled futures.
pub struct PooledConnection<'p, P: ConnectionPool> {
    pool: &'p P,
    conn: Option<Connection<P::Session>>,
}

impl<'p, P: ConnectionPool> PooledConnection<'p, P> {
    pub(crate) fn new(pool: &'p P, conn: Connection<P::Session>) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    /// Keep the connection past the guard; the caller must release it.
    #[must_use]
    pub fn detach(mut self) -> Connection<P::Session> {
        self.conn.take().expect("connection present until drop")
    }
}

impl<P: ConnectionPool> Deref for PooledConnection<'_, P> {
    type Target = Connection<P::Session>;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<P: ConnectionPool> DerefMut for PooledConnection<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<P: ConnectionPool> Drop for PooledConnection<'_, P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl<P: ConnectionPool> fmt::Debug for PooledConnection<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

/// Run `f` with a connection from `pool`, releasing it however `f` ends.
///
/// ```rust
/// use pg_pool_middleware::prelude::*;
/// use pg_pool_middleware::test_utils::mock::MockBackend;
///
/// # tokio_test_block(async {
/// let backend = MockBackend::new();
/// let pool = LockedPool::new(backend.manager(), PoolConfig::new())?;
/// let rows = with_connection(&pool, |conn| {
///     Box::pin(async move { conn.query("select 1", &[]).await })
/// })
/// .await?;
/// assert!(rows.is_empty());
/// assert_eq!(pool.idle_len(), 1);
/// # Ok::<(), SqlPoolError>(())
/// # }).unwrap();
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
///
/// # Errors
/// Returns the acquisition error or whatever `f` returns.
pub async fn with_connection<P, T, F>(pool: &P, f: F) -> Result<T, SqlPoolError>
where
    P: ConnectionPool,
    F: for<'c> FnOnce(&'c mut Connection<P::Session>) -> BoxFuture<'c, Result<T, SqlPoolError>>,
{
    let mut conn = pool.get().await?;
    f(&mut *conn).await
}
