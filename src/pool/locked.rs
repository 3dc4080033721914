use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::core::PoolCore;
use super::{ConnectionPool, PoolConfig, PoolStatus};
use crate::connection::Connection;
use crate::error::SqlPoolError;
use crate::session::ManageSession;

/// Pool that never waits for capacity.
///
/// Bookkeeping sits behind a short lock; opening a connection happens outside it.
/// Cloning shares the same pool.
pub struct LockedPool<M: ManageSession> {
    inner: Arc<LockedInner<M>>,
}

struct LockedInner<M: ManageSession> {
    core: PoolCore<M>,
    closed: AtomicBool,
}

impl<M: ManageSession> LockedPool<M> {
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the configuration is invalid.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, SqlPoolError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(LockedInner {
                core: PoolCore::new(manager, config),
                closed: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.core.config
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<M: ManageSession> Clone for LockedPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageSession> fmt::Debug for LockedPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedPool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: ManageSession> ConnectionPool for LockedPool<M> {
    type Session = M::Session;

    async fn acquire(&self) -> Result<Connection<M::Session>, SqlPoolError> {
        if self.is_closed() {
            return Err(SqlPoolError::PoolClosed);
        }
        let core = &self.inner.core;
        if let Some(conn) = core.pop_idle() {
            return Ok(conn);
        }
        let slot = core
            .reserve_creation()
            .ok_or(SqlPoolError::MaxConnectionsReached {
                max: core.config.max_conn,
            })?;
        let session = core.connect().await?;
        Ok(core.adopt(slot, session))
    }

    fn release(&self, mut conn: Connection<M::Session>) {
        if self.is_closed() {
            conn.close();
            return;
        }
        self.inner.core.put(conn);
    }

    async fn destroy(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let idle = self.inner.core.drain();
        let closed = idle.len();
        for mut conn in idle {
            conn.close();
        }
        info!(closed, "connection pool destroyed");
    }

    fn status(&self) -> PoolStatus {
        self.inner.core.status(self.is_closed())
    }
}
