use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::core::{CreationSlot, PoolCore};
use super::{ConnectionPool, PoolConfig, PoolStatus};
use crate::connection::Connection;
use crate::error::SqlPoolError;
use crate::session::ManageSession;

/// Pool whose `acquire` suspends until a connection is free.
///
/// Connections are opened by background tasks (at most
/// [`PoolConfig::max_concurrent_creates`] at once) and handed to waiters through
/// the idle stack. Waiters are woken when a connection is released, a creation
/// slot frees up or the pool is destroyed, and otherwise re-check every
/// [`PoolConfig::acquire_poll_interval`]. With a non-zero
/// [`PoolConfig::sweep_period`] a background task closes connections idle for
/// longer than [`PoolConfig::alive_timeout`].
///
/// Must be created inside a Tokio runtime. Cloning shares the same pool.
pub struct CooperativePool<M: ManageSession> {
    inner: Arc<CoopInner<M>>,
}

struct CoopInner<M: ManageSession> {
    core: PoolCore<M>,
    shutdown: CancellationToken,
    destroyed: AtomicBool,
    creators: TaskTracker,
    create_permits: Arc<Semaphore>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<M: ManageSession> CooperativePool<M> {
    /// Create the pool and start the idle sweep if one is configured.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` if the configuration is invalid or no
    /// Tokio runtime is running.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, SqlPoolError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SqlPoolError::ConfigError(format!("cooperative pool needs a tokio runtime: {e}"))
        })?;
        let sweep_period = config.sweep_period;
        let inner = Arc::new(CoopInner {
            create_permits: Arc::new(Semaphore::new(config.create_limit())),
            core: PoolCore::new(manager, config),
            shutdown: CancellationToken::new(),
            destroyed: AtomicBool::new(false),
            creators: TaskTracker::new(),
            sweeper: Mutex::new(None),
        });
        if !sweep_period.is_zero() {
            let handle = runtime.spawn(sweep_loop(
                Arc::downgrade(&inner),
                inner.shutdown.clone(),
                sweep_period,
            ));
            *inner.sweeper.lock() = Some(handle);
        }
        Ok(Self { inner })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.core.config
    }

    /// Run one idle sweep now. Returns how many connections were closed.
    pub fn sweep_idle(&self) -> usize {
        self.inner.core.evict_idle()
    }

    fn spawn_create(&self, slot: CreationSlot) {
        let inner = Arc::clone(&self.inner);
        self.inner.creators.spawn(async move {
            let permits = Arc::clone(&inner.create_permits);
            let _permit = tokio::select! {
                biased;
                () = inner.shutdown.cancelled() => return,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            let created = tokio::select! {
                biased;
                () = inner.shutdown.cancelled() => {
                    debug!("connection attempt abandoned on shutdown");
                    return;
                }
                created = inner.core.connect() => created,
            };
            match created {
                Ok(session) => {
                    let conn = inner.core.adopt(slot, session);
                    inner.release(conn);
                }
                Err(_) => {
                    // Hold the slot for one poll interval so waiters do not
                    // retry a failing connect in a tight loop.
                    tokio::select! {
                        biased;
                        () = inner.shutdown.cancelled() => {}
                        () = sleep(inner.core.config.acquire_poll_interval) => {}
                    }
                    drop(slot);
                }
            }
        });
    }
}

impl<M: ManageSession> CoopInner<M> {
    fn release(&self, mut conn: Connection<M::Session>) {
        if self.shutdown.is_cancelled() {
            conn.close();
            return;
        }
        self.core.put(conn);
    }
}

async fn sweep_loop<M: ManageSession>(
    pool: Weak<CoopInner<M>>,
    shutdown: CancellationToken,
    period: Duration,
) {
    debug!(period = ?period, "idle sweep started");
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = sleep(period) => {}
        }
        let Some(pool) = pool.upgrade() else { break };
        pool.core.evict_idle();
    }
    debug!("idle sweep stopped");
}

impl<M: ManageSession> Clone for CooperativePool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageSession> fmt::Debug for CooperativePool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativePool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M: ManageSession> ConnectionPool for CooperativePool<M> {
    type Session = M::Session;

    async fn acquire(&self) -> Result<Connection<M::Session>, SqlPoolError> {
        let inner = &self.inner;
        let poll_interval = inner.core.config.acquire_poll_interval;
        let timeout = inner.core.config.acquire_timeout;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Register for the broadcast before looking, so a release between
            // the check and the wait is not missed.
            let released = inner.core.tally.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if inner.shutdown.is_cancelled() {
                return Err(SqlPoolError::PoolClosed);
            }
            if let Some(conn) = inner.core.pop_idle() {
                return Ok(conn);
            }
            if let Some(slot) = inner.core.reserve_creation() {
                self.spawn_create(slot);
            }

            let mut wake_at = Instant::now() + poll_interval;
            if let Some(deadline) = deadline {
                wake_at = wake_at.min(deadline);
            }
            tokio::select! {
                () = inner.shutdown.cancelled() => return Err(SqlPoolError::PoolClosed),
                () = &mut released => {}
                () = sleep_until(wake_at) => {}
            }

            if let (Some(deadline), Some(timeout)) = (deadline, timeout)
                && Instant::now() >= deadline
            {
                if let Some(conn) = inner.core.pop_idle() {
                    return Ok(conn);
                }
                return Err(SqlPoolError::AcquireTimeout(timeout));
            }
        }
    }

    fn release(&self, conn: Connection<M::Session>) {
        self.inner.release(conn);
    }

    async fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.shutdown.cancel();
        inner.core.tally.released.notify_waiters();

        let sweeper = inner.sweeper.lock().take();
        if let Some(handle) = sweeper
            && let Err(e) = handle.await
        {
            warn!("idle sweep task ended abnormally: {e}");
        }

        inner.creators.close();
        inner.creators.wait().await;

        let idle = inner.core.drain();
        let closed = idle.len();
        for mut conn in idle {
            conn.close();
        }
        info!(closed, "connection pool destroyed");
    }

    fn status(&self) -> PoolStatus {
        self.inner.core.status(self.inner.shutdown.is_cancelled())
    }
}
