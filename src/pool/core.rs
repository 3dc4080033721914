//! State shared by both pool variants.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::PoolStatus;
use super::config::PoolConfig;
use super::idle::IdleStack;
use crate::connection::Connection;
use crate::error::SqlPoolError;
use crate::session::{DriverError, ManageSession, NativeSession};
use crate::taxonomy::classify;

/// Live and in-creation counts, plus the broadcast fired whenever either drops
/// or a connection is released.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    live: AtomicUsize,
    creating: AtomicUsize,
    pub(crate) released: Notify,
}

impl Tally {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn creating(&self) -> usize {
        self.creating.load(Ordering::SeqCst)
    }
}

/// Held by every pooled connection; dropping it frees a slot.
#[derive(Debug)]
pub(crate) struct Lease {
    tally: Arc<Tally>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.tally.live.fetch_sub(1, Ordering::SeqCst);
        self.tally.released.notify_waiters();
    }
}

/// A reserved creation slot. Dropped without [`CreationSlot::adopt`] it gives the
/// slot back, so a failed or cancelled connect never leaks capacity.
#[derive(Debug)]
pub(crate) struct CreationSlot {
    tally: Arc<Tally>,
}

impl CreationSlot {
    /// Turn the slot into a lease for a freshly opened session.
    fn adopt(self) -> Lease {
        // live goes up before creating goes down so the total never dips
        self.tally.live.fetch_add(1, Ordering::SeqCst);
        Lease {
            tally: Arc::clone(&self.tally),
        }
    }
}

impl Drop for CreationSlot {
    fn drop(&mut self) {
        self.tally.creating.fetch_sub(1, Ordering::SeqCst);
        self.tally.released.notify_waiters();
    }
}

pub(crate) struct PoolCore<M: ManageSession> {
    manager: M,
    pub(crate) config: PoolConfig,
    idle: Mutex<IdleStack<M::Session>>,
    pub(crate) tally: Arc<Tally>,
}

impl<M: ManageSession> PoolCore<M> {
    pub(crate) fn new(manager: M, config: PoolConfig) -> Self {
        Self {
            manager,
            config,
            idle: Mutex::new(IdleStack::new()),
            tally: Arc::new(Tally::default()),
        }
    }

    pub(crate) fn pop_idle(&self) -> Option<Connection<M::Session>> {
        self.idle.lock().pop()
    }

    /// Reserve room for one more connection, if live plus creating is under the cap.
    pub(crate) fn reserve_creation(&self) -> Option<CreationSlot> {
        let _idle = self.idle.lock();
        let total = self.tally.live() + self.tally.creating();
        if total >= self.config.max_conn {
            return None;
        }
        self.tally.creating.fetch_add(1, Ordering::SeqCst);
        Some(CreationSlot {
            tally: Arc::clone(&self.tally),
        })
    }

    /// Open a native session through the manager.
    pub(crate) async fn connect(&self) -> Result<M::Session, SqlPoolError> {
        match self.manager.connect().await {
            Ok(session) => Ok(session),
            Err(err) => {
                let err = match err {
                    DriverError::Native(native) => SqlPoolError::Db(classify(native)),
                    DriverError::Foreign(other) => SqlPoolError::Unclassified(other),
                };
                error!("failed to open connection: {err}");
                Err(err)
            }
        }
    }

    /// Wrap a freshly opened session, consuming its creation slot.
    pub(crate) fn adopt(&self, slot: CreationSlot, session: M::Session) -> Connection<M::Session> {
        let conn = Connection::wrap(session, self.config.debug, Some(slot.adopt()));
        debug!(connection = conn.id(), "opened connection");
        conn
    }

    /// Take a connection back: recycle it onto the idle stack or close it.
    ///
    /// The closed check happens under the idle lock, so a release racing
    /// [`PoolCore::drain`] either lands before the drain or is closed here.
    pub(crate) fn put(&self, mut conn: Connection<M::Session>) {
        let mut pool_closed = false;
        if conn.recyclable() {
            let mut idle = self.idle.lock();
            // a drained stack is empty, so a closed pool always reaches the push
            if idle.len() < self.config.max_conn {
                match idle.push(conn.recycle(), Instant::now()) {
                    Ok(()) => {
                        drop(idle);
                        self.tally.released.notify_waiters();
                        return;
                    }
                    Err(refused) => {
                        conn = refused;
                        pool_closed = true;
                    }
                }
            }
        }
        discard(&mut conn, pool_closed);
        self.tally.released.notify_waiters();
    }


    pub(crate) fn drain(&self) -> Vec<Connection<M::Session>> {
        self.idle.lock().drain()
    }

    /// Close every idle connection older than the configured alive timeout.
    pub(crate) fn evict_idle(&self) -> usize {
        let expired = self
            .idle
            .lock()
            .evict_idle(Instant::now(), self.config.alive_timeout);
        let count = expired.len();
        for mut conn in expired {
            debug!(connection = conn.id(), "closing idle connection");
            conn.close();
        }
        if count > 0 {
            info!(closed = count, "swept idle connections");
        }
        count
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    pub(crate) fn status(&self, closed: bool) -> PoolStatus {
        let idle = self.idle_len();
        let live = self.tally.live();
        PoolStatus {
            idle,
            in_use: live.saturating_sub(idle),
            creating: self.tally.creating(),
            max: self.config.max_conn,
            closed,
        }
    }
}

fn discard<S: NativeSession>(conn: &mut Connection<S>, pool_closed: bool) {
    let reason = if pool_closed {
        "pool destroyed"
    } else if conn.is_closed() {
        "closed"
    } else if conn.is_invalid() {
        "invalid"
    } else if conn.in_transaction() {
        "transaction left open"
    } else {
        "idle stack full"
    };
    debug!(connection = conn.id(), reason, "discarding connection");
    conn.close();
}
