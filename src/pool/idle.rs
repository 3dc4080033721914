use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::Connection;
use crate::session::NativeSession;

/// LIFO stack of idle connections plus the instant each one went idle.
///
/// Once drained the stack is closed for good and refuses new members.
pub(crate) struct IdleStack<S: NativeSession> {
    members: Vec<Connection<S>>,
    idle_since: HashMap<u64, Instant>,
    closed: bool,
}

impl<S: NativeSession> IdleStack<S> {
    pub(crate) fn new() -> Self {
        Self {
            members: Vec::new(),
            idle_since: HashMap::new(),
            closed: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Hands the connection back if the stack is closed.
    pub(crate) fn push(&mut self, conn: Connection<S>, now: Instant) -> Result<(), Connection<S>> {
        if self.closed {
            return Err(conn);
        }
        self.idle_since.insert(conn.id(), now);
        self.members.push(conn);
        Ok(())
    }

    /// Most recently released connection first.
    pub(crate) fn pop(&mut self) -> Option<Connection<S>> {
        let conn = self.members.pop()?;
        self.idle_since.remove(&conn.id());
        Some(conn)
    }

    pub(crate) fn drain(&mut self) -> Vec<Connection<S>> {
        self.closed = true;
        self.idle_since.clear();
        std::mem::take(&mut self.members)
    }

    /// Remove every connection idle for longer than `alive_timeout`.
    ///
    /// The survivors keep their relative order.
    pub(crate) fn evict_idle(&mut self, now: Instant, alive_timeout: Duration) -> Vec<Connection<S>> {
        let members = std::mem::take(&mut self.members);
        let mut expired = Vec::new();
        for conn in members {
            let stale = self
                .idle_since
                .get(&conn.id())
                .is_none_or(|since| now.saturating_duration_since(*since) > alive_timeout);
            if stale {
                self.idle_since.remove(&conn.id());
                expired.push(conn);
            } else {
                self.members.push(conn);
            }
        }
        expired
    }
}
