//! In-memory driver for exercising the pools without a server.
//!
//! A [`MockBackend`] records every session it opens and closes and every
//! statement it sees, and lets a test script failures and results ahead of time.
//! Clones share state, so a test keeps one handle while the pool owns the
//! [`MockManager`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::session::{DriverError, ManageSession, NativeSession, QueryOutput};
use crate::taxonomy::{NativeError, NativeErrorClass};
use crate::types::RowValues;

#[derive(Debug, Default)]
struct MockState {
    next_session: u64,
    opened: Vec<u64>,
    closed: Vec<u64>,
    statements: Vec<String>,
    failures: VecDeque<NativeError>,
    results: VecDeque<QueryOutput>,
    connect_failures: VecDeque<NativeError>,
    connect_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn manager(&self) -> MockManager {
        MockManager {
            backend: self.clone(),
        }
    }

    /// Open a session directly, bypassing the manager.
    #[must_use]
    pub fn open_session(&self) -> MockSession {
        let mut state = self.state.lock();
        state.next_session += 1;
        let id = state.next_session;
        state.opened.push(id);
        MockSession {
            id,
            backend: self.clone(),
            autocommit: true,
            in_block: false,
            closed: false,
        }
    }

    /// The next statement, commit or rollback on any session fails with `err`.
    pub fn fail_next(&self, err: NativeError) {
        self.state.lock().failures.push_back(err);
    }

    /// The next connection attempt fails with `err`.
    pub fn fail_connect(&self, err: NativeError) {
        self.state.lock().connect_failures.push_back(err);
    }

    /// Every connection attempt takes this long.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// The next query on any session returns `output`.
    pub fn push_result(&self, output: QueryOutput) {
        self.state.lock().results.push_back(output);
    }

    /// Sessions opened so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Sessions opened and not yet closed.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        let state = self.state.lock();
        state.opened.len() - state.closed.len()
    }

    #[must_use]
    pub fn closed_sessions(&self) -> Vec<u64> {
        self.state.lock().closed.clone()
    }

    #[must_use]
    pub fn is_closed(&self, session: u64) -> bool {
        self.state.lock().closed.contains(&session)
    }

    /// Every statement seen, including transaction control.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    fn record(&self, statement: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.statements.push(statement.to_string());
        match state.failures.pop_front() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockManager {
    backend: MockBackend,
}

#[async_trait]
impl ManageSession for MockManager {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, DriverError> {
        let delay = self.backend.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.backend.state.lock().connect_failures.pop_front();
        if let Some(err) = failure {
            return Err(err.into());
        }
        Ok(self.backend.open_session())
    }
}

/// Session handed out by [`MockManager`]. Dropping it counts as closing it.
#[derive(Debug)]
pub struct MockSession {
    id: u64,
    backend: MockBackend,
    autocommit: bool,
    in_block: bool,
    closed: bool,
}

impl MockSession {
    /// Id of the physical session, as recorded by the backend.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while an implicit transaction is open.
    #[must_use]
    pub fn in_block(&self) -> bool {
        self.in_block
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(NativeError::new(NativeErrorClass::Interface, "connection already closed").into());
        }
        Ok(())
    }

    fn run(&mut self, sql: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        if !self.autocommit {
            self.in_block = true;
        }
        self.backend.record(sql)
    }
}

#[async_trait]
impl NativeSession for MockSession {
    async fn execute(&mut self, sql: &str, _params: &[RowValues]) -> Result<u64, DriverError> {
        self.run(sql)?;
        Ok(1)
    }

    async fn query(
        &mut self,
        sql: &str,
        _params: &[RowValues],
    ) -> Result<QueryOutput, DriverError> {
        self.run(sql)?;
        Ok(self.backend.state.lock().results.pop_front().unwrap_or_default())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, autocommit: bool) -> Result<(), DriverError> {
        self.ensure_open()?;
        if autocommit && self.in_block {
            return Err(NativeError::new(
                NativeErrorClass::Programming,
                "set_autocommit cannot be used inside a transaction",
            )
            .into());
        }
        self.autocommit = autocommit;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let was_open = std::mem::take(&mut self.in_block);
        if was_open {
            self.backend.record("COMMIT")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let was_open = std::mem::take(&mut self.in_block);
        if was_open {
            self.backend.record("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.in_block = false;
            self.backend.state.lock().closed.push(self.id);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.close();
    }
}
