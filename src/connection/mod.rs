//! The connection wrapper handed out by the pools.
//!
//! A [`Connection`] owns exactly one native session. Every driver call goes through
//! the error taxonomy: connection-fatal errors flag the handle invalid so the pool
//! discards it on release, warnings are logged and kept on the handle instead of
//! being returned, anything else is returned as is.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::error::SqlPoolError;
use crate::pool::core::Lease;
use crate::render::{bind_named, check_placeholders};
use crate::results::{QueryDetail, ResultSet};
use crate::session::{DriverError, NativeSession, QueryOutput};
use crate::taxonomy::{TaxonomyError, classify};
use crate::types::RowValues;

mod transaction;

pub use transaction::TxScope;

/// Target of the per-statement debug records.
pub const STATEMENT_TARGET: &str = "pg_pool_middleware::statement";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A uniquely owned handle around one native session.
///
/// Handles are not shared: the pool gives one out on acquire and takes it back,
/// by value, on release. Once released the caller no longer has it.
pub struct Connection<S: NativeSession> {
    session: S,
    id: u64,
    autocommit: bool,
    invalid: bool,
    debug: bool,
    rollback_pending: bool,
    warnings: Vec<TaxonomyError>,
    lease: Option<Lease>,
}

impl<S: NativeSession> Connection<S> {
    /// Wrap a session outside of any pool.
    ///
    /// The session's current autocommit mode becomes the default restored after
    /// every commit or rollback.
    #[must_use]
    pub fn new(session: S) -> Self {
        Self::wrap(session, false, None)
    }

    pub(crate) fn wrap(session: S, debug: bool, lease: Option<Lease>) -> Self {
        let autocommit = session.autocommit();
        Self {
            session,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            autocommit,
            invalid: false,
            debug,
            rollback_pending: false,
            warnings: Vec::new(),
            lease,
        }
    }

    /// Build the handle the pool keeps: same session, fresh state.
    pub(crate) fn recycle(self) -> Self {
        let Connection {
            session,
            id,
            autocommit,
            debug,
            lease,
            ..
        } = self;
        Connection {
            session,
            id,
            autocommit,
            invalid: false,
            debug,
            rollback_pending: false,
            warnings: Vec::new(),
            lease,
        }
    }

    /// Whether the pool may hand this handle out again.
    pub(crate) fn recyclable(&self) -> bool {
        !self.invalid && !self.rollback_pending && !self.is_closed() && !self.in_transaction()
    }

    /// Physical connection id; stays the same across recycling.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// True once a connection-fatal error was seen on this handle.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn set_invalid(&mut self) {
        self.invalid = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// True while autocommit is off, i.e. a transaction is open or will be opened
    /// by the next statement.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        !self.session.is_closed() && !self.session.autocommit()
    }

    /// Warnings reported by the driver since the handle was acquired.
    #[must_use]
    pub fn warnings(&self) -> &[TaxonomyError] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<TaxonomyError> {
        std::mem::take(&mut self.warnings)
    }

    /// Execute a statement that returns no rows.
    ///
    /// # Errors
    /// Returns the classified driver error, [`SqlPoolError::ParameterError`] when the
    /// parameters do not match the placeholders, or [`SqlPoolError::ConnectionClosed`].
    pub async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<(), SqlPoolError> {
        self.prepare_call().await?;
        check_placeholders(sql, params)?;
        self.log_statement(sql, params);
        let result = self.session.execute(sql, params).await;
        self.absorb(result).map(|_| ())
    }

    /// Execute a statement once per parameter set.
    ///
    /// # Errors
    /// Same as [`Connection::execute`].
    pub async fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[Vec<RowValues>],
    ) -> Result<(), SqlPoolError> {
        self.prepare_call().await?;
        if self.debug {
            debug!(
                target: STATEMENT_TARGET,
                connection = self.id,
                batch = param_sets.len(),
                "\n{sql}\n"
            );
        }
        let result = self.session.execute_many(sql, param_sets).await;
        self.absorb(result).map(|_| ())
    }

    /// Run a query and return every row, keyed by column name in column order.
    ///
    /// # Errors
    /// Same as [`Connection::execute`].
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlPoolError> {
        Ok(self.query_detail(sql, params).await?.rows)
    }

    /// Run a query and return the column descriptors along with the rows.
    ///
    /// # Errors
    /// Same as [`Connection::execute`].
    pub async fn query_detail(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryDetail, SqlPoolError> {
        self.prepare_call().await?;
        check_placeholders(sql, params)?;
        self.log_statement(sql, params);
        let result = self.session.query(sql, params).await;
        let output = self.absorb(result)?;
        Ok(build_detail(output))
    }

    /// [`Connection::execute`] with `:name` placeholders.
    ///
    /// # Errors
    /// Same as [`Connection::execute`], plus unknown parameter names.
    pub async fn execute_named(
        &mut self,
        sql: &str,
        params: &[(&str, RowValues)],
    ) -> Result<(), SqlPoolError> {
        let (sql, values) = bind_named(sql, params)?;
        self.execute(&sql, &values).await
    }

    /// [`Connection::query`] with `:name` placeholders.
    ///
    /// # Errors
    /// Same as [`Connection::query`], plus unknown parameter names.
    pub async fn query_named(
        &mut self,
        sql: &str,
        params: &[(&str, RowValues)],
    ) -> Result<ResultSet, SqlPoolError> {
        let (sql, values) = bind_named(sql, params)?;
        self.query(&sql, &values).await
    }

    /// Start a transaction by turning autocommit off.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::NestedTransaction`] if one is already active; the
    /// active transaction is left as it was.
    pub async fn begin(&mut self) -> Result<(), SqlPoolError> {
        self.prepare_call().await?;
        if self.in_transaction() {
            return Err(SqlPoolError::NestedTransaction);
        }
        let result = self.session.set_autocommit(false).await;
        self.absorb(result)
    }

    /// Commit and restore the default autocommit mode.
    ///
    /// # Errors
    /// Returns the classified driver error or [`SqlPoolError::ConnectionClosed`].
    pub async fn commit(&mut self) -> Result<(), SqlPoolError> {
        self.prepare_call().await?;
        let result = self.session.commit().await;
        self.absorb(result)?;
        self.restore_autocommit().await
    }

    /// Roll back and restore the default autocommit mode.
    ///
    /// # Errors
    /// Returns the classified driver error or [`SqlPoolError::ConnectionClosed`].
    pub async fn rollback(&mut self) -> Result<(), SqlPoolError> {
        self.ensure_open()?;
        self.rollback_pending = false;
        let result = self.session.rollback().await;
        self.absorb(result)?;
        self.restore_autocommit().await
    }

    /// Close the native session. Later calls fail with `ConnectionClosed`.
    pub fn close(&mut self) {
        if !self.session.is_closed() {
            debug!(connection = self.id, "closing connection");
        }
        self.session.close();
        self.lease.take();
    }

    async fn restore_autocommit(&mut self) -> Result<(), SqlPoolError> {
        if self.session.autocommit() == self.autocommit {
            return Ok(());
        }
        let result = self.session.set_autocommit(self.autocommit).await;
        self.absorb(result)
    }

    fn ensure_open(&mut self) -> Result<(), SqlPoolError> {
        if self.session.is_closed() {
            self.invalid = true;
            return Err(SqlPoolError::ConnectionClosed);
        }
        Ok(())
    }

    // Runs before every operation: an abandoned transaction scope is rolled back
    // before anything else touches the session.
    async fn prepare_call(&mut self) -> Result<(), SqlPoolError> {
        self.ensure_open()?;
        if self.rollback_pending {
            debug!(connection = self.id, "rolling back abandoned transaction");
            self.rollback().await?;
        }
        Ok(())
    }

    fn log_statement(&self, sql: &str, params: &[RowValues]) {
        if !self.debug {
            return;
        }
        match self.session.render(sql, params) {
            Ok(rendered) => {
                debug!(target: STATEMENT_TARGET, connection = self.id, "\n{rendered}\n");
            }
            Err(err) => {
                debug!(target: STATEMENT_TARGET, connection = self.id, render_error = %err, "\n{sql}\n");
            }
        }
    }

    fn absorb<T: Default>(&mut self, result: Result<T, DriverError>) -> Result<T, SqlPoolError> {
        match result {
            Ok(value) => Ok(value),
            Err(DriverError::Native(native)) => {
                let err = classify(native);
                if err.is_warning() {
                    warn!(connection = self.id, code = ?err.code(), "driver warning: {err}");
                    self.warnings.push(err);
                    return Ok(T::default());
                }
                error!(
                    connection = self.id,
                    kind = %err.kind(),
                    code = ?err.code(),
                    "driver error: {err}"
                );
                if err.connection_error() {
                    self.invalid = true;
                }
                Err(SqlPoolError::Db(err))
            }
            Err(DriverError::Foreign(err)) => Err(SqlPoolError::Unclassified(err)),
        }
    }

    pub(crate) fn set_rollback_pending(&mut self) {
        self.rollback_pending = true;
    }
}

impl<S: NativeSession> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("invalid", &self.invalid)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

fn build_detail(output: QueryOutput) -> QueryDetail {
    let QueryOutput { columns, rows } = output;
    let names: Vec<String> = columns.iter().map(|col| col.name.clone()).collect();
    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(std::sync::Arc::new(names));
    for row in rows {
        result_set.add_row_values(row);
    }
    QueryDetail {
        columns,
        rows: result_set,
    }
}
