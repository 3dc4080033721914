//! The seam between the pool and a native database driver.
//!
//! A driver plugs in by implementing [`NativeSession`] for its live connection
//! object and [`ManageSession`] for whatever knows how to open one. The wrapper in
//! [`crate::connection`] owns the session; the pools only ever create, recycle and
//! close it.

use std::borrow::Cow;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::SqlPoolError;
use crate::render::render_statement;
use crate::results::ColumnDesc;
use crate::taxonomy::NativeError;
use crate::types::RowValues;

/// Error returned by a native session.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An error from the driver's own hierarchy; it will be classified.
    #[error(transparent)]
    Native(#[from] NativeError),
    /// Anything else; passed through untouched.
    #[error(transparent)]
    Foreign(Box<dyn std::error::Error + Send + Sync>),
}

/// Columns plus raw row values, as produced by the driver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<Vec<RowValues>>,
}

/// One live native connection.
///
/// Autocommit follows DB-API semantics: with autocommit off the driver opens a
/// transaction implicitly before the next statement, and it stays open until
/// [`commit`](NativeSession::commit) or [`rollback`](NativeSession::rollback).
#[async_trait]
pub trait NativeSession: Send + Sync + 'static {
    /// Statement text with parameters inlined, used for the statement log.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::ParameterError`] when placeholders and parameters
    /// do not line up.
    fn render<'s>(&self, sql: &'s str, params: &[RowValues]) -> Result<Cow<'s, str>, SqlPoolError> {
        render_statement(sql, params)
    }

    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError>;

    /// Execute a statement once per parameter set.
    async fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[Vec<RowValues>],
    ) -> Result<u64, DriverError> {
        let mut total = 0;
        for params in param_sets {
            total += self.execute(sql, params).await?;
        }
        Ok(total)
    }

    /// Execute a statement and fetch every row.
    async fn query(&mut self, sql: &str, params: &[RowValues])
    -> Result<QueryOutput, DriverError>;

    fn autocommit(&self) -> bool;

    async fn set_autocommit(&mut self, autocommit: bool) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Close the session. Must be idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// Opens native sessions from opaque connection parameters.
#[async_trait]
pub trait ManageSession: Send + Sync + 'static {
    type Session: NativeSession;

    async fn connect(&self) -> Result<Self::Session, DriverError>;
}
