use std::ops::{Deref, DerefMut};

use futures_util::future::BoxFuture;
use tracing::warn;

use super::Connection;
use crate::error::SqlPoolError;
use crate::session::NativeSession;

/// An open transaction on a borrowed connection.
///
/// Finish it with [`TxScope::commit`] or [`TxScope::rollback`]. A scope dropped
/// without either (early return, panic, cancelled future) marks the connection so
/// its next operation rolls the transaction back first, and the pool refuses to
/// recycle it in that state.
pub struct TxScope<'c, S: NativeSession> {
    conn: &'c mut Connection<S>,
    finished: bool,
}

impl<S: NativeSession> TxScope<'_, S> {
    /// Commit the transaction.
    ///
    /// # Errors
    /// On failure the scope counts as abandoned and the transaction is rolled
    /// back before the connection is used again.
    pub async fn commit(mut self) -> Result<(), SqlPoolError> {
        let result = self.conn.commit().await;
        self.finished = result.is_ok();
        result
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    /// Same as [`TxScope::commit`].
    pub async fn rollback(mut self) -> Result<(), SqlPoolError> {
        let result = self.conn.rollback().await;
        self.finished = result.is_ok();
        result
    }
}

impl<S: NativeSession> Deref for TxScope<'_, S> {
    type Target = Connection<S>;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl<S: NativeSession> DerefMut for TxScope<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
    }
}

impl<S: NativeSession> Drop for TxScope<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.set_rollback_pending();
        }
    }
}

impl<S: NativeSession> Connection<S> {
    /// Open a transaction scope.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::NestedTransaction`] if a transaction is already
    /// active on this connection.
    pub async fn begin_scope(&mut self) -> Result<TxScope<'_, S>, SqlPoolError> {
        self.begin().await?;
        Ok(TxScope {
            conn: self,
            finished: false,
        })
    }

    /// Run `f` inside a transaction: commit when it returns `Ok`, roll back when
    /// it returns `Err`.
    ///
    /// ```rust,no_run
    /// # use pg_pool_middleware::prelude::*;
    /// # async fn demo(conn: &mut Connection<PgSession>) -> Result<(), SqlPoolError> {
    /// conn.transaction(|tx| {
    ///     Box::pin(async move {
    ///         tx.execute("insert into t (id) values ($1)", &[RowValues::Int(1)]).await?;
    ///         tx.execute("insert into t (id) values ($1)", &[RowValues::Int(2)]).await
    ///     })
    /// })
    /// .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the error from `f`, or from begin/commit. A failing rollback after
    /// `f` errored is logged and the error from `f` is returned.
    pub async fn transaction<T, F>(&mut self, f: F) -> Result<T, SqlPoolError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Connection<S>) -> BoxFuture<'t, Result<T, SqlPoolError>>
            + Send,
    {
        let mut scope = self.begin_scope().await?;
        match f(&mut *scope).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback().await {
                    warn!("rollback after failed transaction body also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}
