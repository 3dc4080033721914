use async_trait::async_trait;
use tokio_postgres::Client;

use super::error::{closed_session, native_error};
use super::params::as_refs;
use super::query::build_output;
use crate::session::{DriverError, NativeSession, QueryOutput};
use crate::taxonomy::{NativeError, NativeErrorClass};
use crate::types::RowValues;

/// A live `tokio_postgres` client.
///
/// The wire protocol has no autocommit switch, so it is kept here: with
/// autocommit off the first statement sends `BEGIN` and the block stays open until
/// `commit` or `rollback`. Dropping the session drops the client, which closes the
/// connection.
pub struct PgSession {
    client: Option<Client>,
    autocommit: bool,
    in_block: bool,
}

impl PgSession {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client: Some(client),
            autocommit: true,
            in_block: false,
        }
    }

    /// The underlying client, if the session is still open.
    #[must_use]
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    async fn ready(&mut self) -> Result<&Client, DriverError> {
        let needs_begin = !self.autocommit && !self.in_block;
        let client = self.client.as_ref().ok_or_else(closed_session)?;
        if needs_begin {
            client.batch_execute("BEGIN").await.map_err(native_error)?;
            self.in_block = true;
        }
        Ok(client)
    }

    async fn end_block(&mut self, command: &str) -> Result<(), DriverError> {
        let client = self.client.as_ref().ok_or_else(closed_session)?;
        if !self.in_block {
            return Ok(());
        }
        // The server ends the block even when COMMIT fails.
        self.in_block = false;
        client.batch_execute(command).await.map_err(native_error)
    }
}

#[async_trait]
impl NativeSession for PgSession {
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<u64, DriverError> {
        let client = self.ready().await?;
        client.execute(sql, &as_refs(params)).await.map_err(native_error)
    }

    async fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[Vec<RowValues>],
    ) -> Result<u64, DriverError> {
        let client = self.ready().await?;
        let stmt = client.prepare(sql).await.map_err(native_error)?;
        let mut total = 0;
        for params in param_sets {
            total += client
                .execute(&stmt, &as_refs(params))
                .await
                .map_err(native_error)?;
        }
        Ok(total)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutput, DriverError> {
        let client = self.ready().await?;
        let stmt = client.prepare(sql).await.map_err(native_error)?;
        let rows = client
            .query(&stmt, &as_refs(params))
            .await
            .map_err(native_error)?;
        build_output(&stmt, &rows)
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, autocommit: bool) -> Result<(), DriverError> {
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
        self.end_block("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.end_block("ROLLBACK").await
    }

    fn close(&mut self) {
        self.client.take();
        self.in_block = false;
    }

    fn is_closed(&self) -> bool {
        self.client.as_ref().is_none_or(Client::is_closed)
    }
}
