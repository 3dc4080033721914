//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::connection::{Connection, TxScope};
pub use crate::error::SqlPoolError;
pub use crate::pool::{
    ConnectionPool, CooperativePool, LockedPool, PoolConfig, PoolStatus, PooledConnection,
    with_connection,
};
pub use crate::render::{bind_named, check_placeholders, render_statement};
pub use crate::results::{ColumnDesc, QueryDetail, ResultSet, Row};
pub use crate::session::{DriverError, ManageSession, NativeSession, QueryOutput};
pub use crate::taxonomy::{ErrorKind, NativeError, NativeErrorClass, TaxonomyError};
pub use crate::types::RowValues;

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgConnectParams, PgManager, PgSession};
