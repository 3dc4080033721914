//! Bounded connection pooling for Postgres.
//!
//! [`LockedPool`] and [`CooperativePool`] hand out [`Connection`] handles, each
//! owning one native session. Driver errors are classified into a small taxonomy
//! ([`taxonomy`]) so callers can tell a dead connection from a constraint race,
//! and the pools discard connections that hit a fatal error.
//!
//! ```rust,no_run
//! use pg_pool_middleware::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let params = PgConnectParams {
//!     host: Some("localhost".into()),
//!     port: Some(5432),
//!     user: Some("app".into()),
//!     password: Some("secret".into()),
//!     dbname: Some("app".into()),
//! };
//! let config = PoolConfig::new()
//!     .max_conn(4)
//!     .sweep_period(std::time::Duration::from_secs(30));
//! let pool = CooperativePool::new(PgManager::from_params(&params)?, config)?;
//!
//! let mut conn = pool.get().await?;
//! let rows = conn
//!     .query("select id, name from users where id = $1", &[RowValues::Int(1)])
//!     .await?;
//! for row in &rows {
//!     println!("{:?}", row.get("name"));
//! }
//! drop(conn);
//!
//! pool.destroy().await;
//! # Ok(())
//! # }
//! ```
//!
//! A released handle cannot be used again; release takes it by value:
//!
//! ```rust,compile_fail
//! use pg_pool_middleware::prelude::*;
//! use pg_pool_middleware::test_utils::mock::MockManager;
//!
//! async fn reuse(pool: &LockedPool<MockManager>) {
//!     let mut conn = pool.acquire().await.unwrap();
//!     pool.release(conn);
//!     conn.execute("select 1", &[]).await.unwrap();
//! }
//! ```

pub mod connection;
pub mod error;
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod prelude;
pub mod render;
pub mod results;
pub mod session;
pub mod taxonomy;
pub mod test_utils;
pub mod types;

pub use connection::{Connection, TxScope};
pub use error::SqlPoolError;
pub use pool::{
    ConnectionPool, CooperativePool, LockedPool, PoolConfig, PoolStatus, PooledConnection,
    with_connection,
};
pub use results::{ColumnDesc, QueryDetail, ResultSet, Row};
pub use session::{DriverError, ManageSession, NativeSession, QueryOutput};
pub use taxonomy::{ErrorKind, NativeError, NativeErrorClass, TaxonomyError, classify};
pub use types::RowValues;
