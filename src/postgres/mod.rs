//! Postgres backend on top of `tokio_postgres`.

pub mod config;
mod error;
mod params;
mod query;
pub mod session;

pub use config::{PgConnectParams, PgManager};
pub use session::PgSession;
