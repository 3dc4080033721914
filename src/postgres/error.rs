use crate::session::DriverError;
use crate::taxonomy::{NativeError, NativeErrorClass};

/// Map a `tokio_postgres` error onto the driver error hierarchy.
///
/// Server errors carry their SQLSTATE; client-side failures have no code and are
/// classed by what went wrong. Losing the socket, whether reported as a closed
/// client or as an io failure, is operational.
pub(crate) fn native_error(err: tokio_postgres::Error) -> DriverError {
    if let Some(db) = err.as_db_error() {
        return NativeError::with_sqlstate(db.code().code(), db.message()).into();
    }
    let class = if err.is_closed()
        || std::error::Error::source(&err).is_some_and(|src| src.is::<std::io::Error>())
    {
        NativeErrorClass::Operational
    } else {
        NativeErrorClass::Interface
    };
    NativeError::new(class, err.to_string()).into()
}

/// Use of a session this crate already closed.
pub(crate) fn closed_session() -> DriverError {
    NativeError::new(NativeErrorClass::Interface, "connection already closed").into()
}
