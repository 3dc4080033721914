use std::time::Duration;

use thiserror::Error;

use crate::taxonomy::TaxonomyError;

#[derive(Debug, Error)]
pub enum SqlPoolError {
    /// A native driver error after classification.
    #[error(transparent)]
    Db(#[from] TaxonomyError),

    /// A driver failure that does not belong to the driver's own error hierarchy.
    #[error(transparent)]
    Unclassified(Box<dyn std::error::Error + Send + Sync>),

    #[error("nested transaction not supported")]
    NestedTransaction,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("pool is closed")]
    PoolClosed,

    #[error("maximum connections ({max}) reached")]
    MaxConnectionsReached { max: usize },

    #[error("connection acquisition timeout after {0:?}")]
    AcquireTimeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),
}

impl SqlPoolError {
    /// The classified driver error, if this is one.
    #[must_use]
    pub fn taxonomy(&self) -> Option<&TaxonomyError> {
        match self {
            SqlPoolError::Db(err) => Some(err),
            _ => None,
        }
    }

    /// True when the error means the connection it came from must be discarded.
    #[must_use]
    pub fn connection_error(&self) -> bool {
        match self {
            SqlPoolError::Db(err) => err.connection_error(),
            SqlPoolError::ConnectionClosed => true,
            _ => false,
        }
    }

    /// True when the error is a uniqueness-constraint violation.
    #[must_use]
    pub fn unique_error(&self) -> bool {
        self.taxonomy().is_some_and(TaxonomyError::unique_error)
    }
}
