//! Error types for pgfrag

use thiserror::Error;

/// Result type alias for pgfrag operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Error types for fragment building and query execution
#[derive(Debug, Error)]
pub enum SqlError {
    /// A `$name` token in a template did not match any registered transform
    #[error("Unknown transform: \"{0}\"")]
    UnknownTransform(String),

    /// A transform or the builder was given a value it cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempt to bind a transform name that is already bound to a different function
    #[error("Transform \"{0}\" already registered")]
    Conflict(String),

    /// A second statement was issued while one was in flight, or a
    /// transaction operation was used out of order
    #[error("Serial access violation: {0}")]
    SerialAccess(String),

    /// A row or value accessor saw the wrong row or column count
    #[error("Expected exactly one {unit} but {got} returned")]
    Cardinality { unit: &'static str, got: usize },

    /// The client was finalized while a transaction was still open;
    /// an automatic rollback was issued
    #[error("Transaction started manually but not closed; automatic rollback issued")]
    UnclosedTransaction,

    /// Operation attempted after the client was released
    #[error("Client already released")]
    ClientReleased,

    /// Driver-reported query failure
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl SqlError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a serial access violation error
    pub fn serial_access(message: impl Into<String>) -> Self {
        Self::SerialAccess(message.into())
    }

    /// Create a cardinality error for a row or column count mismatch
    pub fn cardinality(unit: &'static str, got: usize) -> Self {
        Self::Cardinality { unit, got }
    }

    /// Check if this is a serial access violation
    pub fn is_serial_access(&self) -> bool {
        matches!(self, Self::SerialAccess(_))
    }

    /// Check if this is a cardinality error
    pub fn is_cardinality(&self) -> bool {
        matches!(self, Self::Cardinality { .. })
    }

    /// Check if this is a use-after-release error
    pub fn is_client_released(&self) -> bool {
        matches!(self, Self::ClientReleased)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for SqlError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
