use thiserror::Error;

/// Failures raised while talking to the database or applying the query policy.
///
/// `Catalog` and `Execution` both carry the driver's message verbatim; they
/// only differ in which kind of statement failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("{message}")]
    Connection { message: String },

    #[error("{message}")]
    Query { message: String },

    #[error("{message}")]
    Catalog { message: String },

    #[error("{message}")]
    Execution { message: String },

    #[error("Table \"{table}\" does not exist.")]
    NotFound { table: String },

    #[error("Only SELECT queries are allowed.")]
    ReadOnlyViolation,

    #[error("Unexpected catalog row: {message}")]
    Decode { message: String },
}

impl DbError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn not_found(table: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Reclassify a raw query failure as a failed catalog lookup.
    pub fn into_catalog(self) -> Self {
        match self {
            Self::Query { message } => Self::Catalog { message },
            other => other,
        }
    }

    /// Reclassify a raw query failure as a failed guarded statement.
    pub fn into_execution(self) -> Self {
        match self {
            Self::Query { message } => Self::Execution { message },
            other => other,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
