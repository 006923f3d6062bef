use thiserror::Error;

/// Errors raised by the ETL table contract.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("Session is closed")]
    SessionClosed,

    #[error("Invalid table identifier '{0}' (expected catalog.database.table)")]
    InvalidIdentifier(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Table '{table}' has no column '{column}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Table '{table}' already has a column '{column}'")]
    ColumnExists { table: String, column: String },

    #[error("Table '{0}' must declare at least one column")]
    EmptySchema(String),

    #[error("Row has {found} values but table '{table}' has {expected} columns")]
    ArityMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("Cannot write {found} value to {expected} column '{column}'")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Column '{0}' is required and cannot be NULL")]
    NullViolation(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, EtlError>;
