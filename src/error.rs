use thiserror::Error;

use crate::types::{SqlValue, Value};

/// Error reported by the underlying driver, before translation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct NativeError {
    /// Numeric error number (e.g. 1062), when the driver reports one.
    pub errno: Option<i64>,
    /// Symbolic or SQLSTATE code, when the driver reports one.
    pub code: Option<String>,
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errno: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_errno(mut self, errno: i64) -> Self {
        self.errno = Some(errno);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The numeric code used for classification: `errno` first, then a
    /// numeric `code`.
    pub fn error_code(&self) -> Option<i64> {
        self.errno
            .or_else(|| self.code.as_deref().and_then(|c| c.parse().ok()))
    }
}

/// One offending field of a unique constraint violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrorItem {
    pub message: String,
    /// Always `"unique violation"` for database-originated items.
    pub kind: &'static str,
    /// Attribute name the item refers to.
    pub path: String,
    pub value: Option<String>,
    /// Always `"not_unique"` for database-originated items.
    pub validator_key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct UniqueConstraintError {
    pub message: String,
    pub errors: Vec<ValidationErrorItem>,
    /// Violated fields with their values, in key declaration order.
    pub fields: Vec<(String, Option<String>)>,
    #[source]
    pub parent: NativeError,
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

/// Which side of a foreign key relation rejected the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    /// The row is still referenced by a child row.
    Parent,
    /// The referenced parent row does not exist.
    Child,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Parent => "parent",
            RelationType::Child => "child",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", parent.message)]
pub struct ForeignKeyConstraintError {
    pub reltype: RelationType,
    /// Referenced table.
    pub table: Option<String>,
    /// Referencing columns.
    pub fields: Option<Vec<String>>,
    /// Referenced columns.
    pub referenced_fields: Option<Vec<String>>,
    /// Bound instance value of the first referencing column.
    pub value: Option<Value>,
    /// Constraint name.
    pub index: Option<String>,
    #[source]
    pub parent: NativeError,
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", parent.message)]
pub struct DatabaseError {
    #[source]
    pub parent: NativeError,
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

impl DatabaseError {
    /// True when the server aborted the statement to break a deadlock.
    /// Reported only; nothing in this crate retries.
    pub fn is_deadlock(&self) -> bool {
        self.parent.error_code() == Some(crate::translator::ER_DEADLOCK)
    }
}

/// Error type for dmrs operations
#[derive(Debug, Error)]
pub enum DmError {
    #[error("Connection failed: {0}")]
    Connection(#[source] NativeError),

    #[error(transparent)]
    UniqueConstraint(#[from] UniqueConstraintError),

    #[error(transparent)]
    ForeignKeyConstraint(#[from] ForeignKeyConstraintError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Column `{column}` does not hold valid JSON: {source}")]
    JsonColumn {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read streamed column `{column}`: {source}")]
    StreamRead {
        column: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for dmrs operations
pub type Result<T> = std::result::Result<T, DmError>;
