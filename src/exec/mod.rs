pub mod mutate;
pub mod stub;

use async_trait::async_trait;
use thiserror::Error;

use crate::dialect::Dialect;
use crate::value::{Row, SqlValue};

/// A rendered SQL statement plus its ordered bind parameters. The placeholder
/// style inside `sql` follows the dialect it was rendered for; `params` stay
/// positional regardless of style.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Result of a statement that does not produce rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Auto-generated key of the inserted row, when the driver exposes one.
    pub last_insert_id: Option<i64>,
}

/// Driver-level failure. Carries the identifiers violation translation keys
/// off: SQLSTATE, vendor code, raw message, and the structured detail and
/// column fields some servers report separately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub sqlstate: Option<String>,
    pub vendor_code: Option<i64>,
    pub detail: Option<String>,
    pub column: Option<String>,
    /// Whether the driver classified the failure as an integrity-constraint
    /// violation. Only these are fed through the violation matchers.
    pub integrity: bool,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sqlstate: None,
            vendor_code: None,
            detail: None,
            column: None,
            integrity: false,
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self {
            integrity: true,
            ..Self::new(message)
        }
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    pub fn with_vendor_code(mut self, vendor_code: i64) -> Self {
        self.vendor_code = Some(vendor_code);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// One database session. An implementation wraps a live connection and runs
/// every call inside the same transaction scope, so a mutation and its
/// follow-up re-select observe identical row visibility.
#[async_trait]
pub trait Client: Send {
    /// Dialect of the underlying connection. Drives statement rendering,
    /// key-recovery strategy and violation translation.
    fn dialect(&self) -> Dialect;

    async fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, DriverError>;

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError>;

    async fn fetch_optional(&mut self, statement: &Statement) -> Result<Option<Row>, DriverError>;

    /// Runs an anonymous procedural block that assigns a single numeric
    /// out-bind and returns the assigned value. Only dialects with such an
    /// escape hatch implement this; the default rejects the call.
    async fn execute_scalar_block(&mut self, statement: &Statement) -> Result<i64, DriverError> {
        let _ = statement;
        Err(DriverError::new(format!(
            "procedural blocks are not supported by the {} driver",
            self.dialect()
        )))
    }
}
