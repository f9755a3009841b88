//! Scripted [`Client`] for tests. Responses are programmed up front and
//! replayed in call order; every statement that reaches the stub is recorded
//! so tests can assert on the exact SQL and parameters the engine produced.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::exec::{Client, DriverError, ExecOutcome, Statement};
use crate::value::Row;

/// What one scripted call should produce.
#[derive(Debug, Clone)]
pub enum Scripted {
    Outcome(ExecOutcome),
    Rows(Vec<Row>),
    Scalar(i64),
    Fail(DriverError),
}

/// Which trait method a recorded statement arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    FetchAll,
    FetchOptional,
    ScalarBlock,
}

pub struct StubClient {
    dialect: Dialect,
    script: VecDeque<Scripted>,
    calls: Vec<(CallKind, Statement)>,
}

impl StubClient {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    pub fn respond(mut self, scripted: Scripted) -> Self {
        self.script.push_back(scripted);
        self
    }

    pub fn respond_outcome(self, rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        self.respond(Scripted::Outcome(ExecOutcome {
            rows_affected,
            last_insert_id,
        }))
    }

    pub fn respond_rows(self, rows: Vec<Row>) -> Self {
        self.respond(Scripted::Rows(rows))
    }

    pub fn respond_row(self, row: Row) -> Self {
        self.respond(Scripted::Rows(vec![row]))
    }

    pub fn respond_empty(self) -> Self {
        self.respond(Scripted::Rows(Vec::new()))
    }

    pub fn respond_scalar(self, value: i64) -> Self {
        self.respond(Scripted::Scalar(value))
    }

    pub fn respond_error(self, error: DriverError) -> Self {
        self.respond(Scripted::Fail(error))
    }

    /// Every call the stub received, in order.
    pub fn calls(&self) -> &[(CallKind, Statement)] {
        &self.calls
    }

    /// SQL text of the n-th recorded call.
    pub fn sql(&self, idx: usize) -> Option<&str> {
        self.calls.get(idx).map(|(_, stmt)| stmt.sql.as_str())
    }

    fn next(&mut self, kind: CallKind, statement: &Statement) -> Result<Scripted, DriverError> {
        self.calls.push((kind, statement.clone()));
        self.script.pop_front().ok_or_else(|| {
            DriverError::new(format!(
                "stub script exhausted at {kind:?}: {}",
                statement.sql
            ))
        })
    }

    fn mismatch(method: &str, got: &Scripted) -> DriverError {
        DriverError::new(format!(
            "stub script mismatch: {method} received a {} response",
            match got {
                Scripted::Outcome(_) => "Outcome",
                Scripted::Rows(_) => "Rows",
                Scripted::Scalar(_) => "Scalar",
                Scripted::Fail(_) => "Fail",
            }
        ))
    }
}

#[async_trait]
impl Client for StubClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome, DriverError> {
        match self.next(CallKind::Execute, statement)? {
            Scripted::Outcome(outcome) => Ok(outcome),
            Scripted::Fail(error) => Err(error),
            other => Err(Self::mismatch("execute", &other)),
        }
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, DriverError> {
        match self.next(CallKind::FetchAll, statement)? {
            Scripted::Rows(rows) => Ok(rows),
            Scripted::Fail(error) => Err(error),
            other => Err(Self::mismatch("fetch_all", &other)),
        }
    }

    async fn fetch_optional(&mut self, statement: &Statement) -> Result<Option<Row>, DriverError> {
        match self.next(CallKind::FetchOptional, statement)? {
            Scripted::Rows(rows) => Ok(rows.into_iter().next()),
            Scripted::Fail(error) => Err(error),
            other => Err(Self::mismatch("fetch_optional", &other)),
        }
    }

    async fn execute_scalar_block(&mut self, statement: &Statement) -> Result<i64, DriverError> {
        match self.next(CallKind::ScalarBlock, statement)? {
            Scripted::Scalar(value) => Ok(value),
            Scripted::Fail(error) => Err(error),
            other => Err(Self::mismatch("execute_scalar_block", &other)),
        }
    }
}
