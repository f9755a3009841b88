use crate::query::predicate::Predicate;
use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// SELECT over one resource table. Projection, predicate conjunction,
/// ordering and truncation; optionally an appended total-count column for
/// eager counting without a second round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub predicate: Option<Predicate>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Alias of a scalar count column appended to the projection, counting
    /// the pre-limit relation.
    pub count_alias: Option<String>,
}

impl SelectQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            predicate: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            count_alias: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// ANDs `predicate` into whatever predicate is already present. This is
    /// the only way predicates enter a query, so a permission predicate can
    /// never displace a business predicate or vice versa.
    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_count_alias(mut self, alias: impl Into<String>) -> Self {
        self.count_alias = Some(alias.into());
        self
    }

    /// The same query without truncation or the appended count column; what
    /// an eager count must count over.
    pub fn pre_limit(&self) -> SelectQuery {
        SelectQuery {
            table: self.table.clone(),
            columns: self.columns.clone(),
            predicate: self.predicate.clone(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            count_alias: None,
        }
    }
}

/// INSERT in `INSERT … SELECT … WHERE` form: the row values are projected by
/// a source selection and the permission predicate is its WHERE clause, so
/// authorization happens inside the same statement as the write.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub values: Vec<(String, SqlValue)>,
    pub predicate: Option<Predicate>,
    pub returning: bool,
}

impl InsertQuery {
    pub fn into_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            predicate: None,
            returning: false,
        }
    }

    pub fn values(mut self, values: Vec<(String, SqlValue)>) -> Self {
        self.values = values;
        self
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn returning(mut self, returning: bool) -> Self {
        self.returning = returning;
        self
    }

    /// Value the source selection carries for `column`, if the caller
    /// supplied one explicitly.
    pub fn explicit_value(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub assignments: Vec<(String, SqlValue)>,
    pub predicate: Option<Predicate>,
    pub returning: bool,
}

impl UpdateQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            predicate: None,
            returning: false,
        }
    }

    pub fn assignments(mut self, assignments: Vec<(String, SqlValue)>) -> Self {
        self.assignments = assignments;
        self
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn returning(mut self, returning: bool) -> Self {
        self.returning = returning;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub predicate: Option<Predicate>,
}

impl DeleteQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicate: None,
        }
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }
}
