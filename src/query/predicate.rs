use crate::error::{EngineError, FieldError};
use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

/// Maximum nesting depth for predicates to prevent stack overflow
const MAX_PREDICATE_DEPTH: usize = 32;

/// One side of a comparison. Keeping both sides symbolic is what lets
/// primary-key recovery accept `pk = v` and `v = pk` alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Column(String),
    Value(SqlValue),
}

pub fn col(name: impl Into<String>) -> Operand {
    Operand::Column(name.into())
}

pub fn lit(value: impl Into<SqlValue>) -> Operand {
    Operand::Value(value.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl CmpOp {
    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Like => "LIKE",
        }
    }
}

/// A boolean expression over columns. Conjunctions are n-ary and flattened so
/// that merging a permission predicate into any existing predicate always
/// yields a single top-level `And`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Cmp {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    IsNull(String),
    IsNotNull(String),
    /// Verbatim SQL fragment. Rendered as-is inside parentheses; opaque to
    /// primary-key recovery.
    Raw(String),
}

impl Predicate {
    pub fn cmp(left: Operand, op: CmpOp, right: Operand) -> Predicate {
        Predicate::Cmp { left, op, right }
    }

    pub fn eq(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Eq, right)
    }

    pub fn ne(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Ne, right)
    }

    pub fn lt(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Lt, right)
    }

    pub fn lte(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Lte, right)
    }

    pub fn gt(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Gt, right)
    }

    pub fn gte(left: Operand, right: Operand) -> Predicate {
        Predicate::cmp(left, CmpOp::Gte, right)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Predicate {
        Predicate::cmp(col(column), CmpOp::Like, lit(pattern.into()))
    }

    pub fn is_null(column: impl Into<String>) -> Predicate {
        Predicate::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Predicate {
        Predicate::IsNotNull(column.into())
    }

    pub fn raw(sql: impl Into<String>) -> Predicate {
        Predicate::Raw(sql.into())
    }

    /// Conjunction, flattening nested `And`s on both sides.
    pub fn and(self, rhs: Predicate) -> Predicate {
        let mut children = match self {
            Predicate::And(children) => children,
            other => vec![other],
        };
        match rhs {
            Predicate::And(more) => children.extend(more),
            other => children.push(other),
        }
        Predicate::And(children)
    }

    pub fn or(self, rhs: Predicate) -> Predicate {
        let mut children = match self {
            Predicate::Or(children) => children,
            other => vec![other],
        };
        match rhs {
            Predicate::Or(more) => children.extend(more),
            other => children.push(other),
        }
        Predicate::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// Folds an iterator of predicates into one conjunction; `None` when the
    /// iterator is empty.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::and)
    }

    /// Maximum nesting depth of the tree.
    pub fn depth(&self) -> usize {
        match self {
            Predicate::Cmp { .. }
            | Predicate::IsNull(_)
            | Predicate::IsNotNull(_)
            | Predicate::Raw(_) => 1,
            Predicate::Not(inner) => 1 + inner.depth(),
            Predicate::And(children) | Predicate::Or(children) => {
                1 + children.iter().map(Predicate::depth).max().unwrap_or(0)
            }
        }
    }

    pub fn validate_depth(&self) -> Result<(), EngineError> {
        let depth = self.depth();
        if depth > MAX_PREDICATE_DEPTH {
            return Err(EngineError::validation(vec![FieldError::new(
                "predicate",
                format!(
                    "nesting depth {depth} exceeds maximum allowed depth of {MAX_PREDICATE_DEPTH}"
                ),
            )]));
        }
        Ok(())
    }

    /// Finds the value the predicate pins the primary-key column to.
    ///
    /// Walks conjunctions in order, depth-first, and inspects each conjunct as
    /// a binary equality; the first equality between the primary-key column
    /// and a value wins, whichever side the column is on. Disjunctions, `NOT`,
    /// raw fragments and non-equality comparisons never pin a key and are
    /// skipped.
    pub fn primary_key_value<'a>(&'a self, primary_key: &str) -> Option<&'a SqlValue> {
        match self {
            Predicate::And(children) => children
                .iter()
                .find_map(|child| child.primary_key_value(primary_key)),
            Predicate::Cmp {
                left,
                op: CmpOp::Eq,
                right,
            } => match (left, right) {
                (Operand::Column(name), Operand::Value(value))
                | (Operand::Value(value), Operand::Column(name))
                    if name == primary_key =>
                {
                    Some(value)
                }
                _ => None,
            },
            _ => None,
        }
    }
}
