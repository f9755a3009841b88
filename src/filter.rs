//! Declarative query filters, resolved against a resource at registration
//! time and validated strictly at request time.
//!
//! A filter is declared either by bare column name (equality) or as an
//! explicit parameter/operator/column triple, so `min_age` can map to
//! `age >= ?`. Resolution fails registration when a declared name has no
//! matching column. The resolved set carries a typed schema inferred from
//! each column's kind; incoming parameters are coerced against it and
//! unrecognized parameters are rejected rather than silently dropped.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, FieldError};
use crate::query::build::SelectQuery;
use crate::query::predicate::{CmpOp, Predicate, col, lit};
use crate::resource::ResourceSpec;
use crate::value::{ColumnKind, SqlValue};

/// One filter as declared by the resource author, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecl {
    /// Equality on the named column; the parameter name is the column name.
    Field(String),
    /// Explicit parameter name, operator and target column.
    Custom {
        key: String,
        op: CmpOp,
        column: String,
    },
}

impl FilterDecl {
    pub fn field(name: impl Into<String>) -> Self {
        FilterDecl::Field(name.into())
    }

    pub fn custom(key: impl Into<String>, op: CmpOp, column: impl Into<String>) -> Self {
        FilterDecl::Custom {
            key: key.into(),
            op,
            column: column.into(),
        }
    }
}

/// A declared filter resolved against the resource: parameter name, operator,
/// target column and the value type coercion happens against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBinding {
    key: String,
    op: CmpOp,
    column: String,
    kind: ColumnKind,
}

impl FilterBinding {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    bindings: Vec<FilterBinding>,
    config: EngineConfig,
}

impl FilterSet {
    /// Empty set: rejects every filter parameter not in the allowed extras.
    pub fn none(config: &EngineConfig) -> Self {
        Self {
            bindings: Vec::new(),
            config: config.clone(),
        }
    }

    /// Resolves `declarations` against the resource's columns. Any declared
    /// name without a matching column fails registration.
    pub fn resolve(
        spec: &ResourceSpec,
        declarations: Vec<FilterDecl>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut missing = Vec::new();
        let mut bindings = Vec::new();
        for declaration in declarations {
            let (key, op, column) = match declaration {
                FilterDecl::Field(name) => (name.clone(), CmpOp::Eq, name),
                FilterDecl::Custom { key, op, column } => (key, op, column),
            };
            match spec.column(&column) {
                Some(column_spec) => bindings.push(FilterBinding {
                    key,
                    op,
                    column,
                    kind: column_spec.kind,
                }),
                None => missing.push(column),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::registration(format!(
                "cannot find these filter fields on '{}': {}",
                spec.table(),
                missing.join(", ")
            )));
        }
        Ok(Self {
            bindings,
            config: config.clone(),
        })
    }

    pub fn bindings(&self) -> &[FilterBinding] {
        &self.bindings
    }

    fn binding(&self, key: &str) -> Option<&FilterBinding> {
        self.bindings.iter().find(|binding| binding.key == key)
    }

    /// Validates every incoming parameter against the resolved schema.
    /// Parameters named in `allowed_extra` (pagination keys) pass through;
    /// anything else unknown is rejected. Returns the coerced values in
    /// parameter order.
    pub fn validate_params<'a>(
        &'a self,
        params: &BTreeMap<String, String>,
        allowed_extra: &[&str],
    ) -> Result<Vec<(&'a FilterBinding, SqlValue)>, EngineError> {
        let mut errors = Vec::new();
        let mut resolved = Vec::new();
        for (key, raw) in params {
            if allowed_extra.contains(&key.as_str()) {
                continue;
            }
            match self.binding(key) {
                Some(binding) => match coerce(raw, binding.kind, &self.config) {
                    Ok(value) => resolved.push((binding, value)),
                    Err(message) => errors.push(FieldError::new(key.clone(), message)),
                },
                None => errors.push(FieldError::new(key.clone(), "unknown filter parameter")),
            }
        }
        if !errors.is_empty() {
            return Err(EngineError::validation(errors));
        }
        Ok(resolved)
    }

    /// Validates `params` and ANDs one comparison per present parameter into
    /// `query`. Absent parameters contribute nothing.
    pub fn apply(
        &self,
        query: SelectQuery,
        params: &BTreeMap<String, String>,
        allowed_extra: &[&str],
    ) -> Result<SelectQuery, EngineError> {
        let resolved = self.validate_params(params, allowed_extra)?;
        let mut query = query;
        for (binding, value) in resolved {
            debug!(key = %binding.key, column = %binding.column, "filter applied");
            query = query.and_where(Predicate::cmp(col(&binding.column), binding.op, lit(value)));
        }
        Ok(query)
    }
}

fn coerce(raw: &str, kind: ColumnKind, config: &EngineConfig) -> Result<SqlValue, String> {
    match kind {
        ColumnKind::Integer => raw
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|_| "not a valid integer".to_string()),
        ColumnKind::Numeric => raw
            .parse::<f64>()
            .map(SqlValue::Float)
            .map_err(|_| "not a valid number".to_string()),
        ColumnKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(SqlValue::Boolean(true)),
            "false" | "0" => Ok(SqlValue::Boolean(false)),
            _ => Err("not a valid boolean".to_string()),
        },
        ColumnKind::Date => coerce_temporal(raw, &config.date_formats, "date"),
        ColumnKind::DateTime => coerce_temporal(raw, &config.datetime_formats, "datetime"),
        ColumnKind::Time => coerce_temporal(raw, &config.time_formats, "time"),
        // bytes columns fall back to plain string matching
        ColumnKind::Text | ColumnKind::Bytes => Ok(SqlValue::from(raw)),
    }
}

/// Validates the raw string against the accepted formats and keeps it as a
/// string bind; the driver performs the actual temporal conversion.
fn coerce_temporal(raw: &str, formats: &[String], label: &str) -> Result<SqlValue, String> {
    if formats.iter().any(|format| matches_format(raw, format)) {
        Ok(SqlValue::from(raw))
    } else {
        Err(format!("not a valid {label}"))
    }
}

/// Minimal strftime-style shape check. Supports the directives the accepted
/// formats use: %Y %y %m %d %H %M %S %f plus literal text, with range checks
/// on the calendar fields.
fn matches_format(value: &str, format: &str) -> bool {
    let mut input = value.chars().peekable();
    let mut directives = format.chars();
    while let Some(ch) = directives.next() {
        if ch != '%' {
            if input.next() != Some(ch) {
                return false;
            }
            continue;
        }
        let ok = match directives.next() {
            Some('Y') => take_digits(&mut input, 4, 4).is_some(),
            Some('y') => take_digits(&mut input, 2, 2).is_some(),
            Some('m') => matches_range(take_digits(&mut input, 2, 2), 1, 12),
            Some('d') => matches_range(take_digits(&mut input, 2, 2), 1, 31),
            Some('H') => matches_range(take_digits(&mut input, 2, 2), 0, 23),
            Some('M') | Some('S') => matches_range(take_digits(&mut input, 2, 2), 0, 59),
            Some('f') => take_digits(&mut input, 1, 6).is_some(),
            Some('%') => input.next() == Some('%'),
            _ => false,
        };
        if !ok {
            return false;
        }
    }
    input.next().is_none()
}

fn take_digits(
    input: &mut std::iter::Peekable<std::str::Chars<'_>>,
    min: usize,
    max: usize,
) -> Option<u32> {
    let mut taken = 0;
    let mut number = 0u32;
    while taken < max
        && let Some(ch) = input.peek()
        && let Some(digit) = ch.to_digit(10)
    {
        number = number * 10 + digit;
        input.next();
        taken += 1;
    }
    (taken >= min).then_some(number)
}

fn matches_range(parsed: Option<u32>, min: u32, max: u32) -> bool {
    parsed.is_some_and(|value| value >= min && value <= max)
}
