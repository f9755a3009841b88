use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::EngineError;
use crate::value::{ColumnKind, SqlValue};

/// A column default applied when an INSERT payload omits the column.
#[derive(Clone)]
pub enum ColumnDefault {
    Value(SqlValue),
    /// Evaluated at insert time, once per mutation.
    Computed(Arc<dyn Fn() -> SqlValue + Send + Sync>),
}

impl ColumnDefault {
    pub fn computed(f: impl Fn() -> SqlValue + Send + Sync + 'static) -> Self {
        ColumnDefault::Computed(Arc::new(f))
    }

    pub fn evaluate(&self) -> SqlValue {
        match self {
            ColumnDefault::Value(v) => v.clone(),
            ColumnDefault::Computed(f) => f(),
        }
    }
}

impl std::fmt::Debug for ColumnDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ColumnDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Marks a column referencing another resource. Only consulted by the
    /// foreign-key fallback of the violation translator.
    pub foreign_key: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            foreign_key: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_with(mut self, f: impl Fn() -> SqlValue + Send + Sync + 'static) -> Self {
        self.default = Some(ColumnDefault::computed(f));
        self
    }
}

/// Immutable description of one mutable resource: its table, primary key and
/// filterable columns. Built once through [`ResourceSpecBuilder`], shared
/// read-only for the life of the process.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    table: String,
    primary_key: String,
    /// Name of the sequence generating the primary key, for dialects where
    /// generated keys are read back via `<sequence>.currval`. `None` means the
    /// key is either driver-generated (last-insert-id dialects) or supplied
    /// explicitly by the caller.
    sequence: Option<String>,
    columns: Vec<ColumnSpec>,
}

impl ResourceSpec {
    pub fn builder(table: impl Into<String>) -> ResourceSpecBuilder {
        ResourceSpecBuilder::new(table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Payload columns that are declared foreign keys, in payload order.
    pub fn foreign_keys_in<'a>(&self, payload: &'a [(String, SqlValue)]) -> Vec<&'a str> {
        payload
            .iter()
            .filter(|(name, _)| self.column(name).is_some_and(|c| c.foreign_key))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Merges declared column defaults into `payload`, evaluating computed
    /// defaults now. Payload values always win; defaults fill only columns the
    /// payload does not mention.
    pub fn defaulted_payload(&self, payload: &[(String, SqlValue)]) -> Vec<(String, SqlValue)> {
        let mut merged: Vec<(String, SqlValue)> = payload.to_vec();
        let present: BTreeSet<&str> = payload.iter().map(|(name, _)| name.as_str()).collect();

        for column in &self.columns {
            if present.contains(column.name.as_str()) {
                continue;
            }
            if let Some(default) = &column.default {
                merged.push((column.name.clone(), default.evaluate()));
            }
        }

        merged
    }
}

#[derive(Debug, Clone)]
pub struct ResourceSpecBuilder {
    table: String,
    primary_key: Option<String>,
    sequence: Option<String>,
    columns: Vec<ColumnSpec>,
}

impl ResourceSpecBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: None,
            sequence: None,
            columns: Vec::new(),
        }
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.sequence = Some(name.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(ColumnSpec::new(name, kind));
        self
    }

    pub fn column_spec(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    /// Validates the description and freezes it. All problems reported here
    /// are registration-time errors; nothing is re-checked per request.
    pub fn register(self) -> Result<ResourceSpec, EngineError> {
        if !is_identifier(&self.table) {
            return Err(EngineError::registration(format!(
                "'{}' is not a usable table name",
                self.table
            )));
        }
        if self.columns.is_empty() {
            return Err(EngineError::registration(format!(
                "resource '{}' must declare at least one column",
                self.table
            )));
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !is_identifier(&column.name) {
                return Err(EngineError::registration(format!(
                    "resource '{}' column '{}' is not a usable column name",
                    self.table, column.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(EngineError::registration(format!(
                    "resource '{}' declares column '{}' twice",
                    self.table, column.name
                )));
            }
        }

        let Some(primary_key) = self.primary_key else {
            return Err(EngineError::registration(format!(
                "resource '{}' must declare a primary key",
                self.table
            )));
        };
        if !seen.contains(primary_key.as_str()) {
            return Err(EngineError::registration(format!(
                "resource '{}' primary key column '{}' is not declared",
                self.table, primary_key
            )));
        }

        if let Some(sequence) = &self.sequence
            && !is_identifier(sequence)
        {
            return Err(EngineError::registration(format!(
                "resource '{}' sequence '{}' is not a usable sequence name",
                self.table, sequence
            )));
        }

        Ok(ResourceSpec {
            table: self.table,
            primary_key,
            sequence: self.sequence,
            columns: self.columns,
        })
    }
}

/// Identifiers are restricted at registration so SQL rendering never needs
/// dialect-specific quoting.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
