use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Semantic column types, as far as the engine needs to know them: they drive
/// filter-parameter validation and nothing else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Numeric,
    Text,
    Boolean,
    Date,
    DateTime,
    Time,
    Bytes,
}

impl ColumnKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Date => "date",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Time => "time",
            ColumnKind::Bytes => "bytes",
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Time
        )
    }
}

/// A runtime SQL value: bind parameter going in, result cell coming out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(CompactString),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Integer(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Lossy bridge from JSON payloads; arrays and objects have no SQL value
    /// representation here.
    pub fn from_json(value: &serde_json::Value) -> Option<SqlValue> {
        match value {
            serde_json::Value::Null => Some(SqlValue::Null),
            serde_json::Value::Bool(b) => Some(SqlValue::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(SqlValue::Integer(i))
                } else {
                    n.as_f64().map(SqlValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(SqlValue::Text(s.as_str().into())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Boolean(b) => serde_json::Value::Bool(*b),
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            SqlValue::Text(s) => serde_json::Value::String(s.to_string()),
            SqlValue::Bytes(b) => serde_json::Value::String(
                b.iter().map(|byte| format!("{byte:02x}")).collect::<String>(),
            ),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Boolean(_) => 1,
            SqlValue::Integer(_) => 2,
            SqlValue::Float(_) => 3,
            SqlValue::Text(_) => 4,
            SqlValue::Bytes(_) => 5,
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SqlValue {}

impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
            (SqlValue::Boolean(a), SqlValue::Boolean(b)) => a.cmp(b),
            (SqlValue::Integer(a), SqlValue::Integer(b)) => a.cmp(b),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.total_cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => a.cmp(b),
            (SqlValue::Bytes(a), SqlValue::Bytes(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Boolean(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.into())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v.into())
    }
}

impl From<CompactString> for SqlValue {
    fn from(v: CompactString) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// A result row with named columns, as handed back by a [`crate::exec::Client`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn from_pairs(pairs: Vec<(&str, SqlValue)>) -> Self {
        let (columns, values) = pairs
            .into_iter()
            .map(|(c, v)| (c.to_string(), v))
            .unzip();
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Removes a column and its value in place, returning the value.
    pub fn take(&mut self, column: &str) -> Option<SqlValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.columns.remove(idx);
        Some(self.values.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnKind, Row, SqlValue};
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = SqlValue> {
        prop_oneof![
            Just(SqlValue::Null),
            any::<bool>().prop_map(SqlValue::Boolean),
            any::<i64>().prop_map(SqlValue::Integer),
            any::<f64>()
                .prop_filter("finite float only", |v| v.is_finite())
                .prop_map(SqlValue::Float),
            "\\PC{0,32}".prop_map(|s| SqlValue::Text(s.into())),
            prop::collection::vec(any::<u8>(), 0..64).prop_map(SqlValue::Bytes),
        ]
    }

    proptest! {
        #[test]
        fn json_bridge_preserves_scalar_values(
            v in arb_value().prop_filter("bytes render as hex, not a scalar", |v| {
                !matches!(v, SqlValue::Bytes(_))
            })
        ) {
            let json = v.to_json();
            let back = SqlValue::from_json(&json).expect("scalar json maps back");
            prop_assert_eq!(v, back);
        }

        #[test]
        fn ordering_is_total(a in arb_value(), b in arb_value(), c in arb_value()) {
            let mut sorted = vec![a, b, c];
            sorted.sort();
            prop_assert!(sorted[0] <= sorted[1] && sorted[1] <= sorted[2]);
        }
    }

    #[test]
    fn row_take_removes_column_and_value() {
        let mut row = Row::from_pairs(vec![
            ("id", SqlValue::Integer(7)),
            ("email", SqlValue::Text("a@x.com".into())),
        ]);
        assert_eq!(row.take("id"), Some(SqlValue::Integer(7)));
        assert_eq!(row.get("id"), None);
        assert_eq!(row.columns, vec!["email".to_string()]);
        assert_eq!(row.take("missing"), None);
    }

    #[test]
    fn column_kind_names() {
        assert_eq!(ColumnKind::Integer.type_name(), "integer");
        assert_eq!(ColumnKind::DateTime.type_name(), "datetime");
        assert!(ColumnKind::Date.is_temporal());
        assert!(!ColumnKind::Text.is_temporal());
    }
}
