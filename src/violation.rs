//! Translation of driver integrity failures into structured violations.
//!
//! Each supported dialect reports constraint trips differently: Postgres
//! carries a SQLSTATE plus a parseable DETAIL line, MySQL and Oracle use
//! vendor codes and require a catalog round trip to turn a constraint name
//! into column names, SQLite only offers message prefixes. Matching always
//! checks unique, then foreign-key, then not-null; anything unmatched is
//! propagated as a raw driver error.

use regex_lite::Regex;
use tracing::warn;

use crate::dialect::Dialect;
use crate::error::{EngineError, FieldError};
use crate::exec::{Client, DriverError, Statement};
use crate::resource::ResourceSpec;
use crate::value::SqlValue;

/// Which table constraint a mutation tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
}

impl ConstraintKind {
    /// Per-field message the API layer serializes for this class.
    pub fn message(self) -> &'static str {
        match self {
            ConstraintKind::Unique => "Duplicates are not permitted.",
            ConstraintKind::ForeignKey => "No resource with this value exists.",
            ConstraintKind::NotNull => "Missing data for required field.",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ConstraintKind,
    /// Offending columns, best effort. `unknown` when the server reported
    /// nothing more precise.
    pub columns: Vec<String>,
}

impl Violation {
    pub fn new(kind: ConstraintKind, columns: Vec<String>) -> Self {
        Self { kind, columns }
    }

    /// One field error per offending column, carrying the fixed per-kind
    /// message.
    pub fn field_messages(&self) -> Vec<FieldError> {
        self.columns
            .iter()
            .map(|column| FieldError::new(column.clone(), self.kind.message()))
            .collect()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} constraint violated on ({})",
            self.kind.label(),
            self.columns.join(", ")
        )
    }
}

const UNKNOWN: &str = "unknown";

fn unknown_columns() -> Vec<String> {
    vec![UNKNOWN.to_string()]
}

fn violation(kind: ConstraintKind, columns: Vec<String>) -> EngineError {
    EngineError::ConstraintViolation(Violation::new(kind, columns))
}

/// Classifies a driver failure raised by a mutation against `spec`.
///
/// Non-integrity errors and dialects without a matcher pass through
/// untranslated. The MySQL and Oracle paths may issue a catalog lookup on
/// `client` to resolve a constraint name into its column list; both engines
/// keep the session usable after an integrity failure, so the lookup shares
/// the mutation's session.
pub async fn translate_constraint_error(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    payload: &[(String, SqlValue)],
    error: DriverError,
) -> EngineError {
    if !error.integrity {
        return EngineError::Driver(error);
    }
    let dialect = client.dialect();
    if !dialect.profile().has_violation_matcher {
        return EngineError::Driver(error);
    }
    match dialect {
        Dialect::Postgres => postgres(error),
        Dialect::MySql => mysql(client, error).await,
        Dialect::Sqlite => sqlite(spec, payload, error),
        Dialect::Oracle => oracle(client, error).await,
        Dialect::Unknown => EngineError::Driver(error),
    }
}

fn postgres(error: DriverError) -> EngineError {
    match error.sqlstate.as_deref() {
        Some("23505") => violation(
            ConstraintKind::Unique,
            postgres_detail_columns(&error, r"^Key \((.+)\)=\((.+)\) already exists\."),
        ),
        Some("23503") => violation(
            ConstraintKind::ForeignKey,
            postgres_detail_columns(&error, r"^Key \((.+)\)=\((.+)\) is not present"),
        ),
        Some("23502") => {
            let column = error.column.clone().unwrap_or_else(|| UNKNOWN.to_string());
            violation(ConstraintKind::NotNull, vec![column])
        }
        _ => EngineError::Driver(error),
    }
}

/// Columns come from the key list in the DETAIL line, e.g.
/// `Key (email)=(a@x.com) already exists.`
fn postgres_detail_columns(error: &DriverError, pattern: &str) -> Vec<String> {
    let Some(detail) = error.detail.as_deref() else {
        return unknown_columns();
    };
    let columns = Regex::new(pattern)
        .ok()
        .and_then(|re| re.captures(detail))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()));
    match columns {
        Some(list) => list.split(", ").map(str::to_string).collect(),
        None => unknown_columns(),
    }
}

async fn mysql(client: &mut dyn Client, error: DriverError) -> EngineError {
    match error.vendor_code {
        Some(1062) => {
            let columns = mysql_unique_columns(client, &error).await;
            violation(ConstraintKind::Unique, columns)
        }
        Some(1452) => violation(ConstraintKind::ForeignKey, mysql_foreign_key_columns(&error)),
        Some(1048) => violation(ConstraintKind::NotNull, vec![mysql_not_null_column(&error)]),
        _ => EngineError::Driver(error),
    }
}

/// MySQL only reports `<table>.<key name>`, where the key name matches the
/// column name only for unnamed single-column constraints. The column list
/// behind the key comes from `information_schema`, in ordinal order.
async fn mysql_unique_columns(client: &mut dyn Client, error: &DriverError) -> Vec<String> {
    let parsed = Regex::new(r"^Duplicate entry '.+' for key '(.+)\.(.+)'")
        .ok()
        .and_then(|re| re.captures(&error.message))
        .and_then(|caps| match (caps.get(1), caps.get(2)) {
            (Some(table), Some(key)) => {
                Some((table.as_str().to_string(), key.as_str().to_string()))
            }
            _ => None,
        });
    let Some((table_name, key_name)) = parsed else {
        return unknown_columns();
    };

    let lookup = Statement::new(
        "SELECT column_name FROM information_schema.key_column_usage \
         WHERE table_schema = database() AND table_name = ? AND constraint_name = ? \
         ORDER BY ordinal_position",
        vec![
            SqlValue::from(table_name.as_str()),
            SqlValue::from(key_name.as_str()),
        ],
    );
    match client.fetch_all(&lookup).await {
        Ok(rows) if rows.is_empty() => vec![key_name],
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.values.first().and_then(|v| v.as_text()))
            .map(str::to_string)
            .collect(),
        Err(lookup_error) => {
            warn!(table = %table_name, key = %key_name, error = %lookup_error,
                  "constraint column lookup failed");
            unknown_columns()
        }
    }
}

fn mysql_foreign_key_columns(error: &DriverError) -> Vec<String> {
    let captured = Regex::new(
        r"Cannot add or update a child row: a foreign key constraint fails.*FOREIGN KEY \((.+)\) REFERENCES",
    )
    .ok()
    .and_then(|re| re.captures(&error.message))
    .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()));
    match captured {
        // the column list arrives backticked: `foo`, `bar`
        Some(list) => list
            .split(", ")
            .map(|column| column.trim_matches('`').to_string())
            .collect(),
        None => unknown_columns(),
    }
}

fn mysql_not_null_column(error: &DriverError) -> String {
    Regex::new(r"Column '(.+)' cannot be null")
        .ok()
        .and_then(|re| re.captures(&error.message))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn sqlite(spec: &ResourceSpec, payload: &[(String, SqlValue)], error: DriverError) -> EngineError {
    let message = error.message.as_str();
    if message.starts_with("UNIQUE constraint failed") {
        let columns = message
            .strip_prefix("UNIQUE constraint failed: ")
            .filter(|rest| !rest.is_empty())
            .map(|rest| {
                rest.split(", ")
                    .map(|key| strip_table_prefix(key).to_string())
                    .collect()
            })
            .unwrap_or_else(unknown_columns);
        violation(ConstraintKind::Unique, columns)
    } else if message.starts_with("FOREIGN KEY constraint failed") {
        violation(
            ConstraintKind::ForeignKey,
            sqlite_foreign_key_guess(spec, payload),
        )
    } else if message.starts_with("NOT NULL constraint failed") {
        let column = message
            .strip_prefix("NOT NULL constraint failed: ")
            .and_then(|rest| rest.split_once('.'))
            .map(|(_, column)| column.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        violation(ConstraintKind::NotNull, vec![column])
    } else {
        EngineError::Driver(error)
    }
}

/// `users.email` -> `email`; a bare key passes through unchanged.
fn strip_table_prefix(key: &str) -> &str {
    key.split_once('.').map_or(key, |(_, column)| column)
}

/// SQLite reports neither the constraint nor the column for foreign-key
/// failures. When the payload touches exactly one declared foreign-key
/// column, that column is the reasonable guess; otherwise give up.
fn sqlite_foreign_key_guess(spec: &ResourceSpec, payload: &[(String, SqlValue)]) -> Vec<String> {
    let candidates = spec.foreign_keys_in(payload);
    if candidates.len() == 1 {
        candidates.into_iter().map(str::to_string).collect()
    } else {
        unknown_columns()
    }
}

async fn oracle(client: &mut dyn Client, error: DriverError) -> EngineError {
    match error.vendor_code {
        Some(1) => {
            let columns = oracle_constraint_columns(
                client,
                &error,
                r"^ORA-00001: unique constraint \([^.]+\.(.+)\) violated",
            )
            .await;
            violation(ConstraintKind::Unique, columns)
        }
        Some(2291) => {
            let columns = oracle_constraint_columns(
                client,
                &error,
                r"^ORA-02291: integrity constraint \([^.]+\.(.+)\) violated - parent key not found",
            )
            .await;
            violation(ConstraintKind::ForeignKey, columns)
        }
        Some(1400) => violation(ConstraintKind::NotNull, vec![oracle_not_null_column(&error)]),
        _ => EngineError::Driver(error),
    }
}

/// Resolves the constraint name in an ORA message to its columns. Unique
/// constraints declared as plain unique indexes have no `user_cons_columns`
/// row, hence the `user_ind_columns` arm. Catalog identifiers go in
/// uppercase and come back lowercased.
async fn oracle_constraint_columns(
    client: &mut dyn Client,
    error: &DriverError,
    pattern: &str,
) -> Vec<String> {
    let constraint_name = Regex::new(pattern)
        .ok()
        .and_then(|re| re.captures(&error.message))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()));
    let Some(constraint_name) = constraint_name else {
        return unknown_columns();
    };

    let bound = SqlValue::from(constraint_name.to_uppercase().as_str());
    let lookup = Statement::new(
        "WITH constraint_columns AS (\
           SELECT column_name, position FROM user_cons_columns WHERE constraint_name = :p1\
         ) \
         SELECT column_name, position FROM constraint_columns \
         UNION \
         SELECT column_name, column_position position FROM user_ind_columns \
         WHERE index_name = :p2 \
           AND NOT EXISTS (SELECT 1 FROM constraint_columns) \
         ORDER BY position",
        vec![bound.clone(), bound],
    );
    match client.fetch_all(&lookup).await {
        Ok(rows) if rows.is_empty() => vec![constraint_name.to_lowercase()],
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.values.first().and_then(|v| v.as_text()))
            .map(str::to_lowercase)
            .collect(),
        Err(lookup_error) => {
            warn!(constraint = %constraint_name, error = %lookup_error,
                  "constraint column lookup failed");
            unknown_columns()
        }
    }
}

fn oracle_not_null_column(error: &DriverError) -> String {
    Regex::new(r#"^ORA-01400: cannot insert NULL into \([^.]+\.[^.]+\."(.+)"\)"#)
        .ok()
        .and_then(|re| re.captures(&error.message))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_lowercase()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ConstraintKind, Violation, translate_constraint_error};
    use crate::dialect::Dialect;
    use crate::error::EngineError;
    use crate::exec::DriverError;
    use crate::exec::stub::StubClient;
    use crate::resource::{ColumnSpec, ResourceSpec};
    use crate::value::{ColumnKind, Row, SqlValue};

    fn orders_spec() -> ResourceSpec {
        ResourceSpec::builder("orders")
            .column("id", ColumnKind::Integer)
            .column_spec(ColumnSpec::new("user_id", ColumnKind::Integer).foreign_key())
            .column_spec(ColumnSpec::new("warehouse_id", ColumnKind::Integer).foreign_key())
            .column("total", ColumnKind::Numeric)
            .primary_key("id")
            .register()
            .expect("valid spec")
    }

    fn payload(columns: &[(&str, SqlValue)]) -> Vec<(String, SqlValue)> {
        columns
            .iter()
            .map(|(c, v)| (c.to_string(), v.clone()))
            .collect()
    }

    fn expect_violation(error: EngineError) -> Violation {
        match error {
            EngineError::ConstraintViolation(violation) => violation,
            other => panic!("expected a constraint violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn postgres_unique_parses_detail_columns() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::integrity("duplicate key value violates unique constraint")
            .with_sqlstate("23505")
            .with_detail("Key (email)=(a@x.com) already exists.");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.kind, ConstraintKind::Unique);
        assert_eq!(violation.columns, vec!["email"]);
    }

    #[tokio::test]
    async fn postgres_composite_key_detail_splits_columns() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::integrity("duplicate key value violates unique constraint")
            .with_sqlstate("23505")
            .with_detail("Key (tenant, email)=(t1, a@x.com) already exists.");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["tenant", "email"]);
    }

    #[tokio::test]
    async fn postgres_foreign_key_without_detail_falls_back_to_unknown() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::integrity("violates foreign key constraint").with_sqlstate("23503");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.kind, ConstraintKind::ForeignKey);
        assert_eq!(violation.columns, vec!["unknown"]);
    }

    #[tokio::test]
    async fn postgres_not_null_uses_structured_column() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::integrity("null value in column")
            .with_sqlstate("23502")
            .with_column("email");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.kind, ConstraintKind::NotNull);
        assert_eq!(violation.field_messages()[0].message, "Missing data for required field.");
    }

    #[tokio::test]
    async fn mysql_unique_resolves_key_through_information_schema() {
        let mut client = StubClient::new(Dialect::MySql).respond_rows(vec![
            Row::from_pairs(vec![("column_name", SqlValue::from("tenant"))]),
            Row::from_pairs(vec![("column_name", SqlValue::from("email"))]),
        ]);
        let error = DriverError::integrity(
            "Duplicate entry 'a@x.com' for key 'users.uq_users_email'",
        )
        .with_vendor_code(1062);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["tenant", "email"]);

        let lookup = &client.calls()[0].1;
        assert!(lookup.sql.contains("information_schema.key_column_usage"));
        assert_eq!(
            lookup.params,
            vec![SqlValue::from("users"), SqlValue::from("uq_users_email")]
        );
    }

    #[tokio::test]
    async fn mysql_unique_empty_lookup_falls_back_to_key_name() {
        let mut client = StubClient::new(Dialect::MySql).respond_empty();
        let error = DriverError::integrity("Duplicate entry 'x' for key 'users.email'")
            .with_vendor_code(1062);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["email"]);
    }

    #[tokio::test]
    async fn mysql_foreign_key_strips_backticks() {
        let mut client = StubClient::new(Dialect::MySql);
        let error = DriverError::integrity(
            "Cannot add or update a child row: a foreign key constraint fails \
             (`shop`.`orders`, CONSTRAINT `orders_ibfk_1` FOREIGN KEY (`user_id`) \
             REFERENCES `users` (`id`))",
        )
        .with_vendor_code(1452);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.kind, ConstraintKind::ForeignKey);
        assert_eq!(violation.columns, vec!["user_id"]);
    }

    #[tokio::test]
    async fn mysql_not_null_parses_column_from_message() {
        let mut client = StubClient::new(Dialect::MySql);
        let error =
            DriverError::integrity("Column 'email' cannot be null").with_vendor_code(1048);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["email"]);
    }

    #[tokio::test]
    async fn sqlite_unique_strips_table_prefixes() {
        let mut client = StubClient::new(Dialect::Sqlite);
        let error =
            DriverError::integrity("UNIQUE constraint failed: users.tenant, users.email");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["tenant", "email"]);
    }

    #[tokio::test]
    async fn sqlite_foreign_key_guesses_single_payload_fk() {
        let mut client = StubClient::new(Dialect::Sqlite);
        let error = DriverError::integrity("FOREIGN KEY constraint failed");
        let spec = orders_spec();

        let one = payload(&[("user_id", SqlValue::Integer(9)), ("total", SqlValue::Float(3.5))]);
        let violation = expect_violation(
            translate_constraint_error(&mut client, &spec, &one, error.clone()).await,
        );
        assert_eq!(violation.columns, vec!["user_id"]);

        // two candidate columns: cannot tell which one failed
        let two = payload(&[
            ("user_id", SqlValue::Integer(9)),
            ("warehouse_id", SqlValue::Integer(3)),
        ]);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &spec, &two, error).await);
        assert_eq!(violation.columns, vec!["unknown"]);
    }

    #[tokio::test]
    async fn sqlite_not_null_takes_column_after_table() {
        let mut client = StubClient::new(Dialect::Sqlite);
        let error = DriverError::integrity("NOT NULL constraint failed: users.email");
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.kind, ConstraintKind::NotNull);
        assert_eq!(violation.columns, vec!["email"]);
    }

    #[tokio::test]
    async fn oracle_unique_resolves_constraint_name_via_catalog() {
        let mut client = StubClient::new(Dialect::Oracle)
            .respond_row(Row::from_pairs(vec![("column_name", SqlValue::from("EMAIL"))]));
        let error = DriverError::integrity(
            "ORA-00001: unique constraint (APP.UQ_USERS_EMAIL) violated",
        )
        .with_vendor_code(1);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["email"]);

        let lookup = &client.calls()[0].1;
        assert!(lookup.sql.contains("user_cons_columns"));
        assert!(lookup.sql.contains("user_ind_columns"));
        assert_eq!(
            lookup.params,
            vec![
                SqlValue::from("UQ_USERS_EMAIL"),
                SqlValue::from("UQ_USERS_EMAIL")
            ]
        );
    }

    #[tokio::test]
    async fn oracle_not_null_lowercases_quoted_column() {
        let mut client = StubClient::new(Dialect::Oracle);
        let error = DriverError::integrity(
            r#"ORA-01400: cannot insert NULL into ("APP"."USERS"."EMAIL")"#,
        )
        .with_vendor_code(1400);
        let violation =
            expect_violation(translate_constraint_error(&mut client, &orders_spec(), &[], error).await);
        assert_eq!(violation.columns, vec!["email"]);
    }

    #[tokio::test]
    async fn non_integrity_errors_pass_through() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::new("connection reset");
        let translated =
            translate_constraint_error(&mut client, &orders_spec(), &[], error).await;
        assert!(matches!(translated, EngineError::Driver(_)));
    }

    #[tokio::test]
    async fn unmatched_dialect_passes_integrity_errors_through() {
        let mut client = StubClient::new(Dialect::Unknown);
        let error = DriverError::integrity("some integrity failure");
        let translated =
            translate_constraint_error(&mut client, &orders_spec(), &[], error).await;
        assert!(matches!(translated, EngineError::Driver(_)));
    }

    #[tokio::test]
    async fn unmatched_sqlstate_passes_through_even_when_integrity() {
        let mut client = StubClient::new(Dialect::Postgres);
        let error = DriverError::integrity("serialization failure").with_sqlstate("40001");
        let translated =
            translate_constraint_error(&mut client, &orders_spec(), &[], error).await;
        assert!(matches!(translated, EngineError::Driver(_)));
    }
}
