use crate::dialect::{BindStyle, Dialect, LimitSyntax};
use crate::error::EngineError;
use crate::exec::Statement;
use crate::query::build::{DeleteQuery, InsertQuery, Order, SelectQuery, UpdateQuery};
use crate::query::predicate::{Operand, Predicate};
use crate::value::SqlValue;

/// Lowers statement builders to dialect-specific SQL text plus an ordered
/// bind-parameter list. Placeholders are emitted in text order, so parameter
/// position always matches placeholder position, including when a predicate
/// is rendered twice (outer WHERE plus appended count subquery).
#[derive(Debug, Clone, Copy)]
pub struct SqlRenderer {
    dialect: Dialect,
}

struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
    bind_style: BindStyle,
}

impl SqlWriter {
    fn new(bind_style: BindStyle) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            bind_style,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn push_param(&mut self, value: SqlValue) {
        self.params.push(value);
        let n = self.params.len();
        match self.bind_style {
            BindStyle::Dollar => {
                self.sql.push('$');
                self.sql.push_str(&n.to_string());
            }
            BindStyle::Question => self.sql.push('?'),
            BindStyle::Colon => {
                self.sql.push_str(":p");
                self.sql.push_str(&n.to_string());
            }
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

impl SqlRenderer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn select(&self, query: &SelectQuery) -> Statement {
        let mut w = SqlWriter::new(self.dialect.profile().bind_style);
        self.write_select(&mut w, query);
        w.finish()
    }

    /// `SELECT COUNT(1)` over the pre-limit form of `query`, for eager
    /// counting as a separate round trip.
    pub fn count_over(&self, query: &SelectQuery) -> Statement {
        let mut w = SqlWriter::new(self.dialect.profile().bind_style);
        w.push("SELECT COUNT(1) AS total FROM (");
        self.write_select(&mut w, &query.pre_limit());
        w.push(") count_src");
        w.finish()
    }

    pub fn insert(&self, query: &InsertQuery) -> Statement {
        let mut w = SqlWriter::new(self.dialect.profile().bind_style);
        w.push("INSERT INTO ");
        w.push(&query.table);
        w.push(" (");
        for (idx, (column, _)) in query.values.iter().enumerate() {
            if idx > 0 {
                w.push(", ");
            }
            w.push(column);
        }
        w.push(") SELECT ");
        for (idx, (_, value)) in query.values.iter().enumerate() {
            if idx > 0 {
                w.push(", ");
            }
            w.push_param(value.clone());
        }
        if self.dialect == Dialect::Oracle {
            w.push(" FROM dual");
        }
        if let Some(predicate) = &query.predicate {
            w.push(" WHERE ");
            self.write_predicate(&mut w, predicate);
        }
        if query.returning && self.dialect.supports_returning() {
            w.push(" RETURNING *");
        }
        w.finish()
    }

    /// The INSERT with every value inlined as a SQL literal. Required by the
    /// procedural-block path, which cannot mix statement binds with the block's
    /// own out-bind.
    pub fn insert_literal(&self, query: &InsertQuery) -> Result<String, EngineError> {
        let mut sql = String::from("INSERT INTO ");
        sql.push_str(&query.table);
        sql.push_str(" (");
        for (idx, (column, _)) in query.values.iter().enumerate() {
            if idx > 0 {
                sql.push_str(", ");
            }
            sql.push_str(column);
        }
        sql.push_str(") SELECT ");
        for (idx, (_, value)) in query.values.iter().enumerate() {
            if idx > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&self.literal(value)?);
        }
        if self.dialect == Dialect::Oracle {
            sql.push_str(" FROM dual");
        }
        if let Some(predicate) = &query.predicate {
            sql.push_str(" WHERE ");
            self.write_predicate_literal(&mut sql, predicate)?;
        }
        Ok(sql)
    }

    /// Anonymous procedural block wrapping the literal-form INSERT: runs it,
    /// then assigns the out-bind either the fresh sequence value (generated
    /// key) or the raw affected-row count (explicit key), and zero when
    /// nothing was inserted.
    pub fn insert_block(
        &self,
        query: &InsertQuery,
        sequence: Option<&str>,
    ) -> Result<Statement, EngineError> {
        let insert_sql = self.insert_literal(query)?;
        let result_expr = match sequence {
            Some(name) => format!("{name}.currval"),
            None => "SQL%ROWCOUNT".to_string(),
        };
        let sql = format!(
            "BEGIN\n    {insert_sql};\n    IF SQL%ROWCOUNT > 0 THEN\n        :affected := {result_expr};\n    ELSE\n        :affected := 0;\n    END IF;\nEND;"
        );
        Ok(Statement {
            sql,
            params: Vec::new(),
        })
    }

    pub fn update(&self, query: &UpdateQuery) -> Statement {
        let mut w = SqlWriter::new(self.dialect.profile().bind_style);
        w.push("UPDATE ");
        w.push(&query.table);
        w.push(" SET ");
        for (idx, (column, value)) in query.assignments.iter().enumerate() {
            if idx > 0 {
                w.push(", ");
            }
            w.push(column);
            w.push(" = ");
            w.push_param(value.clone());
        }
        if let Some(predicate) = &query.predicate {
            w.push(" WHERE ");
            self.write_predicate(&mut w, predicate);
        }
        if query.returning && self.dialect.supports_returning() {
            w.push(" RETURNING *");
        }
        w.finish()
    }

    pub fn delete(&self, query: &DeleteQuery) -> Statement {
        let mut w = SqlWriter::new(self.dialect.profile().bind_style);
        w.push("DELETE FROM ");
        w.push(&query.table);
        if let Some(predicate) = &query.predicate {
            w.push(" WHERE ");
            self.write_predicate(&mut w, predicate);
        }
        w.finish()
    }

    fn write_select(&self, w: &mut SqlWriter, query: &SelectQuery) {
        w.push("SELECT ");
        if query.columns.is_empty() {
            w.push("*");
        } else {
            for (idx, column) in query.columns.iter().enumerate() {
                if idx > 0 {
                    w.push(", ");
                }
                w.push(column);
            }
        }
        if let Some(alias) = &query.count_alias {
            w.push(", (SELECT COUNT(1) FROM (");
            self.write_select(w, &query.pre_limit());
            w.push(") count_src) AS ");
            w.push(alias);
        }
        w.push(" FROM ");
        w.push(&query.table);
        if let Some(predicate) = &query.predicate {
            w.push(" WHERE ");
            self.write_predicate(w, predicate);
        }
        if !query.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (idx, (column, order)) in query.order_by.iter().enumerate() {
                if idx > 0 {
                    w.push(", ");
                }
                w.push(column);
                w.push(match order {
                    Order::Asc => " ASC",
                    Order::Desc => " DESC",
                });
            }
        }
        self.write_truncation(w, query.limit, query.offset);
    }

    fn write_truncation(&self, w: &mut SqlWriter, limit: Option<u64>, offset: Option<u64>) {
        match self.dialect.profile().limit_syntax {
            LimitSyntax::LimitOffset => {
                match (limit, offset) {
                    (Some(limit), Some(offset)) => {
                        w.push(&format!(" LIMIT {limit} OFFSET {offset}"));
                    }
                    (Some(limit), None) => w.push(&format!(" LIMIT {limit}")),
                    (None, Some(offset)) => {
                        // OFFSET without LIMIT needs a dialect-specific stand-in
                        match self.dialect {
                            Dialect::MySql => {
                                w.push(&format!(" LIMIT 18446744073709551615 OFFSET {offset}"));
                            }
                            Dialect::Sqlite => w.push(&format!(" LIMIT -1 OFFSET {offset}")),
                            _ => w.push(&format!(" OFFSET {offset}")),
                        }
                    }
                    (None, None) => {}
                }
            }
            LimitSyntax::OffsetFetch => match (limit, offset) {
                (Some(limit), Some(offset)) => {
                    w.push(&format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"));
                }
                (Some(limit), None) => w.push(&format!(" FETCH FIRST {limit} ROWS ONLY")),
                (None, Some(offset)) => w.push(&format!(" OFFSET {offset} ROWS")),
                (None, None) => {}
            },
        }
    }

    fn write_predicate(&self, w: &mut SqlWriter, predicate: &Predicate) {
        match predicate {
            Predicate::And(children) => self.write_junction(w, children, " AND ", "1 = 1"),
            Predicate::Or(children) => self.write_junction(w, children, " OR ", "1 = 0"),
            Predicate::Not(inner) => {
                w.push("NOT (");
                self.write_predicate(w, inner);
                w.push(")");
            }
            Predicate::Cmp { left, op, right } => {
                self.write_operand(w, left);
                w.push(" ");
                w.push(op.sql());
                w.push(" ");
                self.write_operand(w, right);
            }
            Predicate::IsNull(column) => {
                w.push(column);
                w.push(" IS NULL");
            }
            Predicate::IsNotNull(column) => {
                w.push(column);
                w.push(" IS NOT NULL");
            }
            Predicate::Raw(sql) => {
                w.push("(");
                w.push(sql);
                w.push(")");
            }
        }
    }

    fn write_junction(
        &self,
        w: &mut SqlWriter,
        children: &[Predicate],
        separator: &str,
        empty: &str,
    ) {
        if children.is_empty() {
            w.push(empty);
            return;
        }
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 {
                w.push(separator);
            }
            let composite = matches!(child, Predicate::And(_) | Predicate::Or(_));
            if composite {
                w.push("(");
            }
            self.write_predicate(w, child);
            if composite {
                w.push(")");
            }
        }
    }

    fn write_operand(&self, w: &mut SqlWriter, operand: &Operand) {
        match operand {
            Operand::Column(name) => w.push(name),
            Operand::Value(value) => w.push_param(value.clone()),
        }
    }

    fn write_predicate_literal(
        &self,
        sql: &mut String,
        predicate: &Predicate,
    ) -> Result<(), EngineError> {
        match predicate {
            Predicate::And(children) => {
                self.write_junction_literal(sql, children, " AND ", "1 = 1")
            }
            Predicate::Or(children) => self.write_junction_literal(sql, children, " OR ", "1 = 0"),
            Predicate::Not(inner) => {
                sql.push_str("NOT (");
                self.write_predicate_literal(sql, inner)?;
                sql.push(')');
                Ok(())
            }
            Predicate::Cmp { left, op, right } => {
                self.write_operand_literal(sql, left)?;
                sql.push(' ');
                sql.push_str(op.sql());
                sql.push(' ');
                self.write_operand_literal(sql, right)
            }
            Predicate::IsNull(column) => {
                sql.push_str(column);
                sql.push_str(" IS NULL");
                Ok(())
            }
            Predicate::IsNotNull(column) => {
                sql.push_str(column);
                sql.push_str(" IS NOT NULL");
                Ok(())
            }
            Predicate::Raw(fragment) => {
                sql.push('(');
                sql.push_str(fragment);
                sql.push(')');
                Ok(())
            }
        }
    }

    fn write_junction_literal(
        &self,
        sql: &mut String,
        children: &[Predicate],
        separator: &str,
        empty: &str,
    ) -> Result<(), EngineError> {
        if children.is_empty() {
            sql.push_str(empty);
            return Ok(());
        }
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 {
                sql.push_str(separator);
            }
            let composite = matches!(child, Predicate::And(_) | Predicate::Or(_));
            if composite {
                sql.push('(');
            }
            self.write_predicate_literal(sql, child)?;
            if composite {
                sql.push(')');
            }
        }
        Ok(())
    }

    fn write_operand_literal(&self, sql: &mut String, operand: &Operand) -> Result<(), EngineError> {
        match operand {
            Operand::Column(name) => {
                sql.push_str(name);
                Ok(())
            }
            Operand::Value(value) => {
                sql.push_str(&self.literal(value)?);
                Ok(())
            }
        }
    }

    fn literal(&self, value: &SqlValue) -> Result<String, EngineError> {
        match value {
            SqlValue::Null => Ok("NULL".to_string()),
            SqlValue::Boolean(b) => match self.dialect {
                // no boolean literal in Oracle SQL
                Dialect::Oracle => Ok(if *b { "1" } else { "0" }.to_string()),
                _ => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            },
            SqlValue::Integer(i) => Ok(i.to_string()),
            SqlValue::Float(f) => {
                if !f.is_finite() {
                    return Err(EngineError::data_access(format!(
                        "non-finite float {f} cannot be rendered as a SQL literal"
                    )));
                }
                Ok(f.to_string())
            }
            SqlValue::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            SqlValue::Bytes(_) => Err(EngineError::data_access(
                "binary values cannot be rendered as SQL literals",
            )),
        }
    }
}
