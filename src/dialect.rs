use serde::{Deserialize, Serialize};

/// Database dialect, fixed once at resource-registration time. Everything
/// dialect-specific in the engine (bind style, RETURNING strategy, violation
/// matching) is derived from this tag through [`Dialect::profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
    Oracle,
    Unknown,
}

/// How bind parameters are written in SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `$1`, `$2`, …
    Dollar,
    /// `?`, positional
    Question,
    /// `:p1`, `:p2`, …
    Colon,
}

/// How the affected row is recovered after INSERT/UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStrategy {
    /// Native `RETURNING` clause on the statement itself.
    Native,
    /// Execute, read the driver-reported last generated id, re-select by
    /// primary key.
    LastInsertId,
    /// No usable RETURNING and no last-insert-id for INSERT…SELECT: compile
    /// the statement in literal form and wrap it in an anonymous procedural
    /// block with one numeric out-bind (INSERT only; UPDATE falls back to
    /// predicate-based key recovery).
    ProceduralBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSyntax {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectProfile {
    pub bind_style: BindStyle,
    pub returning: ReturningStrategy,
    pub limit_syntax: LimitSyntax,
    /// Whether a constraint-violation matcher exists for this dialect.
    /// Without one, raw driver errors propagate unclassified.
    pub has_violation_matcher: bool,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Oracle => "oracle",
            Dialect::Unknown => "unknown",
        }
    }

    pub fn profile(self) -> DialectProfile {
        match self {
            Dialect::Postgres => DialectProfile {
                bind_style: BindStyle::Dollar,
                returning: ReturningStrategy::Native,
                limit_syntax: LimitSyntax::LimitOffset,
                has_violation_matcher: true,
            },
            Dialect::MySql => DialectProfile {
                bind_style: BindStyle::Question,
                returning: ReturningStrategy::LastInsertId,
                limit_syntax: LimitSyntax::LimitOffset,
                has_violation_matcher: true,
            },
            Dialect::Sqlite => DialectProfile {
                bind_style: BindStyle::Question,
                returning: ReturningStrategy::LastInsertId,
                limit_syntax: LimitSyntax::LimitOffset,
                has_violation_matcher: true,
            },
            Dialect::Oracle => DialectProfile {
                bind_style: BindStyle::Colon,
                returning: ReturningStrategy::ProceduralBlock,
                limit_syntax: LimitSyntax::OffsetFetch,
                has_violation_matcher: true,
            },
            Dialect::Unknown => DialectProfile {
                bind_style: BindStyle::Question,
                returning: ReturningStrategy::LastInsertId,
                limit_syntax: LimitSyntax::LimitOffset,
                has_violation_matcher: false,
            },
        }
    }

    pub fn supports_returning(self) -> bool {
        self.profile().returning == ReturningStrategy::Native
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
