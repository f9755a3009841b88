use serde::Serialize;
use thiserror::Error;

use crate::exec::DriverError;
use crate::violation::{ConstraintKind, Violation};

/// One field-level problem detected while validating request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    AuthorizationFailure,
    NotFound,
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    Validation,
    Registration,
    DataAccess,
}

impl EngineErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineErrorCode::AuthorizationFailure => "authorization_failure",
            EngineErrorCode::NotFound => "not_found",
            EngineErrorCode::UniqueViolation => "unique_violation",
            EngineErrorCode::ForeignKeyViolation => "foreign_key_violation",
            EngineErrorCode::NotNullViolation => "not_null_violation",
            EngineErrorCode::Validation => "validation",
            EngineErrorCode::Registration => "registration",
            EngineErrorCode::DataAccess => "data_access",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The mutation affected zero rows. Deliberately ambiguous between "row
    /// does not exist" and "row excluded by the permission predicate".
    #[error("not authorized to perform this mutation")]
    AuthorizationFailure,
    #[error("no row in '{table}' matched the requested key")]
    NotFound { table: String },
    #[error("constraint violation: {0}")]
    ConstraintViolation(Violation),
    #[error("invalid request parameters: {errors:?}")]
    Validation { errors: Vec<FieldError> },
    #[error("resource registration error: {message}")]
    Registration { message: String },
    /// An UPDATE predicate carried no equality on the primary-key column, so
    /// the mutated row cannot be re-selected on a non-returning dialect.
    #[error("cannot recover primary key for update on '{table}'")]
    PrimaryKeyUnrecoverable { table: String },
    #[error("data access error: {0}")]
    Driver(#[from] DriverError),
    #[error("data access error: {message}")]
    DataAccess { message: String },
}

impl EngineError {
    pub fn registration(message: impl Into<String>) -> Self {
        EngineError::Registration {
            message: message.into(),
        }
    }

    pub fn data_access(message: impl Into<String>) -> Self {
        EngineError::DataAccess {
            message: message.into(),
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        EngineError::Validation { errors }
    }

    pub fn code(&self) -> EngineErrorCode {
        match self {
            EngineError::AuthorizationFailure => EngineErrorCode::AuthorizationFailure,
            EngineError::NotFound { .. } => EngineErrorCode::NotFound,
            EngineError::ConstraintViolation(violation) => match violation.kind {
                ConstraintKind::Unique => EngineErrorCode::UniqueViolation,
                ConstraintKind::ForeignKey => EngineErrorCode::ForeignKeyViolation,
                ConstraintKind::NotNull => EngineErrorCode::NotNullViolation,
            },
            EngineError::Validation { .. } => EngineErrorCode::Validation,
            EngineError::Registration { .. } => EngineErrorCode::Registration,
            EngineError::PrimaryKeyUnrecoverable { .. } => EngineErrorCode::DataAccess,
            EngineError::Driver(_) => EngineErrorCode::DataAccess,
            EngineError::DataAccess { .. } => EngineErrorCode::DataAccess,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// HTTP status the surrounding layer conventionally maps this error to.
    /// Unique and not-null violations are client input problems (400); a
    /// foreign-key violation means the referenced resource is absent (404).
    pub fn suggested_status(&self) -> u16 {
        match self {
            EngineError::AuthorizationFailure => 403,
            EngineError::NotFound { .. } => 404,
            EngineError::ConstraintViolation(violation) => match violation.kind {
                ConstraintKind::Unique | ConstraintKind::NotNull => 400,
                ConstraintKind::ForeignKey => 404,
            },
            EngineError::Validation { .. } => 400,
            EngineError::Registration { .. } => 500,
            EngineError::PrimaryKeyUnrecoverable { .. } => 500,
            EngineError::Driver(_) => 500,
            EngineError::DataAccess { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineError, EngineErrorCode};
    use crate::violation::{ConstraintKind, Violation};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(
            EngineErrorCode::AuthorizationFailure.as_str(),
            "authorization_failure"
        );
        assert_eq!(EngineErrorCode::UniqueViolation.as_str(), "unique_violation");
        assert_eq!(EngineErrorCode::DataAccess.as_str(), "data_access");
    }

    #[test]
    fn violation_code_follows_constraint_kind() {
        let err = EngineError::ConstraintViolation(Violation::new(
            ConstraintKind::ForeignKey,
            vec!["user_id".to_string()],
        ));
        assert_eq!(err.code(), EngineErrorCode::ForeignKeyViolation);
        assert_eq!(err.code_str(), "foreign_key_violation");
        assert_eq!(err.suggested_status(), 404);
    }

    #[test]
    fn status_table_matches_error_classes() {
        assert_eq!(EngineError::AuthorizationFailure.suggested_status(), 403);
        assert_eq!(
            EngineError::NotFound {
                table: "users".into()
            }
            .suggested_status(),
            404
        );
        assert_eq!(
            EngineError::ConstraintViolation(Violation::new(
                ConstraintKind::Unique,
                vec!["email".into()]
            ))
            .suggested_status(),
            400
        );
        assert_eq!(
            EngineError::PrimaryKeyUnrecoverable {
                table: "users".into()
            }
            .suggested_status(),
            500
        );
    }
}
