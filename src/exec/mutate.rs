//! Mutation executor: INSERT, UPDATE and DELETE with the caller's permission
//! predicate folded into the statement itself.
//!
//! Every INSERT takes the `INSERT ... SELECT ... WHERE <permission>` shape and
//! every UPDATE/DELETE carries the permission predicate in its WHERE clause,
//! so an unauthorized mutation simply affects zero rows. Zero rows is reported
//! as [`EngineError::AuthorizationFailure`] without distinguishing a missing
//! row from a denied one.
//!
//! Create and update resolve to the full mutated row. How depends on the
//! dialect: `RETURNING` where the server has it, last-insert-id plus a pk
//! re-select elsewhere, and an anonymous procedural block for inserts on
//! dialects that cannot combine `INSERT ... SELECT` with key return.

use tracing::debug;

use crate::dialect::ReturningStrategy;
use crate::error::{EngineError, FieldError};
use crate::exec::{Client, ExecOutcome, Statement};
use crate::query::build::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::query::predicate::{Predicate, col, lit};
use crate::query::render::SqlRenderer;
use crate::resource::ResourceSpec;
use crate::value::{Row, SqlValue};
use crate::violation::translate_constraint_error;

/// Inserts one row built from `payload` (after column defaults are merged),
/// gated by `permission`, and returns the stored row.
pub async fn create(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    payload: Vec<(String, SqlValue)>,
    permission: Option<Predicate>,
) -> Result<Row, EngineError> {
    let values = spec.defaulted_payload(&payload);
    if values.is_empty() {
        return Err(EngineError::validation(vec![FieldError::new(
            "payload",
            "must not be empty",
        )]));
    }

    let mut insert = InsertQuery::into_table(spec.table()).values(values.clone());
    if let Some(permission) = permission {
        insert = insert.and_where(permission);
    }

    let renderer = SqlRenderer::new(client.dialect());
    match client.dialect().profile().returning {
        ReturningStrategy::Native => {
            let statement = renderer.insert(&insert.clone().returning(true));
            let row = fetch_optional(client, spec, &values, &statement).await?;
            row.ok_or(EngineError::AuthorizationFailure)
        }
        ReturningStrategy::LastInsertId => {
            create_by_last_insert_id(client, spec, &values, &insert, &renderer).await
        }
        ReturningStrategy::ProceduralBlock => {
            create_by_procedural_block(client, spec, &values, &insert, &renderer).await
        }
    }
}

async fn create_by_last_insert_id(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    values: &[(String, SqlValue)],
    insert: &InsertQuery,
    renderer: &SqlRenderer,
) -> Result<Row, EngineError> {
    let statement = renderer.insert(insert);
    let outcome = execute(client, spec, values, &statement).await?;
    if outcome.rows_affected == 0 {
        return Err(EngineError::AuthorizationFailure);
    }

    // an explicit key in the payload beats the driver-reported rowid
    let pk = insert
        .explicit_value(spec.primary_key())
        .cloned()
        .or(outcome.last_insert_id.map(SqlValue::Integer));
    let Some(pk) = pk else {
        return Err(EngineError::PrimaryKeyUnrecoverable {
            table: spec.table().to_string(),
        });
    };
    debug!(table = %spec.table(), "insert applied, re-selecting by key");
    reselect_by_pk(client, spec, pk).await
}

async fn create_by_procedural_block(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    values: &[(String, SqlValue)],
    insert: &InsertQuery,
    renderer: &SqlRenderer,
) -> Result<Row, EngineError> {
    let statement = renderer.insert_block(insert, spec.sequence())?;
    let scalar = match client.execute_scalar_block(&statement).await {
        Ok(scalar) => scalar,
        Err(error) => return Err(translate_constraint_error(client, spec, values, error).await),
    };
    if scalar == 0 {
        return Err(EngineError::AuthorizationFailure);
    }

    // out-bind carries the fresh sequence value; without a sequence it is
    // just the row count and the key must come from the payload
    let pk = if spec.sequence().is_some() {
        SqlValue::Integer(scalar)
    } else {
        insert
            .explicit_value(spec.primary_key())
            .cloned()
            .ok_or_else(|| EngineError::PrimaryKeyUnrecoverable {
                table: spec.table().to_string(),
            })?
    };
    debug!(table = %spec.table(), "insert block applied, re-selecting by key");
    reselect_by_pk(client, spec, pk).await
}

/// Applies `payload` to the rows selected by `predicate` (the key condition
/// with the permission predicate already folded in) and returns the mutated
/// row.
pub async fn update(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    payload: Vec<(String, SqlValue)>,
    predicate: Predicate,
) -> Result<Row, EngineError> {
    if payload.is_empty() {
        return Err(EngineError::validation(vec![FieldError::new(
            "payload",
            "must not be empty",
        )]));
    }

    let query = UpdateQuery::table(spec.table())
        .assignments(payload.clone())
        .and_where(predicate.clone());
    let renderer = SqlRenderer::new(client.dialect());

    if client.dialect().profile().returning == ReturningStrategy::Native {
        let statement = renderer.update(&query.returning(true));
        let row = fetch_optional(client, spec, &payload, &statement).await?;
        return row.ok_or(EngineError::AuthorizationFailure);
    }

    let statement = renderer.update(&query);
    let outcome = execute(client, spec, &payload, &statement).await?;
    if outcome.rows_affected == 0 {
        return Err(EngineError::AuthorizationFailure);
    }

    let pk = predicate
        .primary_key_value(spec.primary_key())
        .cloned()
        .ok_or_else(|| EngineError::PrimaryKeyUnrecoverable {
            table: spec.table().to_string(),
        })?;
    debug!(table = %spec.table(), rows = outcome.rows_affected,
           "update applied, re-selecting by key");
    reselect_by_pk(client, spec, pk).await
}

/// Deletes the rows selected by `predicate`. Zero affected rows reports as an
/// authorization failure, exactly like the other mutations.
pub async fn delete(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    predicate: Predicate,
) -> Result<(), EngineError> {
    let query = DeleteQuery::from(spec.table()).and_where(predicate);
    let statement = SqlRenderer::new(client.dialect()).delete(&query);
    let outcome = execute(client, spec, &[], &statement).await?;
    if outcome.rows_affected == 0 {
        return Err(EngineError::AuthorizationFailure);
    }
    debug!(table = %spec.table(), rows = outcome.rows_affected, "delete applied");
    Ok(())
}

/// Plain primary-key select, in the same session as the mutation it follows.
/// The permission predicate already ran against the mutation, so it is not
/// re-applied here.
async fn reselect_by_pk(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    pk: SqlValue,
) -> Result<Row, EngineError> {
    let query =
        SelectQuery::from(spec.table()).and_where(Predicate::eq(col(spec.primary_key()), lit(pk)));
    let statement = SqlRenderer::new(client.dialect()).select(&query);
    match client.fetch_optional(&statement).await {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(EngineError::data_access(format!(
            "mutated row in '{}' could not be re-selected",
            spec.table()
        ))),
        Err(error) => Err(EngineError::Driver(error)),
    }
}

async fn execute(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    payload: &[(String, SqlValue)],
    statement: &Statement,
) -> Result<ExecOutcome, EngineError> {
    match client.execute(statement).await {
        Ok(outcome) => Ok(outcome),
        Err(error) => Err(translate_constraint_error(client, spec, payload, error).await),
    }
}

async fn fetch_optional(
    client: &mut dyn Client,
    spec: &ResourceSpec,
    payload: &[(String, SqlValue)],
    statement: &Statement,
) -> Result<Option<Row>, EngineError> {
    match client.fetch_optional(statement).await {
        Ok(row) => Ok(row),
        Err(error) => Err(translate_constraint_error(client, spec, payload, error).await),
    }
}
