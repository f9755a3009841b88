use rowguard::exec::stub::{CallKind, StubClient};
use rowguard::query::predicate::{Predicate, col, lit};
use rowguard::{ColumnKind, Dialect, EngineConfig, EngineErrorCode, Resource, ResourceSpec, Row, SqlValue};

fn tickets_spec() -> ResourceSpec {
    ResourceSpec::builder("tickets")
        .primary_key("id")
        .column("id", ColumnKind::Integer)
        .column("title", ColumnKind::Text)
        .column("owner", ColumnKind::Text)
        .register()
        .expect("valid spec")
}

fn owned_tickets() -> Resource {
    Resource::builder(tickets_spec())
        .read_permission(|scope| {
            scope
                .caller
                .map(|caller| Predicate::eq(col("owner"), lit(caller)))
        })
        .register(&EngineConfig::default())
        .expect("registered resource")
}

fn sequenced_tickets() -> Resource {
    let spec = ResourceSpec::builder("tickets")
        .primary_key("id")
        .sequence("tickets_seq")
        .column("id", ColumnKind::Integer)
        .column("title", ColumnKind::Text)
        .column("owner", ColumnKind::Text)
        .register()
        .expect("valid spec");
    Resource::builder(spec)
        .create_permission(|scope| {
            // only rows naming the caller as owner may be inserted
            let owner = scope
                .payload
                .iter()
                .find(|(column, _)| column == "owner")
                .map(|(_, value)| value.clone())?;
            Some(Predicate::eq(lit(owner), lit(scope.caller?)))
        })
        .register(&EngineConfig::default())
        .expect("registered resource")
}

fn ticket_row(id: i64, title: &str) -> Row {
    Row::from_pairs(vec![
        ("id", SqlValue::Integer(id)),
        ("title", SqlValue::Text(title.into())),
        ("owner", SqlValue::Text("alice".into())),
    ])
}

fn payload(pairs: &[(&str, SqlValue)]) -> Vec<(String, SqlValue)> {
    pairs
        .iter()
        .map(|(c, v)| (c.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn postgres_mutations_run_as_single_returning_statements() {
    let tickets = owned_tickets();

    let mut client = StubClient::new(Dialect::Postgres).respond_row(ticket_row(1, "fix the pump"));
    let created = tickets
        .create(
            &mut client,
            Some("alice"),
            payload(&[
                ("title", SqlValue::from("fix the pump")),
                ("owner", SqlValue::from("alice")),
            ]),
        )
        .await
        .expect("created");
    assert_eq!(created.get("id"), Some(&SqlValue::Integer(1)));
    assert_eq!(client.calls().len(), 1, "no follow-up select on RETURNING dialects");
    assert_eq!(client.calls()[0].0, CallKind::FetchOptional);
    assert_eq!(
        client.sql(0),
        Some("INSERT INTO tickets (title, owner) SELECT $1, $2 RETURNING *")
    );

    let mut client = StubClient::new(Dialect::Postgres).respond_row(ticket_row(1, "replace the pump"));
    tickets
        .update(
            &mut client,
            Some("alice"),
            1,
            payload(&[("title", SqlValue::from("replace the pump"))]),
        )
        .await
        .expect("updated");
    assert_eq!(client.calls().len(), 1);
    assert_eq!(
        client.sql(0),
        Some("UPDATE tickets SET title = $1 WHERE id = $2 AND owner = $3 RETURNING *")
    );
}

#[tokio::test]
async fn mysql_create_reselects_through_driver_generated_key() {
    let tickets = owned_tickets();
    let mut client = StubClient::new(Dialect::MySql)
        .respond_outcome(1, Some(12))
        .respond_row(ticket_row(12, "fix the pump"));

    let created = tickets
        .create(
            &mut client,
            Some("alice"),
            payload(&[("title", SqlValue::from("fix the pump"))]),
        )
        .await
        .expect("created");
    assert_eq!(created.get("id"), Some(&SqlValue::Integer(12)));

    assert_eq!(client.calls()[0].0, CallKind::Execute);
    assert_eq!(client.sql(0), Some("INSERT INTO tickets (title) SELECT ?"));
    let (kind, reselect) = &client.calls()[1];
    assert_eq!(*kind, CallKind::FetchOptional);
    assert_eq!(reselect.sql, "SELECT * FROM tickets WHERE id = ?");
    assert_eq!(reselect.params, vec![SqlValue::Integer(12)]);
}

#[tokio::test]
async fn explicit_payload_key_wins_over_generated_key() {
    let tickets = owned_tickets();
    let mut client = StubClient::new(Dialect::Sqlite)
        .respond_outcome(1, Some(999))
        .respond_row(ticket_row(5, "imported"));

    tickets
        .create(
            &mut client,
            None,
            payload(&[
                ("id", SqlValue::Integer(5)),
                ("title", SqlValue::from("imported")),
            ]),
        )
        .await
        .expect("created with caller-chosen key");

    let (_, reselect) = &client.calls()[1];
    assert_eq!(reselect.params, vec![SqlValue::Integer(5)]);
}

#[tokio::test]
async fn oracle_create_compiles_literal_block_with_permission_inline() {
    let tickets = sequenced_tickets();
    let mut client = StubClient::new(Dialect::Oracle)
        .respond_scalar(31)
        .respond_row(ticket_row(31, "fix the pump"));

    let created = tickets
        .create(
            &mut client,
            Some("alice"),
            payload(&[
                ("title", SqlValue::from("fix the pump")),
                ("owner", SqlValue::from("alice")),
            ]),
        )
        .await
        .expect("created");
    assert_eq!(created.get("id"), Some(&SqlValue::Integer(31)));

    let (kind, block) = &client.calls()[0];
    assert_eq!(*kind, CallKind::ScalarBlock);
    assert!(block.sql.starts_with("BEGIN\n"));
    assert!(block.sql.contains(
        "INSERT INTO tickets (title, owner) SELECT 'fix the pump', 'alice' FROM dual \
         WHERE 'alice' = 'alice';"
    ));
    assert!(block.sql.contains(":affected := tickets_seq.currval;"));
    assert!(block.params.is_empty(), "block carries no statement binds");

    let (kind, reselect) = &client.calls()[1];
    assert_eq!(*kind, CallKind::FetchOptional);
    assert_eq!(reselect.sql, "SELECT * FROM tickets WHERE id = :p1");
    assert_eq!(reselect.params, vec![SqlValue::Integer(31)]);
}

#[tokio::test]
async fn oracle_zero_scalar_reports_authorization_failure() {
    let tickets = sequenced_tickets();
    let mut client = StubClient::new(Dialect::Oracle).respond_scalar(0);

    let err = tickets
        .create(
            &mut client,
            Some("mallory"),
            payload(&[
                ("title", SqlValue::from("hijack")),
                ("owner", SqlValue::from("alice")),
            ]),
        )
        .await
        .expect_err("permission comparison excluded the insert");
    assert_eq!(err.code(), EngineErrorCode::AuthorizationFailure);
    assert_eq!(err.suggested_status(), 403);

    let block = client.sql(0).expect("block ran");
    assert!(block.contains("WHERE 'alice' = 'mallory'"));
    assert_eq!(client.calls().len(), 1, "no re-select after a refused insert");
}

#[tokio::test]
async fn oracle_update_recovers_key_from_the_predicate() {
    let tickets = owned_tickets();
    let mut client = StubClient::new(Dialect::Oracle)
        .respond_outcome(1, None)
        .respond_row(ticket_row(7, "escalated"));

    tickets
        .update(
            &mut client,
            Some("alice"),
            7,
            payload(&[("title", SqlValue::from("escalated"))]),
        )
        .await
        .expect("updated");

    assert_eq!(
        client.sql(0),
        Some("UPDATE tickets SET title = :p1 WHERE id = :p2 AND owner = :p3")
    );
    let (_, reselect) = &client.calls()[1];
    assert_eq!(reselect.sql, "SELECT * FROM tickets WHERE id = :p1");
    assert_eq!(reselect.params, vec![SqlValue::Integer(7)]);
}

#[tokio::test]
async fn unknown_dialect_create_without_key_source_is_a_data_access_error() {
    let tickets = owned_tickets();
    // driver reports success but no generated key, and the payload has none
    let mut client = StubClient::new(Dialect::Unknown).respond_outcome(1, None);

    let err = tickets
        .create(
            &mut client,
            None,
            payload(&[("title", SqlValue::from("orphaned"))]),
        )
        .await
        .expect_err("no way to re-select the inserted row");
    assert_eq!(err.code(), EngineErrorCode::DataAccess);
    assert_eq!(err.code_str(), "data_access");
    assert_eq!(err.suggested_status(), 500);
}

#[tokio::test]
async fn delete_runs_one_statement_and_maps_zero_rows_to_forbidden() {
    let tickets = owned_tickets();
    let mut client = StubClient::new(Dialect::MySql).respond_outcome(0, None);

    let err = tickets
        .delete(&mut client, Some("bob"), 7)
        .await
        .expect_err("row absent or not bob's");
    assert_eq!(err.code(), EngineErrorCode::AuthorizationFailure);

    assert_eq!(client.calls().len(), 1);
    assert_eq!(
        client.sql(0),
        Some("DELETE FROM tickets WHERE id = ? AND owner = ?")
    );
}
