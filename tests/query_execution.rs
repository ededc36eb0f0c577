use std::sync::Arc;

use dmrs::drivers::{InMemoryTestPool, InMemoryTestResponseBuilder};
use dmrs::query::SortOrder;
use dmrs::translator::{ER_DUP_ENTRY, ER_NO_REFERENCED_ROW};
use dmrs::type_parser::TypeParserRegistry;
use dmrs::types::{ModelDescriptor, RawValue, Record, SqlValue, UniqueKey, Value};
use dmrs::{
    ConnectionConfig, ConnectionManager, DmClient, DmError, ExecutionOutcome, InsertResult,
    NativeError, QueryIntent, QueryOptions, RelationType,
};

fn client_with(pool: &Arc<InMemoryTestPool>, config: ConnectionConfig) -> DmClient {
    // A private registry keeps parser changes from leaking across tests.
    let manager = ConnectionManager::with_registry(
        Arc::clone(pool) as Arc<dyn dmrs::ConnectionPool>,
        config,
        Arc::new(TypeParserRegistry::new()),
    );
    DmClient::with_manager(manager)
}

fn client(pool: &Arc<InMemoryTestPool>) -> DmClient {
    client_with(pool, ConnectionConfig::default())
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
}

#[tokio::test]
async fn test_select_normalizes_rows() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_response(
            InMemoryTestResponseBuilder::new()
                .typed_columns(&[
                    ("id", "BIGINT"),
                    ("name", "VARCHAR"),
                    ("settings", "JSON"),
                    ("created_at", "DATETIME"),
                ])
                .row([
                    RawValue::BigInt(1),
                    RawValue::from("Alice"),
                    RawValue::from(r#"{"theme":"dark"}"#),
                    RawValue::from("2024-01-02 03:04:05"),
                ])
                .row([RawValue::BigInt(2), RawValue::from("Bob")])
                .build(),
        ),
    );
    let config = ConnectionConfig {
        timezone: "+08:00".to_string(),
        ..Default::default()
    };
    let client = client_with(&pool, config);
    let model = Arc::new(ModelDescriptor::new("User").json_attribute("settings"));

    let records = client
        .execute(
            "SELECT id, name, settings, created_at FROM users",
            &[],
            QueryOptions::new(QueryIntent::Select).model(model),
        )
        .await
        .unwrap()
        .into_records();

    pool.assert_last_query("SELECT id, name, settings, created_at FROM users", &[]);
    assert_eq!(records.len(), 2);

    let alice = &records[0];
    assert_eq!(alice.columns(), vec!["id", "name", "settings", "created_at"]);
    assert_eq!(alice.get("id"), Some(&Value::Int(1)));
    assert_eq!(
        alice.get("settings"),
        Some(&Value::Json(serde_json::json!({"theme": "dark"})))
    );
    match alice.get("created_at") {
        Some(Value::Date(date)) => assert_eq!(date.to_rfc3339(), "2024-01-02T03:04:05+08:00"),
        other => panic!("unexpected {other:?}"),
    }

    // Short rows are padded with nulls.
    let bob = &records[1];
    assert_eq!(bob.get_str("name"), Some("Bob"));
    assert_eq!(bob.get("settings"), Some(&Value::Null));
    assert_eq!(bob.get("created_at"), Some(&Value::Null));
}

#[tokio::test]
async fn test_select_drains_streamed_columns() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_response(
            InMemoryTestResponseBuilder::new()
                .typed_columns(&[("body", "CLOB"), ("blob", "BLOB")])
                .row([
                    RawValue::stream(std::io::Cursor::new(b"hello world".to_vec())),
                    RawValue::stream(std::io::Cursor::new(vec![0xff, 0xfe])),
                ])
                .build(),
        ),
    );
    let client = client(&pool);

    let row = client
        .execute("SELECT body, blob FROM docs", &[], QueryIntent::Select)
        .await
        .unwrap()
        .single_record()
        .unwrap();

    assert_eq!(row.get_str("body"), Some("hello world"));
    assert_eq!(row.get("blob"), Some(&Value::Bytes(vec![0xff, 0xfe])));
}

#[tokio::test]
async fn test_bulk_insert_returns_identities() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_response(
            InMemoryTestResponseBuilder::new()
                .rows_affected(3)
                .insert_id(10)
                .build(),
        ),
    );
    let client = client(&pool);
    let model = Arc::new(ModelDescriptor::new("User").primary_key("id").auto_increment("id"));
    let params = vec![SqlValue::from("a"), SqlValue::from("b"), SqlValue::from("c")];

    let outcome = client
        .execute(
            "INSERT INTO users (name) VALUES (?), (?), (?)",
            &params,
            QueryOptions::new(QueryIntent::Insert).model(model),
        )
        .await
        .unwrap();

    pool.assert_last_query("INSERT INTO users (name) VALUES (?), (?), (?)", &params);
    match outcome {
        ExecutionOutcome::Inserted {
            result: InsertResult::Identities(ids),
            affected_rows,
        } => {
            assert_eq!(affected_rows, 3);
            assert_eq!(
                ids,
                vec![
                    record(&[("id", Value::Int(10))]),
                    record(&[("id", Value::Int(11))]),
                    record(&[("id", Value::Int(12))]),
                ]
            );
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_entry_becomes_unique_constraint_error() {
    let pool = Arc::new(InMemoryTestPool::new().with_error(
        NativeError::new("Duplicate entry 'ann@example.com-7' for key 'users.email_tenant'")
            .with_errno(ER_DUP_ENTRY),
    ));
    let client = client(&pool);
    let model = Arc::new(ModelDescriptor::new("User").unique_key(
        "email_tenant",
        UniqueKey::new(["email", "tenant_id"]).with_message("email already taken"),
    ));
    let params = vec![SqlValue::from("ann@example.com"), SqlValue::from(7)];

    let err = client
        .execute(
            "INSERT INTO users (email, tenant_id) VALUES (?, ?)",
            &params,
            QueryOptions::new(QueryIntent::Insert).model(model),
        )
        .await
        .unwrap_err();

    let DmError::UniqueConstraint(unique) = err else {
        panic!("expected a unique constraint error");
    };
    assert_eq!(unique.message, "email already taken");
    assert_eq!(
        unique.fields,
        vec![
            ("email".to_string(), Some("ann@example.com".to_string())),
            ("tenant_id".to_string(), Some("7".to_string())),
        ]
    );
    assert_eq!(unique.errors.len(), 2);
    assert_eq!(unique.errors[0].path, "email");
    assert_eq!(unique.sql, "INSERT INTO users (email, tenant_id) VALUES (?, ?)");
    assert_eq!(unique.parameters, params);

    // The connection is released even though the statement failed.
    assert_eq!(pool.acquire_count(), 1);
    assert_eq!(pool.close_count(), 1);
}

#[tokio::test]
async fn test_missing_parent_becomes_foreign_key_error() {
    let message = "Cannot add or update a child row: a foreign key constraint fails (`shop`.`orders`, CONSTRAINT `fk_orders_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`))";
    let pool = Arc::new(
        InMemoryTestPool::new().with_error(NativeError::new(message).with_errno(ER_NO_REFERENCED_ROW)),
    );
    let client = client(&pool);
    let instance = record(&[("user_id", Value::Int(404))]);

    let err = client
        .execute(
            "INSERT INTO orders (user_id) VALUES (?)",
            &[SqlValue::from(404)],
            QueryOptions::new(QueryIntent::Insert).instance(instance),
        )
        .await
        .unwrap_err();

    let DmError::ForeignKeyConstraint(fk) = err else {
        panic!("expected a foreign key constraint error");
    };
    assert_eq!(fk.reltype, RelationType::Child);
    assert_eq!(fk.table.as_deref(), Some("users"));
    assert_eq!(fk.fields, Some(vec!["user_id".to_string()]));
    assert_eq!(fk.referenced_fields, Some(vec!["id".to_string()]));
    assert_eq!(fk.index.as_deref(), Some("fk_orders_user"));
    assert_eq!(fk.value, Some(Value::Int(404)));
}

#[tokio::test]
async fn test_unclassified_error_keeps_statement_context() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_error(NativeError::new("Deadlock found").with_errno(1213)),
    );
    let client = client(&pool);

    let err = client
        .execute("UPDATE users SET n = n + 1", &[], QueryIntent::BulkUpdate)
        .await
        .unwrap_err();

    let DmError::Database(db) = err else {
        panic!("expected a database error");
    };
    assert!(db.is_deadlock());
    assert_eq!(db.sql, "UPDATE users SET n = n + 1");
}

#[tokio::test]
async fn test_warnings_are_fetched_after_select() {
    let pool = Arc::new(
        InMemoryTestPool::new()
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["n"])
                    .row([RawValue::from("1")])
                    .warnings(1)
                    .build(),
            )
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["Level", "Code", "Message"])
                    .row([
                        RawValue::from("Warning"),
                        RawValue::from("1292"),
                        RawValue::from("Truncated incorrect value"),
                    ])
                    .build(),
            ),
    );
    let client = client(&pool);

    let records = client
        .execute(
            "SELECT n FROM t",
            &[],
            QueryOptions::new(QueryIntent::Select).show_warnings(true),
        )
        .await
        .unwrap()
        .into_records();

    assert_eq!(records, vec![record(&[("n", Value::from("1"))])]);
    pool.assert_query_count(2);
    pool.assert_last_query("SHOW WARNINGS", &[]);
}

#[tokio::test]
async fn test_failed_warning_fetch_does_not_fail_statement() {
    let pool = Arc::new(
        InMemoryTestPool::new()
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["n"])
                    .row([RawValue::from("1")])
                    .warnings(2)
                    .build(),
            )
            .with_error(NativeError::new("SHOW WARNINGS not supported")),
    );
    let config = ConnectionConfig {
        show_warnings: true,
        ..Default::default()
    };
    let client = client_with(&pool, config);

    let outcome = client.execute("SELECT n FROM t", &[], QueryIntent::Select).await;

    assert_eq!(outcome.unwrap().into_records().len(), 1);
    pool.assert_query_count(2);
}

#[tokio::test]
async fn test_warnings_skipped_for_writes_and_when_disabled() {
    let pool = Arc::new(
        InMemoryTestPool::new()
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .rows_affected(1)
                    .warnings(1)
                    .build(),
            )
            .with_response(
                InMemoryTestResponseBuilder::new()
                    .columns(&["n"])
                    .row([RawValue::from("1")])
                    .warnings(1)
                    .build(),
            ),
    );
    let client = client(&pool);

    client
        .execute(
            "UPDATE t SET n = 1",
            &[],
            QueryOptions::new(QueryIntent::BulkUpdate).show_warnings(true),
        )
        .await
        .unwrap();
    client
        .execute("SELECT n FROM t", &[], QueryIntent::Select)
        .await
        .unwrap();

    pool.assert_query_count(2);
    pool.assert_last_query("SELECT n FROM t", &[]);
}

#[tokio::test]
async fn test_show_indexes_orders_fields_by_sequence() {
    let index_row = |key: &str, column: &str, seq: i64, non_unique: i64| {
        [
            RawValue::from(key),
            RawValue::from("orders"),
            RawValue::from(column),
            RawValue::Int(seq),
            RawValue::Null,
            RawValue::from("A"),
            RawValue::Int(non_unique),
            RawValue::from("BTREE"),
        ]
    };
    let pool = Arc::new(
        InMemoryTestPool::new().with_response(
            InMemoryTestResponseBuilder::new()
                .columns(&[
                    "Key_name",
                    "Table",
                    "Column_name",
                    "Seq_in_index",
                    "Sub_part",
                    "Collation",
                    "Non_unique",
                    "Index_type",
                ])
                .row(index_row("idx_user_date", "created_at", 2, 1))
                .row(index_row("PRIMARY", "id", 1, 0))
                .row(index_row("idx_user_date", "user_id", 1, 1))
                .build(),
        ),
    );
    let client = client(&pool);

    let outcome = client
        .execute("SHOW INDEX FROM orders", &[], QueryIntent::ShowIndexes)
        .await
        .unwrap();

    let ExecutionOutcome::Indexes(indexes) = outcome else {
        panic!("expected index descriptors");
    };
    assert_eq!(indexes.len(), 2);

    let composite = &indexes[0];
    assert_eq!(composite.name, "idx_user_date");
    assert!(!composite.primary);
    assert!(!composite.unique);
    let attributes: Vec<&str> = composite.fields.iter().map(|f| f.attribute.as_str()).collect();
    assert_eq!(attributes, vec!["user_id", "created_at"]);
    assert_eq!(composite.fields[0].order, Some(SortOrder::Asc));

    let primary = &indexes[1];
    assert!(primary.primary);
    assert!(primary.unique);
    assert_eq!(primary.table_name, "orders");
}

#[tokio::test]
async fn test_describe_rekeys_by_field() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_response(
            InMemoryTestResponseBuilder::new()
                .columns(&["Field", "Type", "Null", "Key", "Default", "Extra"])
                .row([
                    RawValue::from("id"),
                    RawValue::from("int(11)"),
                    RawValue::from("NO"),
                    RawValue::from("PRI"),
                    RawValue::Null,
                    RawValue::from("auto_increment"),
                ])
                .row([
                    RawValue::from("state"),
                    RawValue::from("enum('a','b')"),
                    RawValue::from("YES"),
                    RawValue::from(""),
                    RawValue::from("a"),
                    RawValue::from(""),
                ])
                .build(),
        ),
    );
    let client = client(&pool);

    let outcome = client
        .execute("DESCRIBE users", &[], QueryIntent::Describe)
        .await
        .unwrap();

    let ExecutionOutcome::Description(description) = outcome else {
        panic!("expected a table description");
    };
    let id = description.get("id").unwrap();
    assert_eq!(id.type_name, "INT(11)");
    assert!(id.primary_key);
    assert!(id.auto_increment);
    assert!(!id.allow_null);

    let state = description.get("state").unwrap();
    assert_eq!(state.type_name, "ENUM('a','b')");
    assert!(state.allow_null);
    assert_eq!(state.default_value, Value::from("a"));
}

#[tokio::test]
async fn test_connection_released_after_each_statement() {
    let pool = Arc::new(InMemoryTestPool::new());
    let client = client(&pool);

    for _ in 0..3 {
        client
            .execute("SELECT 1", &[], QueryIntent::Select)
            .await
            .unwrap();
    }

    assert_eq!(pool.acquire_count(), 3);
    assert_eq!(pool.close_count(), 3);
}

#[tokio::test]
async fn test_release_failure_does_not_mask_outcome() {
    let pool = Arc::new(
        InMemoryTestPool::new()
            .with_close_error(NativeError::new("socket already gone"))
            .with_response(InMemoryTestResponseBuilder::new().rows_affected(2).build()),
    );
    let client = client(&pool);

    let outcome = client
        .execute("DELETE FROM t", &[], QueryIntent::BulkDelete)
        .await
        .unwrap();

    assert_eq!(outcome.affected_rows(), Some(2));
    assert_eq!(pool.close_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_connection_error() {
    let pool = Arc::new(
        InMemoryTestPool::new().with_connect_error(NativeError::new("connection refused")),
    );
    let client = client(&pool);

    let err = client
        .execute("SELECT 1", &[], QueryIntent::Select)
        .await
        .unwrap_err();

    assert!(matches!(err, DmError::Connection(ref e) if e.message == "connection refused"));
    pool.assert_query_count(0);
}

#[tokio::test]
async fn test_connect_options_follow_config() {
    let pool = Arc::new(InMemoryTestPool::new());
    let config = ConnectionConfig {
        host: "dm.internal".to_string(),
        port: 5237,
        username: "SYSDBA".to_string(),
        password: Some("secret".to_string()),
        timezone: "+08:00".to_string(),
        ..Default::default()
    };
    let client = client_with(&pool, config);

    client
        .execute("SELECT 1", &[], QueryIntent::Select)
        .await
        .unwrap();

    let options = pool.last_options().unwrap();
    assert_eq!(options.connect_string, "dm.internal:5237");
    assert_eq!(options.user, "SYSDBA");
    assert_eq!(options.timezone, "+08:00");
    assert_eq!(options.flags, "-FOUND_ROWS");
    assert!(options.support_big_numbers);
    assert!(!options.big_number_strings);
    assert!(!format!("{options:?}").contains("secret"));
}

#[tokio::test]
async fn test_custom_type_parser_and_clear() {
    let response = || {
        InMemoryTestResponseBuilder::new()
            .typed_columns(&[("flag", "BIT"), ("created_at", "DATETIME")])
            .row([RawValue::from("1"), RawValue::from("2024-01-02 03:04:05")])
            .build()
    };
    let pool = Arc::new(InMemoryTestPool::new().with_responses([response(), response()]));
    let client = client(&pool);

    client.register_type_parser(
        "bit",
        Arc::new(|field: &dmrs::CastField<'_>, _: &dmrs::CastOptions| {
            RawValue::Bool(field.string().as_deref() == Some("1"))
        }),
    );

    let row = client
        .execute("SELECT flag, created_at FROM t", &[], QueryIntent::Select)
        .await
        .unwrap()
        .single_record()
        .unwrap();
    assert_eq!(row.get("flag"), Some(&Value::Bool(true)));
    assert!(matches!(row.get("created_at"), Some(Value::Date(_))));

    client.clear_type_parsers();

    let row = client
        .execute("SELECT flag, created_at FROM t", &[], QueryIntent::Select)
        .await
        .unwrap()
        .single_record()
        .unwrap();
    assert_eq!(row.get_str("flag"), Some("1"));
    assert_eq!(row.get_str("created_at"), Some("2024-01-02 03:04:05"));
}

#[tokio::test]
async fn test_version_is_fixed() {
    let pool = Arc::new(InMemoryTestPool::new());
    let client = client(&pool);

    let outcome = client
        .execute("SELECT VERSION()", &[], QueryIntent::Version)
        .await
        .unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Version("1.0.0")));
}
