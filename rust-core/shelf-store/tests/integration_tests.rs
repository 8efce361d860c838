// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for record stores over the in-memory engine.
//!
//! Exercise the full path: declaration → registry → lazy open/migration →
//! codec → engine transaction → decoded result.

use chrono::{TimeZone, Utc};
use shelf_engine::{InMemoryEngine, StorageError};
use shelf_schema::{
    FieldSpec, Record, RecordKey, RecordQuery, RecordTypeDecl, SchemaError, Value,
};
use shelf_store::{OperationKind, RecordStore, Selection, Shelf, ShelfConfig, ShelfError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn create_shelf() -> Shelf<InMemoryEngine> {
    init_tracing();
    Shelf::new(InMemoryEngine::new(), ShelfConfig::new("test"))
}

fn users_decl() -> RecordTypeDecl {
    RecordTypeDecl::new("users")
        .field(FieldSpec::new("id").primary_key())
        .field(FieldSpec::new("name"))
        .field(FieldSpec::new("age"))
        .field(FieldSpec::new("bio").no_index())
}

fn user(id: &str, name: &str, age: i64) -> Record {
    Record::new()
        .with("id", id)
        .with("name", name)
        .with("age", age)
}

async fn seeded_users(shelf: &Shelf<InMemoryEngine>) -> RecordStore<InMemoryEngine> {
    let users = shelf.register(users_decl()).unwrap();
    for (id, name, age) in [
        ("u3", "Cleo", 41),
        ("u1", "Ada", 36),
        ("u5", "Eve", 19),
        ("u2", "Bo", 36),
        ("u4", "Dan", 27),
    ] {
        users.insert(user(id, name, age)).await.unwrap();
    }
    users
}

// ===========================================================================
// CRUD
// ===========================================================================

#[tokio::test]
async fn test_insert_then_select_returns_record_unchanged() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();

    let record = user("u1", "Ada", 36).with("bio", "Analyst");
    users.insert(record.clone()).await.unwrap();

    let found = users.select("u1", None).await.unwrap();
    assert_eq!(found, Some(record));
}

#[tokio::test]
async fn test_duplicate_insert_fails_and_keeps_prior_record() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();
    users.insert(user("u1", "Ada", 36)).await.unwrap();

    let err = users.insert(user("u1", "Impostor", 99)).await.unwrap_err();
    match &err {
        ShelfError::Operation {
            store,
            operation,
            source,
        } => {
            assert_eq!(store, "users");
            assert_eq!(*operation, OperationKind::Insert);
            assert!(matches!(source, StorageError::KeyExists { .. }));
        }
        other => panic!("expected Operation error, got {other:?}"),
    }

    let found = users.select("u1", None).await.unwrap().unwrap();
    assert_eq!(found.get("name"), Some(&Value::from("Ada")));
}

#[tokio::test]
async fn test_update_upserts_and_replaces_fully() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();

    // Missing key: behaves as insert.
    users.update(user("u9", "Ivy", 30)).await.unwrap();
    assert_eq!(
        users.select("u9", None).await.unwrap(),
        Some(user("u9", "Ivy", 30))
    );

    // Existing key: full replacement, dropped fields disappear.
    users
        .update(user("u9", "Ivy", 30).with("bio", "Writer"))
        .await
        .unwrap();
    users
        .update(Record::new().with("id", "u9").with("name", "Ivy R."))
        .await
        .unwrap();
    let replaced = users.select("u9", None).await.unwrap().unwrap();
    assert_eq!(replaced, Record::new().with("id", "u9").with("name", "Ivy R."));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();
    users.insert(user("u1", "Ada", 36)).await.unwrap();

    users.delete("u1").await.unwrap();
    users.delete("u1").await.unwrap();
    users.delete("never-existed").await.unwrap();
    assert_eq!(users.select("u1", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_missing_primary_key_field_is_operation_error() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();

    let err = users
        .insert(Record::new().with("name", "Nobody"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.storage_error(),
        Some(StorageError::MissingKeyField(field)) if field == "id"
    ));
}

// ===========================================================================
// Queries
// ===========================================================================

#[tokio::test]
async fn test_select_many_limit_returns_first_in_key_order() {
    let shelf = create_shelf();
    let users = seeded_users(&shelf).await;

    let page = users
        .select_many(Selection::new().limit(2))
        .await
        .unwrap();
    let ids: Vec<_> = page.iter().map(|r| r.get("id").cloned()).collect();
    assert_eq!(ids, vec![Some(Value::from("u1")), Some(Value::from("u2"))]);
}

#[tokio::test]
async fn test_select_many_primary_key_range() {
    let shelf = create_shelf();
    let users = seeded_users(&shelf).await;

    let rows = users
        .select_many(Selection::new().range(RecordQuery::between("u2", "u4")))
        .await
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.get("name").cloned()).collect();
    assert_eq!(
        names,
        vec![
            Some(Value::from("Bo")),
            Some(Value::from("Cleo")),
            Some(Value::from("Dan"))
        ]
    );
}

#[tokio::test]
async fn test_select_many_through_index_orders_by_value_then_key() {
    let shelf = create_shelf();
    let users = seeded_users(&shelf).await;

    let rows = users
        .select_many(Selection::new().index("age"))
        .await
        .unwrap();
    let ids: Vec<_> = rows
        .iter()
        .filter_map(|r| r.get("id").cloned())
        .collect();
    assert_eq!(
        ids,
        ["u5", "u4", "u1", "u2", "u3"]
            .into_iter()
            .map(Value::from)
            .collect::<Vec<_>>()
    );

    let thirty_six = users
        .select_many(Selection::new().index("age").exact(36i64))
        .await
        .unwrap();
    assert_eq!(thirty_six.len(), 2);

    let adults_under_40 = users
        .select_many(
            Selection::new()
                .index("age")
                .range(RecordQuery::between(20i64, 39i64))
                .limit(2),
        )
        .await
        .unwrap();
    let ids: Vec<_> = adults_under_40
        .iter()
        .filter_map(|r| r.get("id").cloned())
        .collect();
    assert_eq!(ids, vec![Value::from("u4"), Value::from("u1")]);
}

#[tokio::test]
async fn test_select_by_index_and_unknown_index_fallback() {
    let shelf = create_shelf();
    let users = seeded_users(&shelf).await;

    let by_name = users.select("Eve", Some("name")).await.unwrap().unwrap();
    assert_eq!(by_name.get("id"), Some(&Value::from("u5")));

    // "bio" is not indexed: the key is treated as a primary key.
    let fallback = users.select("u2", Some("bio")).await.unwrap().unwrap();
    assert_eq!(fallback.get("name"), Some(&Value::from("Bo")));
}

#[tokio::test]
async fn test_composite_primary_key() {
    let shelf = create_shelf();
    let cells = shelf
        .register(
            RecordTypeDecl::new("cells")
                .field(FieldSpec::new("sheet").primary_key())
                .field(FieldSpec::new("row").primary_key())
                .field(FieldSpec::new("value")),
        )
        .unwrap();

    for (sheet, row, value) in [("b", 1, "x"), ("a", 2, "y"), ("a", 1, "z")] {
        cells
            .insert(
                Record::new()
                    .with("sheet", sheet)
                    .with("row", row)
                    .with("value", value),
            )
            .await
            .unwrap();
    }

    let key = RecordKey::Composite(vec![Value::from("a"), Value::from(2i64)]);
    let found = cells.select(key.clone(), None).await.unwrap().unwrap();
    assert_eq!(found.get("value"), Some(&Value::from("y")));

    // Constituents are indexed too.
    let sheet_a = cells
        .select_many(Selection::new().index("sheet").exact("a"))
        .await
        .unwrap();
    assert_eq!(sheet_a.len(), 2);

    cells.delete(key).await.unwrap();
    assert_eq!(cells.select_many(Selection::new()).await.unwrap().len(), 2);

    // A scalar key cannot address a composite primary key.
    assert!(matches!(
        cells.select("a", None).await,
        Err(ShelfError::Codec(_))
    ));
}

// ===========================================================================
// Dates
// ===========================================================================

#[tokio::test]
async fn test_date_field_round_trip_scenario() {
    let shelf = create_shelf();
    let events = shelf
        .register(
            RecordTypeDecl::new("events")
                .field(FieldSpec::new("id").primary_key())
                .field(FieldSpec::new("createdAt").date()),
        )
        .unwrap();

    events
        .insert(
            Record::new()
                .with("id", "a")
                .with("createdAt", "2024-01-01T00:00:00.000Z"),
        )
        .await
        .unwrap();

    let found = events.select("a", None).await.unwrap().unwrap();
    assert_eq!(
        found.get("createdAt"),
        Some(&Value::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    );
}

#[tokio::test]
async fn test_date_index_range_query() {
    let shelf = create_shelf();
    let events = shelf
        .register(
            RecordTypeDecl::new("events")
                .field(FieldSpec::new("id").primary_key())
                .field(FieldSpec::new("createdAt").date()),
        )
        .unwrap();

    for (id, day) in [("e1", 3), ("e2", 1), ("e3", 20), ("e4", 9)] {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
        events
            .insert(Record::new().with("id", id).with("createdAt", at))
            .await
            .unwrap();
    }

    let early_march = events
        .select_many(
            Selection::new().index("createdAt").range(RecordQuery::between(
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
            )),
        )
        .await
        .unwrap();
    let ids: Vec<_> = early_march
        .iter()
        .filter_map(|r| r.get("id").cloned())
        .collect();
    assert_eq!(
        ids,
        vec![Value::from("e2"), Value::from("e1"), Value::from("e4")]
    );
    assert!(early_march
        .iter()
        .all(|r| matches!(r.get("createdAt"), Some(Value::Date(_)))));
}

#[tokio::test]
async fn test_date_without_transformer_is_codec_error() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();

    let err = users
        .insert(user("u1", "Ada", 36).with("joined", Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, ShelfError::Codec(_)));
    assert_eq!(users.select("u1", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_unstorable_year_is_rejected_and_table_stays_readable() {
    let shelf = create_shelf();
    let events = shelf
        .register(
            RecordTypeDecl::new("events")
                .field(FieldSpec::new("id").primary_key())
                .field(FieldSpec::new("at").date()),
        )
        .unwrap();

    let ok = Utc.with_ymd_and_hms(9999, 12, 31, 0, 0, 0).unwrap();
    events
        .insert(Record::new().with("id", "ok").with("at", ok))
        .await
        .unwrap();

    for (id, year) in [("far", 10000), ("bce", -1)] {
        let at = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
        let err = events
            .insert(Record::new().with("id", id).with("at", at))
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::Codec(_)));
        assert_eq!(events.select(id, None).await.unwrap(), None);
    }

    let all = events.select_many(Selection::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("at"), Some(&Value::Date(ok)));
}

// ===========================================================================
// Registry, versioning and configuration
// ===========================================================================

#[tokio::test]
async fn test_invalid_declarations_are_not_registered() {
    let shelf = create_shelf();

    let err = shelf
        .register(
            RecordTypeDecl::new("bad")
                .field(FieldSpec::new("id").primary_key())
                .field(FieldSpec::new("e-mail")),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ShelfError::Schema(SchemaError::InvalidFieldName { .. })
    ));

    shelf.register(users_decl()).unwrap();
    let err = shelf.register(users_decl()).unwrap_err();
    assert!(matches!(
        err,
        ShelfError::Schema(SchemaError::DuplicateStoreName(_))
    ));

    assert_eq!(shelf.schemas().len(), 1);
    assert_eq!(shelf.storage_version(), 1);
}

#[tokio::test]
async fn test_stores_share_one_handle_and_migrate_once() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();
    let notes = shelf
        .register(
            RecordTypeDecl::new("notes")
                .field(FieldSpec::new("id").primary_key())
                .version_increment(2),
        )
        .unwrap();
    assert_eq!(shelf.storage_version(), 4);

    users.insert(user("u1", "Ada", 36)).await.unwrap();
    notes
        .insert(Record::new().with("id", "n1"))
        .await
        .unwrap();

    assert_eq!(shelf.engine().stored_version("test").await, Some(4));
    let mut tables = shelf.engine().table_names("test").await;
    tables.sort();
    assert_eq!(tables, vec!["notes".to_string(), "users".to_string()]);

    // Reopening at the same version keeps data.
    shelf.close().await;
    assert!(users.select("u1", None).await.unwrap().is_some());
}

#[tokio::test]
async fn test_late_registration_rebuilds_tables() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();
    users.insert(user("u1", "Ada", 36)).await.unwrap();

    let tags = shelf
        .register(RecordTypeDecl::new("tags").field(FieldSpec::new("tag").primary_key()))
        .unwrap();
    tags.insert(Record::new().with("tag", "rust")).await.unwrap();

    // Destructive migration: earlier rows are gone, both tables exist.
    assert_eq!(shelf.engine().stored_version("test").await, Some(2));
    assert_eq!(users.select("u1", None).await.unwrap(), None);
    assert!(tags.select("rust", None).await.unwrap().is_some());
}

#[tokio::test]
async fn test_lower_version_is_storage_open_error() {
    init_tracing();
    let engine = InMemoryEngine::new();

    let wide = Shelf::new(engine.clone(), ShelfConfig::new("shared"));
    let users = wide.register(users_decl().version_increment(5)).unwrap();
    users.insert(user("u1", "Ada", 36)).await.unwrap();

    let narrow = Shelf::new(engine, ShelfConfig::new("shared"));
    let users = narrow.register(users_decl()).unwrap();
    let err = users.select("u1", None).await.unwrap_err();
    assert!(matches!(
        err,
        ShelfError::StorageOpen {
            source: StorageError::VersionTooLow { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_debug_reset_discards_data_on_open() {
    init_tracing();
    let engine = InMemoryEngine::new();

    let first = Shelf::new(engine.clone(), ShelfConfig::new("dev"));
    let users = first.register(users_decl()).unwrap();
    users.insert(user("u1", "Ada", 36)).await.unwrap();

    let second = Shelf::new(engine, ShelfConfig::new("dev").with_debug_reset(true));
    let users = second.register(users_decl()).unwrap();
    assert_eq!(users.select("u1", None).await.unwrap(), None);

    // The handle is cached: a reset happens per open, not per operation.
    users.insert(user("u2", "Bo", 36)).await.unwrap();
    assert!(users.select("u2", None).await.unwrap().is_some());
}

#[tokio::test]
async fn test_validate_schema_only_never_touches_storage() {
    init_tracing();
    let engine = InMemoryEngine::new();
    let shelf = Shelf::new(
        engine.clone(),
        ShelfConfig::new("dry").with_validate_schema_only(true),
    );
    let users = shelf.register(users_decl()).unwrap();

    let err = users.insert(user("u1", "Ada", 36)).await.unwrap_err();
    assert!(matches!(err, ShelfError::ValidationOnly));
    assert_eq!(engine.stored_version("dry").await, None);
}

#[tokio::test]
async fn test_concurrent_stores_do_not_block_each_other() {
    let shelf = create_shelf();
    let users = shelf.register(users_decl()).unwrap();
    let tags = shelf
        .register(RecordTypeDecl::new("tags").field(FieldSpec::new("tag").primary_key()))
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10i64 {
        let users = users.clone();
        let tags = tags.clone();
        handles.push(tokio::spawn(async move {
            users
                .insert(user(&format!("u{i:02}"), "N", i))
                .await
                .unwrap();
            tags.update(Record::new().with("tag", format!("t{}", i % 3)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(users.select_many(Selection::new()).await.unwrap().len(), 10);
    assert_eq!(tags.select_many(Selection::new()).await.unwrap().len(), 3);
}
