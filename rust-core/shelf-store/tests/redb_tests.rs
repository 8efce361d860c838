// SPDX-License-Identifier: PMPL-1.0-or-later
//! Record stores over the persistent redb engine.

#![cfg(feature = "redb-backend")]

use chrono::{TimeZone, Utc};
use shelf_schema::{FieldSpec, Record, RecordQuery, RecordTypeDecl, Value};
use shelf_store::{RedbEngine, Selection, Shelf, ShelfConfig};
use tempfile::tempdir;

fn events_decl() -> RecordTypeDecl {
    RecordTypeDecl::new("events")
        .field(FieldSpec::new("id").primary_key())
        .field(FieldSpec::new("kind"))
        .field(FieldSpec::new("createdAt").date())
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    {
        let shelf = Shelf::new(RedbEngine::new(dir.path()), ShelfConfig::new("app"));
        let events = shelf.register(events_decl()).unwrap();
        events
            .insert(
                Record::new()
                    .with("id", "a")
                    .with("kind", "login")
                    .with("createdAt", "2024-01-01T00:00:00.000Z"),
            )
            .await
            .unwrap();
    }

    let shelf = Shelf::new(RedbEngine::new(dir.path()), ShelfConfig::new("app"));
    let events = shelf.register(events_decl()).unwrap();
    let found = events.select("a", None).await.unwrap().unwrap();
    assert_eq!(found.get("createdAt"), Some(&Value::Date(at)));
    assert_eq!(found.get("kind"), Some(&Value::from("login")));
}

#[tokio::test]
async fn test_index_queries_and_limits() {
    let dir = tempdir().unwrap();
    let shelf = Shelf::new(RedbEngine::new(dir.path()), ShelfConfig::new("app"));
    let events = shelf.register(events_decl()).unwrap();

    for (id, kind, day) in [
        ("e1", "login", 5),
        ("e2", "logout", 2),
        ("e3", "login", 9),
        ("e4", "login", 1),
        ("e5", "purchase", 7),
    ] {
        events
            .insert(
                Record::new()
                    .with("id", id)
                    .with("kind", kind)
                    .with("createdAt", Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()),
            )
            .await
            .unwrap();
    }

    let logins = events
        .select_many(Selection::new().index("kind").exact("login"))
        .await
        .unwrap();
    let ids: Vec<_> = logins.iter().filter_map(|r| r.get("id").cloned()).collect();
    assert_eq!(
        ids,
        vec![Value::from("e1"), Value::from("e3"), Value::from("e4")]
    );

    let earliest = events
        .select_many(
            Selection::new()
                .index("createdAt")
                .range(RecordQuery::at_least("2024-06-01T00:00:00Z"))
                .limit(2),
        )
        .await
        .unwrap();
    let ids: Vec<_> = earliest.iter().filter_map(|r| r.get("id").cloned()).collect();
    assert_eq!(ids, vec![Value::from("e4"), Value::from("e2")]);

    assert!(events.insert(Record::new().with("id", "e1")).await.is_err());
    events.delete("e1").await.unwrap();
    assert_eq!(events.select("e1", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_debug_reset_removes_file_contents() {
    let dir = tempdir().unwrap();

    let shelf = Shelf::new(RedbEngine::new(dir.path()), ShelfConfig::new("dev"));
    let events = shelf.register(events_decl()).unwrap();
    events.insert(Record::new().with("id", "a")).await.unwrap();
    drop(events);
    drop(shelf);

    let shelf = Shelf::new(
        RedbEngine::new(dir.path()),
        ShelfConfig::new("dev").with_debug_reset(true),
    );
    let events = shelf.register(events_decl()).unwrap();
    assert_eq!(events.select("a", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_non_finite_floats_read_back() {
    let dir = tempdir().unwrap();
    let shelf = Shelf::new(RedbEngine::new(dir.path()), ShelfConfig::new("app"));
    let metrics = shelf
        .register(
            RecordTypeDecl::new("metrics")
                .field(FieldSpec::new("id").primary_key())
                .field(FieldSpec::new("x").no_index()),
        )
        .unwrap();

    metrics
        .insert(Record::new().with("id", "up").with("x", f64::INFINITY))
        .await
        .unwrap();
    metrics
        .insert(Record::new().with("id", "down").with("x", f64::NEG_INFINITY))
        .await
        .unwrap();
    metrics
        .insert(Record::new().with("id", "nan").with("x", f64::NAN))
        .await
        .unwrap();

    let up = metrics.select("up", None).await.unwrap().unwrap();
    assert_eq!(up.get("x"), Some(&Value::Float(f64::INFINITY)));
    let down = metrics.select("down", None).await.unwrap().unwrap();
    assert_eq!(down.get("x"), Some(&Value::Float(f64::NEG_INFINITY)));
    let nan = metrics.select("nan", None).await.unwrap().unwrap();
    assert!(matches!(nan.get("x"), Some(Value::Float(x)) if x.is_nan()));

    let all = metrics.select_many(Selection::new()).await.unwrap();
    assert_eq!(all.len(), 3);
}
