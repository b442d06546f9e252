//! SQLite store integration tests.
//!
//! Tests:
//! - JSON collection files migrate into an empty table, ids assigned
//! - Migration does not repeat once the table has rows
//! - Indexed lookups by email, token, user and token+user
//! - Scans and bulk operations

mod common;

use std::collections::HashSet;
use std::fs;

use common::TestFixture;
use serde_json::json;
use stockroom::catalog::CollectionSpec;
use stockroom::{CollectionStore, Query, Record};

#[test]
fn test_json_file_migrates_into_table() {
    let fixture = TestFixture::new();
    fs::write(
        fixture.file("users"),
        serde_json::to_vec(&json!([
            { "id": "u1", "email": "a@example.com", "name": "Asha" },
            { "email": "b@example.com", "name": "Ben" },
            { "id": "u3", "email": "c@example.com", "name": "Chidi" },
            { "email": "d@example.com", "name": "Dana" },
            { "id": "u5", "email": "e@example.com", "name": "Emeka" }
        ]))
        .unwrap(),
    )
    .unwrap();

    let spec = CollectionSpec::list("users").in_sqlite();
    let store = fixture.sqlite_store(&spec);
    assert_eq!(store.count().unwrap(), 5);

    let all = store.find_all().unwrap();
    let ids: HashSet<_> = all
        .as_list()
        .unwrap()
        .iter()
        .map(|r| r.id().expect("every migrated record has an id").to_string())
        .collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.contains("u1") && ids.contains("u3") && ids.contains("u5"));

    let ben = store.find_one(&Query::by_email("b@example.com")).unwrap().unwrap();
    assert_eq!(ben.get("name"), Some(&json!("Ben")));
    assert!(!ben.id().unwrap().is_empty());
}

#[test]
fn test_migration_runs_only_into_empty_table() {
    let fixture = TestFixture::new();
    fs::write(fixture.file("contacts"), br#"[{"id":"c1","email":"x@example.com"}]"#).unwrap();
    let spec = CollectionSpec::list("contacts").in_sqlite();

    {
        let store = fixture.sqlite_store(&spec);
        store
            .create(Record::new().with("id", "c2").with("email", "y@example.com"))
            .unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    let reopened = fixture.sqlite_store(&spec);
    assert_eq!(reopened.count().unwrap(), 2);
    assert!(reopened.find_by_id("c2").unwrap().is_some());
}

#[test]
fn test_indexed_lookups() {
    let fixture = TestFixture::new();
    let store = fixture.sqlite_store(&CollectionSpec::list("sessions").in_sqlite());

    store
        .insert_many(vec![
            Record::new()
                .with("token", "t-1")
                .with("userId", "u1")
                .with("email", "a@example.com"),
            Record::new()
                .with("token", "t-2")
                .with("userId", "u1")
                .with("email", "a@example.com"),
            Record::new()
                .with("token", "t-3")
                .with("userId", "u2")
                .with("email", "b@example.com"),
        ])
        .unwrap();

    let by_token = store.find_one(&Query::by_token("t-3")).unwrap().unwrap();
    assert_eq!(by_token.user_id(), Some("u2"));

    let by_email = store.find(&Query::by_email("a@example.com")).unwrap();
    assert_eq!(by_email.len(), 2);

    let by_user = store.find(&Query::by_user("u1")).unwrap();
    let tokens: Vec<_> = by_user.iter().filter_map(Record::token).collect();
    assert_eq!(tokens, ["t-1", "t-2"]);

    let pair = Query::new().eq("token", "t-2").eq("userId", "u1");
    assert!(store.find_one(&pair).unwrap().is_some());
    let wrong_user = Query::new().eq("userId", "u2").eq("token", "t-2");
    assert!(store.find_one(&wrong_user).unwrap().is_none());

    assert!(store.find_one(&Query::by_token("missing")).unwrap().is_none());
}

#[test]
fn test_scan_and_bulk_operations() {
    let fixture = TestFixture::new();
    let store = fixture.sqlite_store(&CollectionSpec::list("orders").in_sqlite());

    for (id, status) in [("o1", "paid"), ("o2", "pending"), ("o3", "paid")] {
        store
            .create(Record::new().with("id", id).with("status", status))
            .unwrap();
    }

    let paid = store.find(&Query::new().eq("status", "paid")).unwrap();
    assert_eq!(paid.len(), 2);

    let large = store
        .find(&Query::new().matches("id", |v| v.and_then(|v| v.as_str()) > Some("o1")))
        .unwrap();
    assert_eq!(large.len(), 2);

    let shipped = store
        .update("o2", Record::new().with("status", "shipped"))
        .unwrap()
        .unwrap();
    assert_eq!(shipped.get("status"), Some(&json!("shipped")));
    assert!(store.update("missing", Record::new()).unwrap().is_none());

    assert_eq!(store.delete_many(&Query::new().eq("status", "paid")).unwrap(), 2);
    assert_eq!(store.count().unwrap(), 1);
    assert!(store.delete("o2").unwrap());
    assert!(!store.delete("o2").unwrap());
    assert_eq!(store.count().unwrap(), 0);
}
