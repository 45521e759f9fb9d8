//! Record store behavior against an on-disk database.

mod common;

use common::{ada_fields, generated, pioneers, TestFixture};
use memstore::{Field, FieldMap, FieldValue, PerformanceRecorder, Record, Store, StoreError};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_ada_lovelace_scenario() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();

    store.store("Ada Lovelace", &ada_fields()).unwrap();

    assert_eq!(
        store.retrieve("Ada Lovelace", "occupation").unwrap(),
        Some(FieldValue::from("Mathematician"))
    );
    assert_eq!(
        store.retrieve("Ada Lovelace", "birth_year").unwrap(),
        Some(FieldValue::Integer(1815))
    );
    assert_eq!(
        store.retrieve("Ada Lovelace", "nonexistent_field").unwrap_err(),
        StoreError::InvalidField("nonexistent_field".into())
    );
}

#[test]
fn test_store_fully_replaces_record() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();

    store.store("Ada Lovelace", &ada_fields()).unwrap();
    let mut replacement = FieldMap::new();
    replacement.insert(Field::Nationality, "British".into());
    store.store("Ada Lovelace", &replacement).unwrap();

    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(
        store.retrieve("Ada Lovelace", "nationality").unwrap(),
        Some(FieldValue::from("British"))
    );
    assert_eq!(
        store.retrieve("Ada Lovelace", "occupation").unwrap(),
        Some(FieldValue::Null)
    );
}

#[test]
fn test_absent_key_returns_none() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    assert_eq!(store.retrieve("Charles Babbage", "occupation").unwrap(), None);
}

#[test]
fn test_invalid_field_never_acquires_connection() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    let before = store.connections().acquisitions();

    let err = store.retrieve("Ada Lovelace", "favorite_color").unwrap_err();

    assert!(matches!(err, StoreError::InvalidField(_)));
    assert_eq!(store.connections().acquisitions(), before);
}

#[test]
fn test_empty_key_rejected() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    assert_eq!(
        store.store("  ", &ada_fields()).unwrap_err(),
        StoreError::InvalidKey { index: None }
    );
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_invalid_batch_leaves_table_unchanged() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    store.batch_store(&pioneers(), 10).unwrap();
    let before = store.list_all().unwrap();

    let mut batch = generated("new", 5);
    batch[2].name = String::new();
    let err = store.batch_store(&batch, 2).unwrap_err();

    assert_eq!(err, StoreError::InvalidKey { index: Some(2) });
    assert_eq!(store.list_all().unwrap(), before);
    assert_eq!(store.retrieve("new-0", "occupation").unwrap(), None);
}

#[test]
fn test_batch_of_1000_records() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    let records = generated("bulk", 1000);

    let ids = store.batch_store_default(&records).unwrap();

    assert_eq!(ids.len(), 1000);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 1000);
    assert_eq!(store.count().unwrap(), 1000);
}

#[test]
fn test_chunked_batch_returns_ids_in_input_order() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    let records = generated("chunk", 10);

    let ids = store.batch_store(&records, 3).unwrap();

    assert_eq!(ids.len(), 10);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    let listed: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.name).collect();
    let expected: Vec<String> = records.into_iter().map(|r| r.name).collect();
    assert_eq!(listed, expected);
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    assert!(store.batch_store(&[], 100).unwrap().is_empty());
    assert_eq!(store.batch_store(&generated("zero", 2), 0).unwrap().len(), 2);
}

#[test]
fn test_batch_retrieve_omits_missing_keys() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    store.batch_store(&pioneers(), 100).unwrap();

    let found = store
        .batch_retrieve(&["Grace Hopper", "Charles Babbage", "Alan Turing"])
        .unwrap();

    let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Grace Hopper", "Alan Turing"]);
    assert_eq!(found[0].fields[&Field::Achievement], FieldValue::from("COBOL"));
    assert!(found[1].fields[&Field::BirthPlace].is_null());
}

#[test]
fn test_list_names_sorted() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    store.batch_store(&pioneers(), 100).unwrap();
    assert_eq!(
        store.list_names().unwrap(),
        vec!["Alan Turing", "Grace Hopper", "John von Neumann"]
    );
}

#[test]
fn test_data_survives_reopen() {
    let fixture = TestFixture::new();
    {
        let store = fixture.open_store();
        store.store("Ada Lovelace", &ada_fields()).unwrap();
        store.close();
    }

    let store = fixture.open_store();
    assert!(store.verify().unwrap());
    assert_eq!(
        store.get("Ada Lovelace", Field::KnownFor).unwrap(),
        Some(FieldValue::from("First computer program"))
    );
}

#[test]
fn test_backup_and_restore() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    store.batch_store(&pioneers(), 100).unwrap();

    let backup = fixture.path("backup.db");
    store.backup_to(&backup).unwrap();
    store.clear().unwrap();
    assert_eq!(store.count().unwrap(), 0);

    store.restore_from(&backup).unwrap();
    assert_eq!(store.count().unwrap(), 3);
    assert_eq!(
        store.get("John von Neumann", Field::BirthPlace).unwrap(),
        Some(FieldValue::from("Budapest"))
    );
}

#[test]
fn test_restore_from_missing_backup() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    let err = store.restore_from(fixture.path("missing.db")).unwrap_err();
    assert!(matches!(err, StoreError::IoFailure(_)));
}

#[test]
fn test_clear_and_vacuum() {
    let fixture = TestFixture::new();
    let store = fixture.open_store();
    store.batch_store(&generated("vac", 500), 100).unwrap();
    assert!(store.size_bytes().unwrap() > 0);

    assert_eq!(store.clear().unwrap(), 500);
    store.vacuum().unwrap();
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.is_healthy());
}

#[test]
fn test_busy_timeout_surfaces_as_busy() {
    let fixture = TestFixture::new();
    let store = fixture.open_store_with_timeout(Duration::from_millis(50));

    let blocker = Connection::open(&fixture.db_path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let err = store.store("Ada Lovelace", &ada_fields()).unwrap_err();
    assert!(matches!(err, StoreError::Busy(_)));
    assert!(err.is_retryable());

    let err = store.batch_store(&pioneers(), 10).unwrap_err();
    assert!(err.is_retryable());

    blocker.execute_batch("ROLLBACK").unwrap();
    store.store("Ada Lovelace", &ada_fields()).unwrap();
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_open_in_unwritable_location_fails() {
    let fixture = TestFixture::new();
    let err = Store::open(fixture.path("no-such-dir").join("store.db")).unwrap_err();
    assert!(matches!(err, StoreError::IoFailure(_)));
}

#[test]
fn test_attached_recorder_receives_rates() {
    let fixture = TestFixture::new();
    let recorder = Arc::new(PerformanceRecorder::new(fixture.path("history.json")));
    let store = fixture.open_store().with_recorder(Arc::clone(&recorder));

    store.store("Ada Lovelace", &ada_fields()).unwrap();
    store.batch_store(&generated("rec", 20), 5).unwrap();
    store.retrieve("Ada Lovelace", "occupation").unwrap();
    store.list_all().unwrap();

    let run = recorder.current_run();
    let kinds: Vec<_> = run.samples.keys().map(|kind| kind.as_str()).collect();
    assert_eq!(kinds, vec!["insert", "batch_insert", "retrieve", "query"]);
    assert_eq!(
        run.samples[&memstore::OperationKind::BatchInsert][0].batch_size,
        Some(5)
    );
}

#[test]
fn test_in_memory_stores_are_isolated() {
    let first = Store::open_in_memory().unwrap();
    let second = Store::open_in_memory().unwrap();
    first.store_record(&Record::new("Alan Turing")).unwrap();
    assert_eq!(first.count().unwrap(), 1);
    assert_eq!(second.count().unwrap(), 0);
}

#[test]
fn test_in_memory_data_survives_closing_connections() {
    let store = Store::open_in_memory().unwrap();
    store.store("Ada Lovelace", &ada_fields()).unwrap();

    assert!(store.close_for_current_thread());
    assert_eq!(
        store.retrieve("Ada Lovelace", "occupation").unwrap(),
        Some(FieldValue::from("Mathematician"))
    );

    store.connections().close_all();
    assert_eq!(store.connections().open_connections(), 0);
    assert_eq!(store.count().unwrap(), 1);
}
