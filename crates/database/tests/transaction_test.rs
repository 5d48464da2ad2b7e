//! Integration tests for transactions and deferred notification.

mod common;

use brook_core::{ConflictAlgorithm, ContentValues, Error, Value};
use brook_database::Brook;
use brook_reactive::{plugins, ImmediateScheduler};
use brook_storage::{RowCursor, SqliteStorage, StorageHandle};
use common::{seed, TestDb, EMPLOYEE, MANAGER};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn employee(username: &str) -> ContentValues {
    ContentValues::new()
        .with("username", username)
        .with("name", username.to_uppercase())
}

fn count_employees(t: &TestDb) -> i64 {
    let mut cursor = t
        .db
        .query("SELECT COUNT(*) FROM employee", &[])
        .unwrap()
        .unwrap();
    assert!(cursor.move_to_next().unwrap());
    let count = cursor.current().unwrap().get_i64(0).unwrap();
    cursor.close();
    count
}

#[test]
fn test_commit_publishes_once_after_end() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut txn = t.db.new_transaction().unwrap();
    assert!(t.db.in_transaction());
    txn.insert(EMPLOYEE, "m1", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    txn.insert(EMPLOYEE, "m1", ConflictAlgorithm::None, &employee("nick"))
        .unwrap();
    assert!(triggers.try_recv().is_none());

    txn.mark_successful("m1").unwrap();
    assert!(triggers.try_recv().is_none());
    txn.end().unwrap();

    assert!(!t.db.in_transaction());
    let trigger = triggers.try_recv().unwrap();
    assert!(trigger.tables.contains(EMPLOYEE));
    assert_eq!(trigger.marker, "m1");
    assert!(triggers.try_recv().is_none());
    assert_eq!(count_employees(&t), 5);
}

#[test]
fn test_rollback_publishes_nothing() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let txn = t.db.new_transaction().unwrap();
    txn.insert(EMPLOYEE, "m1", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    txn.end().unwrap();

    assert!(triggers.try_recv().is_none());
    assert_eq!(count_employees(&t), 3);
}

#[test]
fn test_tables_are_merged_into_one_event() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers([EMPLOYEE, MANAGER]);

    let mut txn = t.db.new_transaction().unwrap();
    txn.insert(EMPLOYEE, "a", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    txn.delete(MANAGER, "b", None, &[]).unwrap();
    txn.mark_successful("done").unwrap();
    txn.end().unwrap();

    let trigger = triggers.try_recv().unwrap();
    assert!(trigger.tables.contains(EMPLOYEE));
    assert!(trigger.tables.contains(MANAGER));
    assert_eq!(trigger.marker, "done");
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_committed_frame_without_writes_publishes_nothing() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut txn = t.db.new_transaction().unwrap();
    txn.update(
        EMPLOYEE,
        "miss",
        ConflictAlgorithm::None,
        &employee("x"),
        Some("id = ?"),
        &[Value::from(42)],
    )
    .unwrap();
    txn.mark_successful("m").unwrap();
    txn.end().unwrap();

    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_nested_commit_is_deferred_to_outer_end() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers([EMPLOYEE, MANAGER]);

    let mut outer = t.db.new_transaction().unwrap();
    outer
        .insert(EMPLOYEE, "outer", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    {
        let mut inner = outer.new_transaction().unwrap();
        assert_eq!(inner.depth(), 2);
        inner.delete(MANAGER, "inner", None, &[]).unwrap();
        inner.mark_successful("inner").unwrap();
        inner.end().unwrap();
    }
    assert!(triggers.try_recv().is_none());

    outer.mark_successful("outer").unwrap();
    outer.end().unwrap();

    let trigger = triggers.try_recv().unwrap();
    assert!(trigger.tables.contains(EMPLOYEE));
    assert!(trigger.tables.contains(MANAGER));
    assert_eq!(trigger.marker, "outer");
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_inner_rollback_suppresses_inner_tables() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers([EMPLOYEE, MANAGER]);

    let mut outer = t.db.new_transaction().unwrap();
    {
        let inner = outer.new_transaction().unwrap();
        inner.delete(MANAGER, "inner", None, &[]).unwrap();
        inner.end().unwrap();
    }
    outer.mark_successful("outer").unwrap();
    outer.end().unwrap();

    // The failed child rolls the whole storage transaction back.
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_outer_rollback_suppresses_committed_inner() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut outer = t.db.new_transaction().unwrap();
    {
        let mut inner = outer.new_non_exclusive_transaction().unwrap();
        inner
            .insert(EMPLOYEE, "inner", ConflictAlgorithm::None, &employee("john"))
            .unwrap();
        inner.mark_successful("inner").unwrap();
        inner.end().unwrap();
    }
    outer.end().unwrap();

    assert!(triggers.try_recv().is_none());
    assert_eq!(count_employees(&t), 3);
}

#[test]
fn test_non_exclusive_transaction_commits() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut txn = t.db.new_non_exclusive_transaction().unwrap();
    txn.insert(EMPLOYEE, "m", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    txn.mark_successful("m").unwrap();
    txn.end().unwrap();

    assert_eq!(triggers.try_recv().unwrap().marker, "m");
}

#[test]
fn test_drop_ends_transaction() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);
    {
        let mut txn = t.db.new_transaction().unwrap();
        txn.insert(EMPLOYEE, "m", ConflictAlgorithm::None, &employee("john"))
            .unwrap();
        txn.mark_successful("m").unwrap();
    }
    assert!(!t.db.in_transaction());
    assert_eq!(triggers.try_recv().unwrap().marker, "m");
    assert_eq!(count_employees(&t), 4);
}

#[test]
fn test_second_top_level_transaction_is_state_error() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut outer = t.db.new_transaction().unwrap();
    assert!(t.db.new_transaction().unwrap_err().is_state());
    assert!(t.db.new_non_exclusive_transaction().unwrap_err().is_state());

    outer
        .insert(EMPLOYEE, "m", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    outer.mark_successful("m").unwrap();
    outer.end().unwrap();
    assert!(!t.db.in_transaction());
    assert!(!t.db.storage().in_transaction());
    assert_eq!(triggers.try_recv().unwrap().marker, "m");

    t.db.new_transaction().unwrap().end().unwrap();
    assert!(!t.db.in_transaction());
}

#[test]
fn test_double_mark_is_state_error() {
    let t = TestDb::new();
    let mut txn = t.db.new_transaction().unwrap();
    txn.mark_successful("m").unwrap();
    let err = txn.mark_successful("m").unwrap_err();
    assert!(err.is_state());
    txn.end().unwrap();
}

#[test]
fn test_write_after_mark_is_state_error() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let mut txn = t.db.new_transaction().unwrap();
    txn.mark_successful("m").unwrap();
    let err = txn
        .insert(EMPLOYEE, "m", ConflictAlgorithm::None, &employee("john"))
        .unwrap_err();
    assert!(err.is_state());
    txn.end().unwrap();

    assert!(triggers.try_recv().is_none());
    assert_eq!(count_employees(&t), 3);
}

#[test]
fn test_yield_rejects_nested_and_marked() {
    let t = TestDb::new();
    let mut outer = t.db.new_transaction().unwrap();
    {
        let mut inner = outer.new_transaction().unwrap();
        assert!(inner.yield_if_contended_safely(None).unwrap_err().is_state());
        inner.mark_successful("m").unwrap();
        inner.end().unwrap();
    }
    assert!(!outer.yield_if_contended_safely(None).unwrap());

    outer.mark_successful("m").unwrap();
    assert!(outer.yield_if_contended_safely(None).unwrap_err().is_state());
    outer.end().unwrap();
}

#[test]
fn test_yield_lets_waiting_writer_in() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    seed(storage.as_ref());
    let db = Brook::<&'static str>::default()
        .wrap_shared_storage(storage.clone(), Arc::new(ImmediateScheduler));
    let triggers = db.subscribe_triggers(EMPLOYEE);

    let mut txn = db.new_transaction().unwrap();
    txn.insert(EMPLOYEE, "main", ConflictAlgorithm::None, &employee("john"))
        .unwrap();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            db.insert(EMPLOYEE, "other", ConflictAlgorithm::None, &employee("nick"))
                .unwrap()
        })
    };
    while !storage.is_contended() {
        thread::sleep(Duration::from_millis(1));
    }

    assert!(txn
        .yield_if_contended_safely(Some(Duration::from_millis(20)))
        .unwrap());
    txn.mark_successful("main").unwrap();
    txn.end().unwrap();
    assert_eq!(writer.join().unwrap(), 5);

    let mut markers: Vec<_> = triggers.drain().into_iter().map(|t| t.marker).collect();
    markers.sort();
    assert_eq!(markers, vec!["main", "other"]);
}

#[test]
fn test_transaction_logging() {
    let t = TestDb::new();
    t.db.set_logging_enabled(true);

    let mut txn = t.db.new_transaction().unwrap();
    txn.insert(EMPLOYEE, "m", ConflictAlgorithm::None, &employee("john"))
        .unwrap();
    txn.mark_successful("m").unwrap();
    txn.end().unwrap();

    let lines = t.log_lines();
    assert!(lines[0].starts_with("TXN BEGIN "));
    let frame = lines[0].trim_start_matches("TXN BEGIN ").to_string();
    assert!(lines[1].starts_with("INSERT\n"));
    assert_eq!(lines[2], "INSERT id: 4");
    assert_eq!(lines[3], format!("TXN SUCCESS \"m\", {}", frame));
    assert_eq!(lines[4], format!("TXN END {}", frame));
    assert_eq!(lines[5], "TRIGGER [employee]");
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_nested_frame_label_names_parent() {
    let t = TestDb::new();
    t.db.set_logging_enabled(true);

    let mut outer = t.db.new_transaction().unwrap();
    outer.new_transaction().unwrap().end().unwrap();
    outer.end().unwrap();

    let lines = t.log_lines();
    let outer_label = lines[0].trim_start_matches("TXN BEGIN ").to_string();
    assert!(lines[1].ends_with(&format!(" [{}]", outer_label)));
}

#[test]
fn test_failed_implicit_end_goes_to_error_sink() {
    let reported = Arc::new(Mutex::new(Vec::<Error>::new()));
    let sink = reported.clone();
    plugins::set_error_handler(move |error| sink.lock().push(error));

    let t = TestDb::new();
    let mut outer = t.db.new_transaction().unwrap();
    let inner = outer.new_transaction().unwrap();
    // Dropping the outer handle first is rejected; ending order is enforced.
    std::mem::forget(inner);
    drop(outer);

    plugins::reset_error_handler();
    let reported = reported.lock();
    assert_eq!(reported.len(), 1);
    assert!(reported[0].is_state());
}

#[test]
fn test_yielded_writes_are_not_notified_when_ending_unmarked() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    seed(storage.as_ref());
    let db = Brook::<&'static str>::default()
        .wrap_shared_storage(storage.clone(), Arc::new(ImmediateScheduler));
    let triggers = db.subscribe_triggers(EMPLOYEE);

    let mut txn = db.new_transaction().unwrap();
    txn.insert(EMPLOYEE, "main", ConflictAlgorithm::None, &employee("john"))
        .unwrap();

    let writer = {
        let db = db.clone();
        thread::spawn(move || {
            db.insert(EMPLOYEE, "other", ConflictAlgorithm::None, &employee("nick"))
                .unwrap()
        })
    };
    while !storage.is_contended() {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(txn.yield_if_contended_safely(None).unwrap());
    txn.end().unwrap();
    writer.join().unwrap();

    let markers: Vec<_> = triggers.drain().into_iter().map(|t| t.marker).collect();
    assert_eq!(markers, vec!["other"]);
    let mut cursor = db
        .query("SELECT COUNT(*) FROM employee WHERE username = 'john'", &[])
        .unwrap()
        .unwrap();
    assert!(cursor.move_to_next().unwrap());
    assert_eq!(cursor.current().unwrap().get_i64(0).unwrap(), 1);
    cursor.close();
}
