//! Integration tests for writes, direct reads and their triggers.

mod common;

use brook_core::{ConflictAlgorithm, ContentValues, Error, Value, NO_ROW_ID};
use brook_storage::RowCursor;
use common::{TestDb, EMPLOYEE, MANAGER};

fn john() -> ContentValues {
    ContentValues::new()
        .with("username", "john")
        .with("name", "John Johnson")
}

#[test]
fn test_insert_publishes_table_and_marker() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let id = t
        .db
        .insert(EMPLOYEE, "m1", ConflictAlgorithm::None, &john())
        .unwrap();
    assert_eq!(id, 4);

    let trigger = triggers.try_recv().unwrap();
    assert!(trigger.tables.contains(EMPLOYEE));
    assert_eq!(trigger.tables.len(), 1);
    assert_eq!(trigger.marker, "m1");
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_ignored_insert_publishes_nothing() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let values = ContentValues::new()
        .with("username", "alice")
        .with("name", "Alice Again");
    let id = t
        .db
        .insert(EMPLOYEE, "m1", ConflictAlgorithm::Ignore, &values)
        .unwrap();
    assert_eq!(id, NO_ROW_ID);
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_failed_insert_publishes_nothing() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let values = ContentValues::new()
        .with("username", "alice")
        .with("name", "Alice Again");
    let err = t
        .db
        .insert(EMPLOYEE, "m1", ConflictAlgorithm::Abort, &values)
        .unwrap_err();
    assert!(err.is_storage());
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_update_publishes_only_when_rows_change() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);
    let values = ContentValues::new().with("name", "Zach");

    let none = t
        .db
        .update(
            EMPLOYEE,
            "miss",
            ConflictAlgorithm::None,
            &values,
            Some("username = ?"),
            &[Value::from("nobody")],
        )
        .unwrap();
    assert_eq!(none, 0);
    assert!(triggers.try_recv().is_none());

    let all = t
        .db
        .update(EMPLOYEE, "hit", ConflictAlgorithm::None, &values, None, &[])
        .unwrap();
    assert_eq!(all, 3);
    assert_eq!(triggers.try_recv().unwrap().marker, "hit");
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_update_with_empty_values_is_configuration_error() {
    let t = TestDb::new();
    let err = t
        .db
        .update(
            EMPLOYEE,
            "m",
            ConflictAlgorithm::None,
            &ContentValues::new(),
            None,
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn test_delete_publishes_only_when_rows_change() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers([EMPLOYEE, MANAGER]);

    let none = t
        .db
        .delete(MANAGER, "miss", Some("id = ?"), &[Value::from(99)])
        .unwrap();
    assert_eq!(none, 0);
    assert!(triggers.try_recv().is_none());

    let one = t.db.delete(MANAGER, "hit", None, &[]).unwrap();
    assert_eq!(one, 1);
    let trigger = triggers.try_recv().unwrap();
    assert!(trigger.tables.contains(MANAGER));
    assert_eq!(trigger.marker, "hit");
}

#[test]
fn test_execute_never_publishes() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);
    t.db.execute("UPDATE employee SET name = 'Zach'", &[]).unwrap();
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_execute_and_trigger_always_publishes() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    t.db
        .execute_and_trigger(
            EMPLOYEE,
            "m",
            "UPDATE employee SET name = ? WHERE username = ?",
            &[Value::from("Nobody"), Value::from("nobody")],
        )
        .unwrap();
    assert_eq!(triggers.try_recv().unwrap().marker, "m");
}

#[test]
fn test_execute_and_trigger_failure_publishes_nothing() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);
    let err = t
        .db
        .execute_and_trigger(EMPLOYEE, "m", "UPDATE not_a_table SET x = 1", &[])
        .unwrap_err();
    assert!(err.is_storage());
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_execute_update_delete_counts_rows() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let none = t
        .db
        .execute_update_delete(EMPLOYEE, "miss", "DELETE FROM employee WHERE id > 100", &[])
        .unwrap();
    assert_eq!(none, 0);
    assert!(triggers.try_recv().is_none());

    let two = t
        .db
        .execute_update_delete(
            EMPLOYEE,
            "hit",
            "UPDATE employee SET name = ? WHERE id > ?",
            &[Value::from("Renamed"), Value::from(1)],
        )
        .unwrap();
    assert_eq!(two, 2);
    assert_eq!(triggers.try_recv().unwrap().marker, "hit");
}

#[test]
fn test_execute_insert_returns_row_id() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(EMPLOYEE);

    let id = t
        .db
        .execute_insert(
            EMPLOYEE,
            "m",
            "INSERT INTO employee (username, name) VALUES (?, ?)",
            &[Value::from("john"), Value::from("John Johnson")],
        )
        .unwrap();
    assert_eq!(id, 4);
    assert_eq!(triggers.try_recv().unwrap().marker, "m");

    let ignored = t
        .db
        .execute_insert(
            EMPLOYEE,
            "m",
            "INSERT OR IGNORE INTO employee (username, name) VALUES (?, ?)",
            &[Value::from("john"), Value::from("John Again")],
        )
        .unwrap();
    assert_eq!(ignored, NO_ROW_ID);
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_unrelated_table_is_not_notified() {
    let t = TestDb::new();
    let triggers = t.db.subscribe_triggers(MANAGER);
    t.db
        .insert(EMPLOYEE, "m", ConflictAlgorithm::None, &john())
        .unwrap();
    assert!(triggers.try_recv().is_none());
}

#[test]
fn test_direct_query_reads_rows() {
    let t = TestDb::new();
    let mut cursor = t
        .db
        .query("SELECT name FROM employee WHERE username = ?", &[Value::from("bob")])
        .unwrap()
        .unwrap();
    assert!(cursor.move_to_next().unwrap());
    assert_eq!(cursor.current().unwrap().get_str(0).unwrap(), "Bob Bobberson");
    assert!(!cursor.move_to_next().unwrap());
    cursor.close();
}

#[test]
fn test_logging_formats_write_lines() {
    let t = TestDb::new();
    t.db.set_logging_enabled(true);

    t.db
        .insert(EMPLOYEE, "m1", ConflictAlgorithm::Replace, &john())
        .unwrap();
    t.db.delete(EMPLOYEE, "m2", Some("username = ?"), &[Value::from("john")])
        .unwrap();

    let lines = t.log_lines();
    assert_eq!(
        lines[0],
        "INSERT\n  table: employee\n  marker: \"m1\"\n  values: username=john name=John Johnson\n  conflictAlgorithm: replace"
    );
    assert_eq!(lines[1], "INSERT id: 4");
    assert_eq!(lines[2], "TRIGGER [employee]");
    assert!(lines[3].starts_with("DELETE\n  table: employee\n  marker: \"m2\""));
    assert_eq!(lines[4], "DELETE affected 1 row");
    assert_eq!(lines[5], "TRIGGER [employee]");
    assert_eq!(lines.len(), 6);
}

#[test]
fn test_logging_disabled_logs_nothing() {
    let t = TestDb::new();
    assert!(!t.db.is_logging_enabled());
    t.db
        .insert(EMPLOYEE, "m1", ConflictAlgorithm::None, &john())
        .unwrap();
    assert!(t.log_lines().is_empty());
}
