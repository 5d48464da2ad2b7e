//! Shared fixtures for the database integration tests.

#![allow(dead_code)]

use brook_core::{Row, Value};
use brook_database::{Brook, Database};
use brook_reactive::{ImmediateScheduler, Notification, Subscriber};
use brook_storage::{SqliteStorage, StorageHandle};
use parking_lot::Mutex;
use std::sync::Arc;

pub const EMPLOYEE: &str = "employee";
pub const MANAGER: &str = "manager";

pub const SELECT_EMPLOYEES: &str = "SELECT username, name FROM employee ORDER BY id";
pub const SELECT_MANAGER_LIST: &str = "SELECT e.name, m.name \
     FROM manager AS mgr \
     JOIN employee AS e ON mgr.employee_id = e.id \
     JOIN employee AS m ON mgr.manager_id = m.id \
     ORDER BY e.id";

/// A username and display name pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Employee {
    pub username: String,
    pub name: String,
}

impl Employee {
    pub fn new(username: &str, name: &str) -> Self {
        Self {
            username: username.to_string(),
            name: name.to_string(),
        }
    }

    pub fn from_row(row: &Row) -> brook_core::Result<Option<Employee>> {
        Ok(Some(Employee::new(row.get_str(0)?, row.get_str(1)?)))
    }
}

/// The three seeded employees, in id order.
pub fn seeded() -> Vec<Employee> {
    vec![
        Employee::new("alice", "Alice Allison"),
        Employee::new("bob", "Bob Bobberson"),
        Employee::new("eve", "Eve Evenson"),
    ]
}

/// An in-memory database with `employee` and `manager` tables, delivering on the
/// calling thread.
pub struct TestDb {
    pub db: Database<&'static str>,
    pub logs: Arc<Mutex<Vec<String>>>,
}

impl TestDb {
    pub fn new() -> Self {
        let storage = SqliteStorage::open_in_memory().unwrap();
        seed(&storage);
        let logs = Arc::new(Mutex::new(Vec::new()));
        let sink = logs.clone();
        let db = Brook::builder()
            .logger(move |line: &str| sink.lock().push(line.to_string()))
            .build()
            .wrap_storage(storage, ImmediateScheduler);
        Self { db, logs }
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.logs.lock().clone()
    }
}

pub fn seed(storage: &dyn StorageHandle) {
    storage
        .execute(
            "CREATE TABLE employee (\
             id INTEGER NOT NULL PRIMARY KEY, \
             username TEXT NOT NULL UNIQUE, \
             name TEXT NOT NULL)",
            &[],
        )
        .unwrap();
    storage
        .execute(
            "CREATE TABLE manager (\
             id INTEGER NOT NULL PRIMARY KEY, \
             employee_id INTEGER NOT NULL UNIQUE REFERENCES employee(id), \
             manager_id INTEGER NOT NULL REFERENCES employee(id))",
            &[],
        )
        .unwrap();
    for employee in seeded() {
        storage
            .execute(
                "INSERT INTO employee (username, name) VALUES (?, ?)",
                &[Value::from(employee.username), Value::from(employee.name)],
            )
            .unwrap();
    }
    storage
        .execute(
            "INSERT INTO manager (employee_id, manager_id) VALUES (1, 3)",
            &[],
        )
        .unwrap();
}

/// Collects the items queued on a channel subscriber, panicking on errors.
pub fn items<T>(subscriber: &Subscriber<T>) -> Vec<T> {
    subscriber
        .drain()
        .into_iter()
        .map(|notification| match notification {
            Notification::Next(item) => item,
            Notification::Error(error) => panic!("unexpected error: {}", error),
            Notification::Complete => panic!("unexpected completion"),
        })
        .collect()
}
