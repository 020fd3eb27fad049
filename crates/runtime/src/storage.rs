//! Storage backends.
//!
//! A [`StorageBackend`] executes rendered SQL against whatever engine
//! holds the event data. The trait is deliberately narrow: the cache
//! and server layers only ever execute statements, fetch rows as JSON
//! objects, probe for tables and materialize selects.
//!
//! [`SqliteBackend`] is the bundled implementation, used in tests and
//! small single-host deployments. rusqlite connections are not `Sync`,
//! so every call hops onto the blocking pool with the connection behind
//! a mutex.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::{Map, Value};

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Execute a statement, discarding any rows.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Fetch all rows as JSON objects keyed by column name.
    async fn fetch(&self, sql: &str) -> Result<Vec<Value>>;

    /// Whether a table with this (possibly schema-qualified) name exists.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Materialize a select into a named table.
    async fn materialize(&self, name: &str, select_sql: &str) -> Result<()>;

    /// Distinct calendar dates present in an event table's `datetime`
    /// column.
    async fn available_dates(&self, table: &str) -> Result<Vec<NaiveDate>>;
}

fn execution_error(table: Option<&str>, err: impl std::fmt::Display) -> EventideError {
    EventideError::new(ErrorCode::ExecutionFailed, "Statement execution failed").with_context(
        ErrorContext::Execution {
            table: table.map(|t| t.to_string()),
            engine_message: err.to_string(),
        },
    )
}

/// SQLite-backed storage. The connection is shared behind a mutex and
/// every operation runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| execution_error(None, e).with_hint("Check the storage url"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| execution_error(None, e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| {
            EventideError::new(ErrorCode::StorageUnavailable, "Storage task was cancelled")
                .with_context(ErrorContext::Execution {
                    table: None,
                    engine_message: e.to_string(),
                })
        })?
    }
}

fn sqlite_value_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(
            b.iter()
                .map(|byte| format!("{:02x}", byte))
                .collect::<String>(),
        ),
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| {
            conn.execute_batch(&sql).map_err(|e| execution_error(None, e))
        })
        .await
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Value>> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(|e| execution_error(None, e))?;
            let column_names: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query([]).map_err(|e| execution_error(None, e))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(|e| execution_error(None, e))? {
                let mut object = Map::new();
                for (i, name) in column_names.iter().enumerate() {
                    let value = row
                        .get_ref(i)
                        .map_err(|e| execution_error(None, e))?;
                    object.insert(name.clone(), sqlite_value_to_json(value));
                }
                out.push(Value::Object(object));
            }
            Ok(out)
        })
        .await
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        // Schema qualifiers are not meaningful to sqlite's catalog;
        // match on the bare name.
        let bare = name
            .rsplit('.')
            .next()
            .unwrap_or(name)
            .to_string();
        self.run_blocking(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&bare],
                    |row| row.get(0),
                )
                .map_err(|e| execution_error(Some(&bare), e))?;
            Ok(count > 0)
        })
        .await
    }

    async fn materialize(&self, name: &str, select_sql: &str) -> Result<()> {
        let table = name.to_string();
        let sql = format!("CREATE TABLE {} AS {}", name, select_sql);
        self.run_blocking(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| execution_error(Some(&table), e))
        })
        .await
    }

    async fn available_dates(&self, table: &str) -> Result<Vec<NaiveDate>> {
        let table = table.to_string();
        let sql = format!(
            "SELECT DISTINCT date(datetime) AS d FROM {} ORDER BY d",
            table
        );
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| execution_error(Some(&table), e))?;
            let mut rows = stmt.query([]).map_err(|e| execution_error(Some(&table), e))?;
            let mut dates = Vec::new();
            while let Some(row) = rows.next().map_err(|e| execution_error(Some(&table), e))? {
                let text: String = row.get(0).map_err(|e| execution_error(Some(&table), e))?;
                if let Ok(date) = text.parse::<NaiveDate>() {
                    dates.push(date);
                }
            }
            Ok(dates)
        })
        .await
    }
}
