//! SQLite access for embedded scripts (spec.md §4.8: `sqlite.open(path)` →
//! handle with `exec`, `query`, `begin`, `commit`, `rollback`, `close`).
//!
//! Per spec.md §5 "Shared-resource policy", a handle is owned by the script
//! that opened it; cross-handle aliasing across scripts is not defined, so
//! [`SqlHandle`] is not `Clone`.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;

use super::fs::authorize;
use super::EventSink;
use crate::policy::PathPolicy;
use crate::{Error, Result};

/// A single open connection, gated by path policy at open time.
pub struct SqlHandle {
    conn: Mutex<Option<Connection>>,
}

impl SqlHandle {
    pub async fn open(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<Self> {
        authorize(policy, sink, path).await?;
        let conn = Connection::open(path).map_err(|e| Error::ActionError(format!("sqlite open: {e}")))?;
        Ok(Self { conn: Mutex::new(Some(conn)) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| Error::ActionError("sqlite handle is closed".to_string()))?;
        f(conn).map_err(|e| Error::ActionError(format!("sqlite error: {e}")))
    }

    /// Execute a statement with no result rows, returning the affected row count.
    pub fn exec(&self, sql: &str, args: &[Value]) -> Result<usize> {
        self.with_conn(|conn| conn.execute(sql, params_from_iter(args.iter().map(value_to_sql))))
    }

    /// Execute a query, returning each row as a JSON object keyed by column name.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Value>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();
            let rows = stmt.query_map(params_from_iter(args.iter().map(value_to_sql)), |row| {
                let mut obj = serde_json::Map::new();
                for (i, col) in columns.iter().enumerate() {
                    obj.insert(col.clone(), sql_to_value(row, i));
                }
                Ok(Value::Object(obj))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    pub fn begin(&self) -> Result<()> {
        self.exec("BEGIN", &[]).map(|_| ())
    }

    pub fn commit(&self) -> Result<()> {
        self.exec("COMMIT", &[]).map(|_| ())
    }

    pub fn rollback(&self) -> Result<()> {
        self.exec("ROLLBACK", &[]).map(|_| ())
    }

    /// Idempotent: closing an already-closed handle is a no-op.
    pub fn close(&self) {
        self.conn.lock().take();
    }
}

fn value_to_sql(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(rusqlite::types::Value::Integer)
            .or_else(|| n.as_f64().map(rusqlite::types::Value::Real))
            .unwrap_or(rusqlite::types::Value::Null),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

fn sql_to_value(row: &rusqlite::Row<'_>, idx: usize) -> Value {
    use rusqlite::types::ValueRef;
    match row.get_ref_unwrap(idx) {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::NullSink;
    use serde_json::json;

    #[tokio::test]
    async fn exec_and_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;
        let db_path = dir.path().join("db.sqlite");

        let handle = SqlHandle::open(&policy, &sink, &db_path).await.unwrap();
        handle.exec("CREATE TABLE t (id INTEGER, name TEXT)", &[]).unwrap();
        handle
            .exec("INSERT INTO t (id, name) VALUES (?, ?)", &[json!(1), json!("a")])
            .unwrap();

        let rows = handle.query("SELECT id, name FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("a"));

        handle.close();
        assert!(handle.exec("SELECT 1", &[]).is_err());
    }
}
