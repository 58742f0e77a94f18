use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info};

use super::backend::{CollectionStatus, Connector, DocumentBackend, Keyspace};
use super::error::{Result, StoreError};
use super::schema;
use super::StoreOptions;

/// Document backend on a single SQLite connection.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(url: &str) -> Result<Self> {
        if url != ":memory:" {
            if let Some(parent) = Path::new(url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Backend(format!("cannot create {}: {}", parent.display(), e))
                    })?;
                }
            }
        }
        let conn = Connection::open(url)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }

    fn table_exists(conn: &Connection, keyspace: &Keyspace) -> Result<bool> {
        let exists = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
            .exists([keyspace.to_string()])?;
        Ok(exists)
    }
}

impl DocumentBackend for SqliteBackend {
    fn create_collection(&self, keyspace: &Keyspace) -> Result<CollectionStatus> {
        let conn = self.lock()?;
        if Self::table_exists(&conn, keyspace)? {
            return Ok(CollectionStatus::AlreadyExists);
        }
        match conn.execute(&schema::create_collection(keyspace), []) {
            Ok(_) => Ok(CollectionStatus::Created),
            // Another process may have created it between the check and the create.
            Err(e) => {
                if Self::table_exists(&conn, keyspace)? {
                    Ok(CollectionStatus::AlreadyExists)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn collection_exists(&self, keyspace: &Keyspace) -> Result<bool> {
        let conn = self.lock()?;
        Self::table_exists(&conn, keyspace)
    }

    fn upsert(&self, keyspace: &Keyspace, key: &str, doc: &Value) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(&schema::upsert(keyspace), (key, doc.to_string()))?;
        Ok(())
    }

    fn get(&self, keyspace: &Keyspace, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(&schema::get(keyspace), [key], |row| row.get(0))
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, keyspace: &Keyspace, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count = conn.execute(&schema::remove(keyspace), [key])?;
        Ok(count > 0)
    }

    fn query(&self, statement: &str, params: &[(&str, Value)]) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(statement)?;

        for (name, value) in params {
            let placeholder = format!("${}", name);
            let index = stmt.parameter_index(&placeholder)?.ok_or_else(|| {
                StoreError::Backend(format!("statement has no parameter {}", placeholder))
            })?;
            stmt.raw_bind_parameter(index, to_sql_value(value))?;
        }

        if stmt.column_count() == 0 {
            let affected = stmt.raw_execute()?;
            debug!("Store: Statement affected {} rows", affected);
            return Ok(Vec::new());
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.raw_query();
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_to_value(row, &columns)?);
        }
        debug!("Store: Query returned {} rows", results.len());
        Ok(results)
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn column_to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
        }
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Single-column rows yield the column value; wider rows an object keyed by column name.
fn row_to_value(row: &Row<'_>, columns: &[String]) -> Result<Value> {
    if columns.len() == 1 {
        return Ok(column_to_value(row.get_ref(0)?));
    }
    let mut object = serde_json::Map::new();
    for (i, name) in columns.iter().enumerate() {
        object.insert(name.clone(), column_to_value(row.get_ref(i)?));
    }
    Ok(Value::Object(object))
}

/// Opens [`SqliteBackend`]s; the bucket only namespaces table names.
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, options: &StoreOptions) -> Result<Arc<dyn DocumentBackend>> {
        if options.bucket.trim().is_empty() {
            return Err(StoreError::Backend("bucket name must not be empty".to_string()));
        }
        let backend = SqliteBackend::open(&options.url)?;
        info!("Store: Opened {} (bucket {})", options.url, options.bucket);
        Ok(Arc::new(backend))
    }
}
