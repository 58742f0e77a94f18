use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::error::Result;
use super::StoreOptions;

/// Fully qualified collection name: `bucket.scope.collection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyspace {
    pub bucket: String,
    pub scope: String,
    pub collection: String,
}

impl Keyspace {
    pub fn new(bucket: &str, scope: &str, collection: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            scope: scope.to_string(),
            collection: collection.to_string(),
        }
    }

    /// Quoted identifier for use in query text.
    pub fn ident(&self) -> String {
        format!("\"{}\"", self.to_string().replace('"', "\"\""))
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bucket, self.scope, self.collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Created,
    AlreadyExists,
}

/// One open connection to a document database.
///
/// Single-document operations are atomic; nothing spanning several documents is.
pub trait DocumentBackend: Send + Sync {
    fn create_collection(&self, keyspace: &Keyspace) -> Result<CollectionStatus>;

    fn collection_exists(&self, keyspace: &Keyspace) -> Result<bool>;

    fn upsert(&self, keyspace: &Keyspace, key: &str, doc: &Value) -> Result<()>;

    fn get(&self, keyspace: &Keyspace, key: &str) -> Result<Option<Value>>;

    /// Returns whether a document was removed.
    fn remove(&self, keyspace: &Keyspace, key: &str) -> Result<bool>;

    /// Runs a statement with `$name` parameters and returns the produced rows.
    fn query(&self, statement: &str, params: &[(&str, Value)]) -> Result<Vec<Value>>;
}

/// Opens backends for a set of store options.
pub trait Connector: Send + Sync {
    fn connect(&self, options: &StoreOptions) -> Result<Arc<dyn DocumentBackend>>;
}
