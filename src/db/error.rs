use rusqlite::ErrorCode;

/// Errors returned by the document store and its backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store is reachable but its query capability is not up yet.
    #[error("service not available: {0}")]
    ServiceUnavailable(String),
    #[error("query service not available after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("Chat with ID {0} not found")]
    ChatNotFound(String),
    #[error("collection {0} does not exist")]
    CollectionMissing(String),
    #[error("store is not connected")]
    NotConnected,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error is the "warming up" class the availability gate retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ServiceUnavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::ServiceUnavailable(err.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_database_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(StoreError::from(busy).is_transient());
    }

    #[test]
    fn test_other_sqlite_errors_are_fatal() {
        let err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_transient());
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert!(!StoreError::Exhausted { attempts: 3 }.is_transient());
    }
}
