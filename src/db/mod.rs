//! Document store adapter for chats, messages and the configuration singleton.
//!
//! [`ChatStore`] owns one backend connection and the three collections. Every
//! public operation binds the collections on demand, so callers never have to
//! order `connect`/`init` themselves.

use std::ops::Deref;
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::config::Config;

pub mod backend;
pub mod chats;
pub mod configuration;
pub mod error;
pub mod gate;
pub mod schema;
pub mod sqlite;

pub use backend::{CollectionStatus, Connector, DocumentBackend, Keyspace};
pub use error::{Result, StoreError};
pub use gate::{AvailabilityGate, BackoffPolicy, Sleeper, ThreadSleeper};
pub use sqlite::{SqliteBackend, SqliteConnector};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    pub url: String,
    pub bucket: String,
    pub scope: String,
    pub chats_collection: String,
    pub messages_collection: String,
    pub configuration_collection: String,
    /// Policy used by query-dependent operations.
    pub gate: BackoffPolicy,
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.database_url.clone(),
            bucket: config.store_bucket.clone(),
            scope: config.store_scope.clone(),
            chats_collection: config.chats_collection.clone(),
            messages_collection: config.messages_collection.clone(),
            configuration_collection: config.configuration_collection.clone(),
            gate: config.gate_policy,
        }
    }

    /// Default layout on a private in-memory SQLite database.
    pub fn in_memory(bucket: &str) -> Self {
        Self {
            url: ":memory:".to_string(),
            bucket: bucket.to_string(),
            scope: "_default".to_string(),
            chats_collection: "chats".to_string(),
            messages_collection: "chat_messages".to_string(),
            configuration_collection: "configuration".to_string(),
            gate: BackoffPolicy::default(),
        }
    }

    fn keyspace(&self, collection: &str) -> Keyspace {
        Keyspace::new(&self.bucket, &self.scope, collection)
    }
}

/// Result of ensuring one collection exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub collection: String,
    pub outcome: ProvisionOutcome,
}

#[derive(Debug, Clone)]
pub(crate) struct Collections {
    pub chats: Keyspace,
    pub messages: Keyspace,
    pub configuration: Keyspace,
}

#[derive(Default)]
struct ConnectionState {
    backend: Option<Arc<dyn DocumentBackend>>,
    collections: Option<Collections>,
}

/// Bound backend plus collection handles, cloned out of the connection state.
pub(crate) struct Bound {
    pub backend: Arc<dyn DocumentBackend>,
    pub collections: Collections,
}

pub struct ChatStore {
    options: StoreOptions,
    connector: Arc<dyn Connector>,
    state: Mutex<ConnectionState>,
    gate: AvailabilityGate,
    sleeper: Arc<dyn Sleeper>,
    last_message_id: AtomicI64,
}

impl ChatStore {
    pub fn new(options: StoreOptions, connector: Arc<dyn Connector>) -> Self {
        Self {
            options,
            connector,
            state: Mutex::new(ConnectionState::default()),
            gate: AvailabilityGate::new(),
            sleeper: Arc::new(ThreadSleeper),
            last_message_id: AtomicI64::new(0),
        }
    }

    pub fn sqlite(options: StoreOptions) -> Self {
        Self::new(options, Arc::new(SqliteConnector))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state().backend.is_some()
    }

    /// Opens a fresh connection and tries to provision the collections.
    ///
    /// A provisioning failure is logged and swallowed: the store may be up
    /// before its collections are.
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = self.state();
            let backend = self.connector.connect(&self.options)?;
            state.backend = Some(backend);
            state.collections = None;
        }
        if let Err(e) = self.init() {
            warn!("Collections not ready yet: {}", e);
        }
        info!("Connected to document store with bucket {}", self.options.bucket);
        Ok(())
    }

    /// Current backend, opening one if there is none. Does not provision.
    ///
    /// The state lock is held across the connector so concurrent first uses
    /// share a single connection.
    fn backend(&self) -> Result<Arc<dyn DocumentBackend>> {
        let mut state = self.state();
        if let Some(backend) = &state.backend {
            return Ok(backend.clone());
        }
        let backend = self.connector.connect(&self.options)?;
        debug!("Opened document store connection for bucket {}", self.options.bucket);
        state.backend = Some(backend.clone());
        state.collections = None;
        Ok(backend)
    }

    /// Ensures the three collections exist and binds their handles.
    ///
    /// Pre-existing collections are not an error. Binding fails loudly when a
    /// collection is still missing after provisioning.
    pub fn init(&self) -> Result<Vec<Provisioned>> {
        let backend = self.backend()?;
        let collections = Collections {
            chats: self.options.keyspace(&self.options.chats_collection),
            messages: self.options.keyspace(&self.options.messages_collection),
            configuration: self.options.keyspace(&self.options.configuration_collection),
        };

        let mut report = Vec::with_capacity(3);
        for keyspace in [
            &collections.messages,
            &collections.chats,
            &collections.configuration,
        ] {
            let outcome = match backend.create_collection(keyspace) {
                Ok(CollectionStatus::Created) => {
                    info!("Created collection: {}", keyspace);
                    ProvisionOutcome::Created
                }
                Ok(CollectionStatus::AlreadyExists) => {
                    debug!("Collection {} already exists", keyspace);
                    ProvisionOutcome::AlreadyExists
                }
                Err(e) => {
                    warn!("Error creating collection {}: {}", keyspace, e);
                    ProvisionOutcome::Failed(e.to_string())
                }
            };
            report.push(Provisioned {
                collection: keyspace.collection.clone(),
                outcome,
            });
        }

        for keyspace in [
            &collections.chats,
            &collections.messages,
            &collections.configuration,
        ] {
            let exists = backend.collection_exists(keyspace).map_err(|e| {
                error!("Error initializing collections: {}", e);
                e
            })?;
            if !exists {
                error!("Error initializing collections: {} is missing", keyspace);
                return Err(StoreError::CollectionMissing(keyspace.to_string()));
            }
        }

        self.state().collections = Some(collections);
        info!("Collections initialized successfully");
        Ok(report)
    }

    pub(crate) fn bound(&self) -> Result<Bound> {
        {
            let state = self.state();
            if let (Some(backend), Some(collections)) = (&state.backend, &state.collections) {
                return Ok(Bound {
                    backend: backend.clone(),
                    collections: collections.clone(),
                });
            }
        }
        self.init()?;
        let state = self.state();
        match (&state.backend, &state.collections) {
            (Some(backend), Some(collections)) => Ok(Bound {
                backend: backend.clone(),
                collections: collections.clone(),
            }),
            _ => Err(StoreError::NotConnected),
        }
    }

    pub fn is_query_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Waits for the query capability using the configured policy.
    pub fn await_up(&self) -> Result<()> {
        let policy = self.options.gate;
        self.await_up_with(&policy)
    }

    pub fn await_up_with(&self, policy: &BackoffPolicy) -> Result<()> {
        if self.gate.is_ready() {
            return Ok(());
        }
        let backend = self.backend()?;
        self.gate.await_up(policy, self.sleeper.as_ref(), || {
            backend.query(schema::PROBE, &[]).map(|_| ())
        })
    }

    /// Drops the connection. Safe to call repeatedly.
    pub fn close(&self) {
        let mut state = self.state();
        state.collections = None;
        if state.backend.take().is_some() {
            info!("Database connection closed");
        }
    }

    /// Connects and returns a guard that closes the store when dropped.
    pub fn session(&self) -> Result<StoreSession<'_>> {
        self.connect()?;
        Ok(StoreSession { store: self })
    }

    /// Runs a store operation on the blocking thread pool.
    pub async fn run_blocking<F, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&ChatStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

/// Scoped use of a [`ChatStore`]: connected on creation, closed on drop.
pub struct StoreSession<'a> {
    store: &'a ChatStore,
}

impl Deref for StoreSession<'_> {
    type Target = ChatStore;

    fn deref(&self) -> &ChatStore {
        self.store
    }
}

impl Drop for StoreSession<'_> {
    fn drop(&mut self) {
        self.store.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn store_with(connector: Arc<FakeConnector>) -> ChatStore {
        ChatStore::new(StoreOptions::in_memory("support"), connector)
            .with_sleeper(Arc::new(NoSleep))
    }

    #[test]
    fn test_init_reports_created_then_already_exists() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = store_with(connector.clone());

        let first = store.init().unwrap();
        assert!(first.iter().all(|p| p.outcome == ProvisionOutcome::Created));
        let names: Vec<_> = first.iter().map(|p| p.collection.as_str()).collect();
        assert_eq!(names, vec!["chat_messages", "chats", "configuration"]);

        let second = store.init().unwrap();
        assert!(second.iter().all(|p| p.outcome == ProvisionOutcome::AlreadyExists));
        assert!(store.is_connected());
    }

    #[test]
    fn test_binding_failure_propagates_but_connect_swallows_it() {
        let backend = FakeBackend {
            refuse: HashSet::from(["chats".to_string()]),
            ..Default::default()
        };
        let connector = Arc::new(FakeConnector::new(backend));
        let store = store_with(connector.clone());

        // Connect succeeds even though provisioning could not finish.
        store.connect().unwrap();
        assert!(store.is_connected());

        let err = store.init().unwrap_err();
        assert!(matches!(
            err,
            StoreError::CollectionMissing(ref ks) if ks == "support._default.chats"
        ));
    }

    #[test]
    fn test_failed_outcome_when_collection_exists_elsewhere() {
        let backend = FakeBackend {
            refuse: HashSet::from(["configuration".to_string()]),
            ..Default::default()
        };
        backend
            .collections
            .lock()
            .unwrap()
            .insert("support._default.configuration".to_string());
        let store = store_with(Arc::new(FakeConnector::new(backend)));

        let report = store.init().unwrap();
        assert_eq!(
            report[2].outcome,
            ProvisionOutcome::Failed("backend error: insufficient permissions".to_string())
        );
    }

    #[test]
    fn test_lazy_connect_on_first_use() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = store_with(connector.clone());
        assert!(!store.is_connected());

        store.bound().unwrap();
        assert!(store.is_connected());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        // Already bound: no reconnect.
        store.bound().unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_failure_is_returned() {
        let mut connector = FakeConnector::new(FakeBackend::default());
        connector.fail = true;
        let store = store_with(Arc::new(connector));
        assert!(store.connect().is_err());
        assert!(matches!(store.init(), Err(StoreError::Backend(_))));
        assert!(!store.is_connected());
    }

    #[test]
    fn test_concurrent_first_use_opens_one_connection() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = store_with(connector.clone());
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    store.bound().unwrap();
                });
            }
        });

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(store.is_connected());
    }

    #[test]
    fn test_first_lazy_init_on_sqlite_reports_created() {
        let store = ChatStore::sqlite(StoreOptions::in_memory("support"));
        let report = store.init().unwrap();
        assert!(report.iter().all(|p| p.outcome == ProvisionOutcome::Created));
    }

    #[test]
    fn test_close_is_idempotent_and_reconnects_lazily() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = store_with(connector.clone());
        store.connect().unwrap();

        store.close();
        store.close();
        assert!(!store.is_connected());

        store.bound().unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_session_closes_on_drop() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = store_with(connector);
        {
            let session = store.session().unwrap();
            assert!(session.is_connected());
        }
        assert!(!store.is_connected());
    }

    #[test]
    fn test_await_up_retries_then_latches() {
        let backend = FakeBackend::default();
        backend.unavailable_probes.store(2, Ordering::SeqCst);
        let connector = Arc::new(FakeConnector::new(backend));
        let store = store_with(connector.clone());

        store.await_up().unwrap();
        assert!(store.is_query_ready());
        assert_eq!(connector.backend.probes.load(Ordering::SeqCst), 3);

        // The latch survives close: no probe and no reconnect.
        store.close();
        store.await_up().unwrap();
        assert_eq!(connector.backend.probes.load(Ordering::SeqCst), 3);
        assert!(!store.is_connected());
    }

    #[test]
    fn test_await_up_exhaustion() {
        let backend = FakeBackend::default();
        backend.unavailable_probes.store(100, Ordering::SeqCst);
        let connector = Arc::new(FakeConnector::new(backend));
        let store = store_with(connector.clone());

        let policy = BackoffPolicy::new(
            4,
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(2),
        );
        let err = store.await_up_with(&policy).unwrap_err();
        assert!(matches!(err, StoreError::Exhausted { attempts: 4 }));
        assert_eq!(connector.backend.probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let connector = Arc::new(FakeConnector::new(FakeBackend::default()));
        let store = Arc::new(store_with(connector));
        let report = store.run_blocking(|s| s.init()).await.unwrap();
        assert_eq!(report.len(), 3);
    }
}
