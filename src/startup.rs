//! Store bring-up performed before the HTTP API starts serving.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::db::{BackoffPolicy, ChatStore};
use crate::models::Configuration;

/// Wait after failed connect attempt `attempt` (1-based): `min(30s, 2^attempt s)`.
pub fn retry_delay(attempt: u32) -> Duration {
    let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX).min(30);
    Duration::from_secs(secs)
}

/// Connects the store and waits for its query capability.
///
/// Returns whether the store came up. Giving up is not fatal: the API starts
/// anyway and requests reconnect lazily.
pub async fn connect_store(store: &Arc<ChatStore>, attempts: u32, policy: BackoffPolicy) -> bool {
    for attempt in 1..=attempts {
        info!("Connecting to document store (startup attempt {}/{})", attempt, attempts);
        match store.run_blocking(|s| s.connect()).await {
            Ok(()) => match store.run_blocking(move |s| s.await_up_with(&policy)).await {
                Ok(()) => {
                    info!("Document store connection established and ready");
                    return true;
                }
                Err(e) => {
                    warn!("Document store services not fully ready: {}", e);
                }
            },
            Err(e) => {
                error!(
                    "Failed to connect to document store on startup (attempt {}): {}",
                    attempt, e
                );
                if attempt < attempts {
                    let wait = retry_delay(attempt);
                    info!("Retrying in {:?}...", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
    warn!("Starting API without confirmed document store connection; will retry on requests");
    false
}

/// Writes `seed` when the stored configuration is empty. Returns whether it wrote.
pub async fn seed_configuration(
    store: &Arc<ChatStore>,
    seed: Option<Configuration>,
) -> anyhow::Result<bool> {
    let Some(seed) = seed else {
        return Ok(false);
    };
    let seeded = store
        .run_blocking(move |s| {
            if !s.get_configuration()?.is_empty() {
                return Ok(false);
            }
            s.set_configuration(&seed)?;
            Ok(true)
        })
        .await?;
    if seeded {
        info!("Seeded configuration from knowledge base file");
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{FakeBackend, FakeConnector, NoSleep};
    use crate::db::StoreOptions;
    use crate::models::ActionItem;
    use std::sync::atomic::Ordering;

    fn fake_store(connector: Arc<FakeConnector>) -> Arc<ChatStore> {
        Arc::new(
            ChatStore::new(StoreOptions::in_memory("support"), connector)
                .with_sleeper(Arc::new(NoSleep)),
        )
    }

    #[test]
    fn test_retry_delay_caps_at_thirty_seconds() {
        let delays: Vec<u64> = (1..=6).map(|a| retry_delay(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);
        assert_eq!(retry_delay(200).as_secs(), 30);
    }

    #[tokio::test]
    async fn test_connect_store_ready_first_try() {
        let backend = FakeBackend::default();
        backend.unavailable_probes.store(2, Ordering::SeqCst);
        let connector = Arc::new(FakeConnector::new(backend));
        let store = fake_store(connector.clone());

        let policy = BackoffPolicy::new(5, Duration::from_millis(1), Duration::from_millis(1));
        assert!(connect_store(&store, 5, policy).await);
        assert!(store.is_query_ready());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_store_gives_up_on_unready_store() {
        let backend = FakeBackend::default();
        backend.unavailable_probes.store(100, Ordering::SeqCst);
        let connector = Arc::new(FakeConnector::new(backend));
        let store = fake_store(connector.clone());

        let policy = BackoffPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1));
        assert!(!connect_store(&store, 3, policy).await);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        assert_eq!(connector.backend.probes.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_connect_failure_on_last_attempt_does_not_wait() {
        let mut connector = FakeConnector::new(FakeBackend::default());
        connector.fail = true;
        let connector = Arc::new(connector);
        let store = fake_store(connector.clone());

        let started = std::time::Instant::now();
        assert!(!connect_store(&store, 1, BackoffPolicy::default()).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_configuration() {
        let store = Arc::new(ChatStore::sqlite(StoreOptions::in_memory("support")));
        let seed = Configuration {
            knowledge_base: Vec::new(),
            actions: vec![ActionItem {
                name: "escalate".to_string(),
                description: "Hand the chat to a human agent".to_string(),
            }],
        };

        assert!(!seed_configuration(&store, None).await.unwrap());
        assert!(seed_configuration(&store, Some(seed.clone())).await.unwrap());

        let other = Configuration {
            knowledge_base: Vec::new(),
            actions: vec![ActionItem {
                name: "refund".to_string(),
                description: "Issue a refund".to_string(),
            }],
        };
        assert!(!seed_configuration(&store, Some(other)).await.unwrap());
        assert_eq!(store.get_configuration().unwrap(), seed);
    }
}
