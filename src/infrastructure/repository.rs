use crate::domain::{Account, AccountError, AccountEvent, StoredEvent};
use crate::infrastructure::event_store::{EventStoreError, EventStoreTrait, StreamAppend};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// One aggregate's part of a commit: the events to append and the version
/// observed when the aggregate was loaded.
#[derive(Debug, Clone)]
pub struct AggregateCommit {
    pub aggregate_id: Uuid,
    pub expected_version: i64,
    pub events: Vec<AccountEvent>,
}

impl AggregateCommit {
    pub fn for_account(account: &Account, events: Vec<AccountEvent>) -> Self {
        Self {
            aggregate_id: account.id,
            expected_version: account.version,
            events,
        }
    }
}

#[derive(Debug, Default)]
pub struct RepositoryMetrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub replays: AtomicU64,
    pub commits: AtomicU64,
    pub conflicts: AtomicU64,
}

#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    /// Loads an account, replaying its stream on a cache miss. `None` means
    /// the aggregate has no history.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountError>;

    /// Commits `events` with `account.version` as the optimistic token. On
    /// success the caller's copy is stale and must be reloaded (or advanced
    /// locally by applying the same events).
    async fn save(&self, account: &Account, events: Vec<AccountEvent>)
        -> Result<(), AccountError>;

    /// Commits several aggregates atomically; all streams advance or none do.
    async fn save_all(&self, commits: Vec<AggregateCommit>) -> Result<(), AccountError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    account: Account,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Read-through cache over the authoritative event log. Entries are keyed by
/// aggregate id and invalidated synchronously on every commit through this
/// repository, successful or conflicting: a conflict proves the cached copy
/// is stale, and the reload-and-retry loop upstream needs a fresh replay.
pub struct AccountRepository {
    event_store: Arc<dyn EventStoreTrait>,
    cache: DashMap<Uuid, CacheEntry>,
    cache_ttl: Duration,
    metrics: Arc<RepositoryMetrics>,
}

impl AccountRepository {
    pub fn new(event_store: Arc<dyn EventStoreTrait>) -> Self {
        Self::with_cache_ttl(event_store, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(event_store: Arc<dyn EventStoreTrait>, cache_ttl: Duration) -> Self {
        Self {
            event_store,
            cache: DashMap::new(),
            cache_ttl,
            metrics: Arc::new(RepositoryMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<RepositoryMetrics> {
        self.metrics.clone()
    }

    fn decode_stream(&self, stored: &[StoredEvent]) -> Result<Vec<AccountEvent>, AccountError> {
        let mut events = Vec::with_capacity(stored.len());
        for (index, record) in stored.iter().enumerate() {
            let expected_version = index as i64 + 1;
            if record.version != expected_version {
                return Err(AccountError::CorruptedEventLog(format!(
                    "aggregate {}: version {} at position {}",
                    record.aggregate_id, record.version, expected_version
                )));
            }
            let event: AccountEvent =
                serde_json::from_value(record.event_data.clone()).map_err(|e| {
                    AccountError::CorruptedEventLog(format!(
                        "aggregate {}: undecodable event at version {}: {}",
                        record.aggregate_id, record.version, e
                    ))
                })?;
            events.push(event);
        }
        Ok(events)
    }

    fn invalidate(&self, ids: impl IntoIterator<Item = Uuid>) {
        for id in ids {
            self.cache.remove(&id);
        }
    }

    fn map_store_error(error: EventStoreError, metrics: &RepositoryMetrics) -> AccountError {
        match error {
            EventStoreError::OptimisticConcurrencyConflict {
                expected, actual, ..
            } => {
                metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                AccountError::VersionConflict { expected, actual }
            }
            other => {
                error!("event store failure: {}", other);
                AccountError::InfrastructureError(other.to_string())
            }
        }
    }
}

#[async_trait]
impl AccountRepositoryTrait for AccountRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        if let Some(entry) = self.cache.get(&id) {
            if !entry.is_expired(self.cache_ttl) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.account.clone()));
            }
        }
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);

        let stored = self
            .event_store
            .get_events(id)
            .await
            .map_err(|e| Self::map_store_error(e, &self.metrics))?;
        if stored.is_empty() {
            return Ok(None);
        }

        let events = self.decode_stream(&stored)?;
        let account = Account::replay(&events)?;
        self.metrics.replays.fetch_add(1, Ordering::Relaxed);
        debug!(aggregate_id = %id, version = account.version, "replayed account");

        self.cache.insert(
            id,
            CacheEntry {
                account: account.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(Some(account))
    }

    async fn save(
        &self,
        account: &Account,
        events: Vec<AccountEvent>,
    ) -> Result<(), AccountError> {
        self.save_all(vec![AggregateCommit::for_account(account, events)])
            .await
    }

    async fn save_all(&self, commits: Vec<AggregateCommit>) -> Result<(), AccountError> {
        let ids: Vec<Uuid> = commits.iter().map(|c| c.aggregate_id).collect();
        let batches = commits
            .into_iter()
            .map(|c| StreamAppend {
                aggregate_id: c.aggregate_id,
                expected_version: c.expected_version,
                events: c.events,
            })
            .collect();

        let result = self.event_store.save_events_multi(batches).await;
        // Stale either way: new history on success, lost race on conflict.
        self.invalidate(ids);
        match result {
            Ok(()) => {
                self.metrics.commits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(Self::map_store_error(e, &self.metrics)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_store::InMemoryEventStore;

    fn opened(id: Uuid) -> AccountEvent {
        AccountEvent::AccountOpened {
            account_id: id,
            full_name: "Test User".to_string(),
            email_address: "test@example.com".to_string(),
            password_hash: "digest".to_string(),
        }
    }

    fn repository() -> (AccountRepository, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        (AccountRepository::new(store.clone()), store)
    }

    #[tokio::test]
    async fn missing_account_loads_as_none() {
        let (repo, _store) = repository();
        assert_eq!(repo.get_by_id(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let (repo, store) = repository();
        let id = Uuid::new_v4();
        store.save_events(id, vec![opened(id)], 0).await.unwrap();

        let first = repo.get_by_id(id).await.unwrap().unwrap();
        let second = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(first, second);

        let metrics = repo.metrics();
        assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.replays.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn commit_invalidates_the_cache() {
        let (repo, store) = repository();
        let id = Uuid::new_v4();
        store.save_events(id, vec![opened(id)], 0).await.unwrap();

        let account = repo.get_by_id(id).await.unwrap().unwrap();
        repo.save(
            &account,
            vec![AccountEvent::MoneyCredited {
                account_id: id,
                amount_in_cents: 1_000,
            }],
        )
        .await
        .unwrap();

        // The reload replays the new history instead of the cached copy.
        let reloaded = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, 1_000);
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn conflicting_commit_maps_to_version_conflict_and_invalidates() {
        let (repo, store) = repository();
        let id = Uuid::new_v4();
        store.save_events(id, vec![opened(id)], 0).await.unwrap();

        let account = repo.get_by_id(id).await.unwrap().unwrap();

        // Another writer advances the stream behind our back.
        store
            .save_events(
                id,
                vec![AccountEvent::MoneyCredited {
                    account_id: id,
                    amount_in_cents: 500,
                }],
                1,
            )
            .await
            .unwrap();

        let result = repo
            .save(
                &account,
                vec![AccountEvent::MoneyCredited {
                    account_id: id,
                    amount_in_cents: 100,
                }],
            )
            .await;
        assert_eq!(
            result,
            Err(AccountError::VersionConflict {
                expected: 1,
                actual: 2,
            })
        );

        // The conflict evicted the stale entry; the reload sees the winner.
        let reloaded = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded.balance, 500);
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn corrupt_leading_event_is_fatal() {
        let (repo, store) = repository();
        let id = Uuid::new_v4();
        store
            .save_events(
                id,
                vec![AccountEvent::MoneyCredited {
                    account_id: id,
                    amount_in_cents: 100,
                }],
                0,
            )
            .await
            .unwrap();

        assert!(matches!(
            repo.get_by_id(id).await,
            Err(AccountError::CorruptedEventLog(_))
        ));
    }
}
