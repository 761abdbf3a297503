use crate::domain::{AccountEvent, StoredEvent};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error(
        "Optimistic concurrency conflict for aggregate {aggregate_id}: \
         expected version {expected}, found {actual}"
    )]
    OptimisticConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// One aggregate's contribution to an atomic append.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub aggregate_id: Uuid,
    pub expected_version: i64,
    pub events: Vec<AccountEvent>,
}

#[derive(Debug, Default)]
pub struct EventStoreMetrics {
    pub appends: AtomicU64,
    pub events_appended: AtomicU64,
    pub reads: AtomicU64,
    pub conflicts: AtomicU64,
}

#[async_trait]
pub trait EventStoreTrait: Send + Sync {
    /// Appends `events` contiguously to a single stream and returns the new
    /// current version. Fails without writing anything when the stream's
    /// current version differs from `expected_version`.
    async fn save_events(
        &self,
        aggregate_id: Uuid,
        events: Vec<AccountEvent>,
        expected_version: i64,
    ) -> Result<i64, EventStoreError>;

    /// Appends to several streams atomically: every batch's expected version
    /// is checked before any write, so either all batches land or none do.
    /// Aggregate ids must be distinct within one call.
    async fn save_events_multi(
        &self,
        batches: Vec<StreamAppend>,
    ) -> Result<(), EventStoreError>;

    /// Ordered events from version 1. Unknown aggregates read as empty:
    /// absence is a repository-level concept, not a store error.
    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Current version of a stream, 0 for unknown aggregates.
    async fn get_current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError>;
}

/// In-process event log: one ordered stream per aggregate. Reads go straight
/// through the concurrent map; the validate-then-append critical section is
/// serialized by `append_lock`, which is what makes multi-stream appends
/// all-or-nothing.
pub struct InMemoryEventStore {
    streams: DashMap<Uuid, Vec<StoredEvent>>,
    version_cache: DashMap<Uuid, i64>,
    append_lock: Mutex<()>,
    metrics: Arc<EventStoreMetrics>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            version_cache: DashMap::new(),
            append_lock: Mutex::new(()),
            metrics: Arc::new(EventStoreMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<EventStoreMetrics> {
        self.metrics.clone()
    }

    fn current_version(&self, aggregate_id: Uuid) -> i64 {
        self.version_cache
            .get(&aggregate_id)
            .map(|v| *v)
            .unwrap_or(0)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStoreTrait for InMemoryEventStore {
    async fn save_events(
        &self,
        aggregate_id: Uuid,
        events: Vec<AccountEvent>,
        expected_version: i64,
    ) -> Result<i64, EventStoreError> {
        let committed_version = expected_version + events.len() as i64;
        self.save_events_multi(vec![StreamAppend {
            aggregate_id,
            expected_version,
            events,
        }])
        .await?;
        Ok(committed_version)
    }

    async fn save_events_multi(
        &self,
        batches: Vec<StreamAppend>,
    ) -> Result<(), EventStoreError> {
        let _guard = self.append_lock.lock().await;

        // Validate every stream before touching any of them.
        for batch in &batches {
            let actual = self.current_version(batch.aggregate_id);
            if actual != batch.expected_version {
                self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    aggregate_id = %batch.aggregate_id,
                    expected = batch.expected_version,
                    actual,
                    "rejecting stale append"
                );
                return Err(EventStoreError::OptimisticConcurrencyConflict {
                    aggregate_id: batch.aggregate_id,
                    expected: batch.expected_version,
                    actual,
                });
            }
        }

        for batch in batches {
            if batch.events.is_empty() {
                continue;
            }
            let mut stream = self.streams.entry(batch.aggregate_id).or_default();
            let mut version = batch.expected_version;
            for event in &batch.events {
                version += 1;
                stream.push(StoredEvent {
                    id: Uuid::new_v4(),
                    aggregate_id: batch.aggregate_id,
                    event_type: event.event_type().to_string(),
                    event_data: serde_json::to_value(event)?,
                    version,
                    timestamp: Utc::now(),
                });
            }
            self.version_cache.insert(batch.aggregate_id, version);
            self.metrics.appends.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .events_appended
                .fetch_add(batch.events.len() as u64, Ordering::Relaxed);
            debug!(
                aggregate_id = %batch.aggregate_id,
                version,
                "appended {} event(s)",
                batch.events.len()
            );
        }
        Ok(())
    }

    async fn get_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.metrics.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .streams
            .get(&aggregate_id)
            .map(|stream| stream.clone())
            .unwrap_or_default())
    }

    async fn get_current_version(&self, aggregate_id: Uuid) -> Result<i64, EventStoreError> {
        Ok(self.current_version(aggregate_id))
    }
}
