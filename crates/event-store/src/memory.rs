//! In-memory event store backend, used by tests and benchmarks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, Result, Version,
    store::{EventStore, concurrency_conflict, ensure_batch_follows, validate_append},
};

/// In-memory event store implementation.
///
/// Streams live in a map keyed by aggregate id. Appends take the write lock
/// once, so the version check and the append cannot interleave with another
/// writer. Clones share the same streams.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, Vec<EventEnvelope>>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all streams.
    pub async fn event_count(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }

    /// Returns the number of streams created so far.
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Clears all streams.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self))]
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        let events = streams.get(&aggregate_id).cloned().unwrap_or_default();
        tracing::debug!(count = events.len(), "read stream");
        Ok(events)
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        let events = streams
            .get(&aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn save_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version> {
        validate_append(aggregate_id, &events, expected_version)?;

        if events.is_empty() {
            tracing::debug!("empty batch, nothing to append");
            return Ok(expected_version);
        }

        let mut streams = self.streams.write().await;

        // Streams are only created with at least one event, so an existing
        // stream never matches an expected version of 0.
        let actual = streams
            .get(&aggregate_id)
            .map_or(Version::initial(), |stream| {
                Version::initial().advanced_by(stream.len())
            });

        if actual != expected_version {
            return Err(concurrency_conflict(aggregate_id, expected_version, actual));
        }
        ensure_batch_follows(&events, expected_version)?;

        let count = events.len();
        streams.entry(aggregate_id).or_default().extend(events);

        let new_version = expected_version.advanced_by(count);
        metrics::counter!("event_store_events_appended_total").increment(count as u64);
        tracing::info!(%new_version, "appended events");

        Ok(new_version)
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&aggregate_id)
            .map(|stream| Version::initial().advanced_by(stream.len())))
    }
}
