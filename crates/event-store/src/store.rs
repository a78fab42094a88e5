//! The event store contract and the checks shared by its backends.

use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Core trait for event store implementations.
///
/// An event store keeps one append-only stream per aggregate and guards
/// appends with an optimistic concurrency check. All implementations must be
/// thread-safe (Send + Sync).
///
/// Errors are classified the same way by every backend:
/// - a backing log that cannot be reached or read is
///   [`EventStoreError::Unavailable`] and may be retried;
/// - stored data the backend returned but that does not decode (for example
///   event metadata that is not a JSON object) is
///   [`EventStoreError::Serialization`] and is not retryable;
/// - an expected version that differs from the stream length is
///   [`EventStoreError::ConcurrencyConflict`], even when the batch was built
///   on top of a newer version;
/// - a malformed request is [`EventStoreError::InvalidArgument`] and never
///   touches the stream.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Retrieves the full stream for an aggregate.
    ///
    /// Events are returned in version order (oldest first). An aggregate that
    /// has never been persisted yields an empty vector, not an error.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of a stream with `version >= from_version`.
    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Appends events to an aggregate's stream.
    ///
    /// The caller asserts that the stream currently holds exactly
    /// `expected_version` events; `Version::initial()` means the stream must
    /// not exist yet and is created by this call. A mismatch fails with
    /// [`EventStoreError::ConcurrencyConflict`] and appends nothing. The check
    /// and the append are one atomic step.
    ///
    /// Once the expected version matches, a batch that does not start at
    /// `expected_version + 1` is an [`EventStoreError::InvalidArgument`].
    /// An empty batch is a no-op success that returns `expected_version`
    /// without touching the backing log.
    ///
    /// Returns the stream length after appending.
    async fn save_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version>;

    /// Gets the current version (stream length) of an aggregate.
    ///
    /// Returns None if the aggregate has no stream.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if an aggregate exists (has a stream).
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates an append request before any I/O happens.
///
/// Rejects a negative expected version, envelopes that belong to another
/// stream, mixed aggregate types, and batches whose versions are not
/// consecutive. Where the batch starts is checked separately by
/// [`ensure_batch_follows`], once the stream length is known.
pub fn validate_append(
    aggregate_id: AggregateId,
    events: &[EventEnvelope],
    expected_version: Version,
) -> Result<()> {
    if expected_version.is_negative() {
        return Err(EventStoreError::invalid_argument(format!(
            "expected version {expected_version} must be a non negative integer"
        )));
    }

    let Some(first) = events.first() else {
        return Ok(());
    };

    let mut version = first.version;
    for (index, event) in events.iter().enumerate() {
        if event.aggregate_id != aggregate_id {
            return Err(EventStoreError::invalid_argument(format!(
                "event {} belongs to aggregate {}, not {aggregate_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::invalid_argument(
                "all events must have the same aggregate type",
            ));
        }

        if index > 0 {
            version = version.next();
        }
        if event.version != version {
            return Err(EventStoreError::invalid_argument(format!(
                "event versions must be sequential. Expected {version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

/// Checks that a batch starts right after `expected_version`.
///
/// Backends call this only after the expected version matched the stream
/// length: a stale expected version is a conflict, not a bad batch.
pub fn ensure_batch_follows(events: &[EventEnvelope], expected_version: Version) -> Result<()> {
    match events.first() {
        Some(first) if first.version != expected_version.next() => {
            Err(EventStoreError::invalid_argument(format!(
                "batch must start at version {}, got {}",
                expected_version.next(),
                first.version
            )))
        }
        _ => Ok(()),
    }
}

/// Builds a conflict error, recording it in logs and metrics.
pub(crate) fn concurrency_conflict(
    aggregate_id: AggregateId,
    expected: Version,
    actual: Version,
) -> EventStoreError {
    metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
    tracing::warn!(%aggregate_id, %expected, %actual, "concurrency conflict");
    EventStoreError::ConcurrencyConflict {
        aggregate_id,
        expected,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("InventoryItem")
            .event_type("ItemsAddedToInventory")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"quantity": 1}))
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_consecutive_versions_after_expected() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 3), envelope(id, 4)];
        assert!(validate_append(id, &events, Version::new(2)).is_ok());
    }

    #[test]
    fn accepts_empty_batch() {
        assert!(validate_append(AggregateId::new(), &[], Version::new(7)).is_ok());
    }

    #[test]
    fn rejects_negative_expected_version() {
        let err = validate_append(AggregateId::new(), &[], Version::new(-1)).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_events_for_another_stream() {
        let id = AggregateId::new();
        let events = vec![envelope(AggregateId::new(), 1)];
        let err = validate_append(id, &events, Version::initial()).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_gap_in_versions() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 1), envelope(id, 3)];
        let err = validate_append(id, &events, Version::initial()).unwrap_err();
        assert!(err.to_string().contains("Expected 2, got 3"));
    }

    #[test]
    fn consecutive_batch_is_valid_wherever_it_starts() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 3), envelope(id, 4)];
        assert!(validate_append(id, &events, Version::first()).is_ok());
    }

    #[test]
    fn batch_must_follow_expected_version() {
        let id = AggregateId::new();
        let events = vec![envelope(id, 3), envelope(id, 4)];

        assert!(ensure_batch_follows(&events, Version::new(2)).is_ok());
        let err = ensure_batch_follows(&events, Version::first()).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidArgument(_)));
        assert!(err.to_string().contains("start at version 2, got 3"));
    }

    #[test]
    fn empty_batch_follows_any_version() {
        assert!(ensure_batch_follows(&[], Version::new(5)).is_ok());
    }

    #[test]
    fn rejects_mixed_aggregate_types() {
        let id = AggregateId::new();
        let mut second = envelope(id, 2);
        second.aggregate_type = "Warehouse".to_string();
        let events = vec![envelope(id, 1), second];
        let err = validate_append(id, &events, Version::initial()).unwrap_err();
        assert!(err.to_string().contains("same aggregate type"));
    }
}
