//! Loading and saving aggregates through an event store.

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent, EventSourced};
use crate::error::DomainError;

/// Bridges stored event streams and live aggregate instances.
///
/// The repository never retries: concurrency conflicts and store failures
/// are returned to the caller, who reloads and recomputes if appropriate.
#[derive(Debug, Clone)]
pub struct Repository<S: EventStore> {
    store: S,
}

impl<S: EventStore> Repository<S> {
    /// Creates a new repository over the given event store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate by replaying its full stream.
    ///
    /// An unknown id yields a blank instance at version 0.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn get_by_id<A: Aggregate>(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let envelopes = self.store.get_events_for_aggregate(aggregate_id).await?;

        let events = envelopes
            .into_iter()
            .map(decode_event::<A>)
            .collect::<Result<Vec<_>, _>>()?;
        let replayed = events.len();

        let mut aggregate = A::new_for_replay();
        aggregate.load_from_history(events);

        metrics::counter!("repository_aggregates_loaded_total").increment(1);
        metrics::counter!("repository_events_replayed_total").increment(replayed as u64);
        metrics::histogram!("repository_rehydration_events").record(replayed as f64);
        tracing::debug!(version = %aggregate.version(), replayed, "rehydrated aggregate");

        Ok(aggregate)
    }

    /// Persists the aggregate's uncommitted changes.
    ///
    /// `expected_version` is the caller's last known persisted version, 0 for
    /// a new aggregate. Changes are marked committed only after the store
    /// accepts them, so a failed save can be inspected or retried. Saving an
    /// aggregate with no changes succeeds without touching the store.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = A::aggregate_type(),
            aggregate_id = tracing::field::Empty,
            %expected_version
        )
    )]
    pub async fn save<A: Aggregate>(
        &self,
        aggregate: &mut A,
        expected_version: Version,
    ) -> Result<Version, DomainError> {
        if expected_version.is_negative() {
            return Err(DomainError::InvalidArgument(format!(
                "expected version must not be negative, got {expected_version}"
            )));
        }

        if aggregate.uncommitted_changes().is_empty() {
            tracing::debug!("no uncommitted changes, nothing to save");
            return Ok(expected_version);
        }

        let Some(aggregate_id) = aggregate.aggregate_id() else {
            return Err(DomainError::InvalidArgument(format!(
                "cannot save {} without an id",
                A::aggregate_type()
            )));
        };
        tracing::Span::current().record("aggregate_id", tracing::field::display(aggregate_id));

        let envelopes = build_envelopes::<A>(aggregate_id, aggregate.uncommitted_changes())?;
        let new_version = self
            .store
            .save_events(aggregate_id, envelopes, expected_version)
            .await?;

        aggregate.mark_changes_as_committed();
        tracing::debug!(%new_version, "saved aggregate");

        Ok(new_version)
    }

    /// Loads an aggregate, runs one command against it and saves the result.
    ///
    /// The version the aggregate was loaded at is the expected version, so a
    /// concurrent writer in between surfaces as a concurrency conflict. A
    /// rejected command returns its error converted into [`DomainError`] and
    /// leaves the store untouched.
    #[tracing::instrument(skip(self, command), fields(aggregate_type = A::aggregate_type()))]
    pub async fn execute<A, F>(
        &self,
        aggregate_id: AggregateId,
        command: F,
    ) -> Result<A, DomainError>
    where
        A: Aggregate,
        F: FnOnce(&mut A) -> Result<(), A::Error> + Send,
        DomainError: From<A::Error>,
    {
        let mut aggregate: A = self.get_by_id(aggregate_id).await?;
        let expected_version = aggregate.version();

        command(&mut aggregate)?;

        self.save(&mut aggregate, expected_version).await?;
        Ok(aggregate)
    }
}

/// Builds event envelopes from domain events.
fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    events
        .iter()
        .map(|event| -> Result<EventEnvelope, DomainError> {
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(event.aggregate_version())
                .payload(event)?
                .build()?;
            Ok(envelope)
        })
        .collect()
}

fn decode_event<A: Aggregate>(envelope: EventEnvelope) -> Result<A::Event, DomainError> {
    serde_json::from_value(envelope.payload).map_err(|source| {
        tracing::error!(
            aggregate_id = %envelope.aggregate_id,
            event_type = %envelope.event_type,
            version = %envelope.version,
            error = %source,
            "stored event does not match the event schema"
        );
        DomainError::EventSchemaMismatch {
            aggregate_id: envelope.aggregate_id,
            event_type: envelope.event_type,
            version: envelope.version,
            source,
        }
    })
}
