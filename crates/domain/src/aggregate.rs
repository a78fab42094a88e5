//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// This is stored alongside the payload so streams can be inspected
    /// without decoding every event.
    fn event_type(&self) -> &'static str;

    /// Returns the aggregate version this event produces when applied.
    fn aggregate_version(&self) -> Version;
}

/// Event-sourcing bookkeeping embedded in every aggregate.
///
/// Tracks how many events have been applied and which of them were raised
/// since the last save.
#[derive(Debug, Clone)]
pub struct AggregateRoot<E> {
    version: Version,
    uncommitted: Vec<E>,
}

impl<E> AggregateRoot<E> {
    /// Creates bookkeeping for a blank aggregate at version 0.
    pub fn new() -> Self {
        Self {
            version: Version::initial(),
            uncommitted: Vec::new(),
        }
    }

    /// Returns the number of events applied so far.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the events raised since the last commit, oldest first.
    pub fn uncommitted(&self) -> &[E] {
        &self.uncommitted
    }

    fn record(&mut self, event: E) {
        self.version = self.version.next();
        self.uncommitted.push(event);
    }

    fn replayed(&mut self) {
        self.version = self.version.next();
    }

    fn commit(&mut self) {
        self.uncommitted.clear();
    }
}

impl<E> Default for AggregateRoot<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is a consistency boundary whose state is derived only from
/// its events. Command methods on the concrete type validate business rules
/// and call [`Aggregate::raise_event`]; the repository rebuilds instances
/// through [`EventSourced::load_from_history`].
pub trait Aggregate: Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    ///
    /// [`crate::Repository::execute`] converts it into
    /// [`crate::DomainError`] for the caller.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Creates a blank instance for replay.
    ///
    /// Runs no domain logic: the result is at version 0 with no uncommitted
    /// changes and default state.
    fn new_for_replay() -> Self;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None until a creation event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// Mutates state for one event.
    ///
    /// Must be a total, side-effect free mapping from event variant to
    /// mutation. Events are facts, so this never fails.
    fn apply(&mut self, event: &Self::Event);

    /// Returns the embedded bookkeeping.
    fn root(&self) -> &AggregateRoot<Self::Event>;

    /// Returns the embedded bookkeeping mutably.
    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event>;

    /// Returns the version the next raised event must carry.
    fn next_version(&self) -> Version {
        self.root().version().next()
    }

    /// Applies a new change and records it as uncommitted.
    fn raise_event(&mut self, event: Self::Event) {
        debug_assert_eq!(
            event.aggregate_version(),
            self.next_version(),
            "raised event must carry the next aggregate version"
        );
        self.apply(&event);
        self.root_mut().record(event);
    }
}

/// Infrastructure view of an aggregate.
///
/// This is all the repository needs: identity, version, history replay and
/// uncommitted change tracking. Implemented for every [`Aggregate`].
pub trait EventSourced {
    /// The event type replayed and tracked.
    type Event;

    /// Returns the identifier, if the aggregate has been created.
    fn aggregate_id(&self) -> Option<AggregateId>;

    /// Returns the number of events applied, raised or replayed.
    fn version(&self) -> Version;

    /// Replays persisted events in order without recording them as changes.
    fn load_from_history(&mut self, events: impl IntoIterator<Item = Self::Event>);

    /// Returns the events raised since the last commit, oldest first.
    fn uncommitted_changes(&self) -> &[Self::Event];

    /// Forgets the uncommitted events once they are persisted.
    fn mark_changes_as_committed(&mut self);
}

impl<A: Aggregate> EventSourced for A {
    type Event = A::Event;

    fn aggregate_id(&self) -> Option<AggregateId> {
        self.id()
    }

    fn version(&self) -> Version {
        self.root().version()
    }

    fn load_from_history(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            debug_assert_eq!(
                event.aggregate_version(),
                self.next_version(),
                "replayed events must be consecutive"
            );
            self.apply(&event);
            self.root_mut().replayed();
        }
    }

    fn uncommitted_changes(&self) -> &[Self::Event] {
        self.root().uncommitted()
    }

    fn mark_changes_as_committed(&mut self) {
        self.root_mut().commit();
    }
}
