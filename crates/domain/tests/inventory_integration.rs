//! Integration tests for the inventory item aggregate.
//!
//! These tests exercise the repository end to end: event persistence,
//! aggregate rehydration, failure propagation and concurrency handling.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Aggregate, DomainError, DomainEvent, EventSourced, InventoryItem, InventoryItemError,
    InventoryItemEvent, Repository,
};
use event_store::{EventEnvelope, EventStore, EventStoreError, InMemoryEventStore, Version};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to create a test repository
fn create_repository() -> Repository<InMemoryEventStore> {
    Repository::new(InMemoryEventStore::new())
}

mod item_lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_add_remove_save_and_reload() {
        let repo = create_repository();
        let id = AggregateId::new();

        let mut item = InventoryItem::create(id, "shoes").unwrap();
        assert_eq!(item.version(), Version::first());
        assert_eq!(item.uncommitted_changes().len(), 1);
        assert_eq!(
            item.uncommitted_changes()[0].event_type(),
            "InventoryItemCreated"
        );

        item.add(3).unwrap();
        assert_eq!(item.version(), Version::new(2));
        assert_eq!(item.count(), 3);

        item.remove(2).unwrap();
        assert_eq!(item.version(), Version::new(3));
        assert_eq!(item.count(), 1);

        let version = repo.save(&mut item, Version::initial()).await.unwrap();
        assert_eq!(version, Version::new(3));
        assert!(item.uncommitted_changes().is_empty());

        let stored = repo.store().get_events_for_aggregate(id).await.unwrap();
        let versions: Vec<_> = stored.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, [1, 2, 3]);
        let types: Vec<_> = stored.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            [
                "InventoryItemCreated",
                "ItemsAddedToInventory",
                "ItemsRemovedFromInventory"
            ]
        );

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.version(), Version::new(3));
        assert_eq!(loaded.count(), 1);
        assert_eq!(loaded.name(), "shoes");
        assert!(loaded.is_active());
        assert!(loaded.uncommitted_changes().is_empty());
    }

    #[tokio::test]
    async fn load_modify_save_cycles() {
        let repo = create_repository();
        let id = AggregateId::new();

        let mut item = InventoryItem::create(id, "shoes").unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let mut item: InventoryItem = repo.get_by_id(id).await.unwrap();
        let expected = item.version();
        item.rename("boots").unwrap();
        item.add(10).unwrap();
        repo.save(&mut item, expected).await.unwrap();

        let mut item: InventoryItem = repo.get_by_id(id).await.unwrap();
        let expected = item.version();
        item.deactivate().unwrap();
        let version = repo.save(&mut item, expected).await.unwrap();
        assert_eq!(version, Version::new(4));

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.name(), "boots");
        assert_eq!(loaded.count(), 10);
        assert!(!loaded.is_active());
        assert_eq!(loaded.version(), Version::new(4));
    }

    #[tokio::test]
    async fn unknown_item_loads_blank_and_rejects_commands() {
        let repo = create_repository();

        let mut item: InventoryItem = repo.get_by_id(AggregateId::new()).await.unwrap();

        assert_eq!(item.version(), Version::initial());
        assert_eq!(item.name(), "");
        assert_eq!(item.add(1), Err(InventoryItemError::NotCreated));
    }
}

mod business_rules {
    use super::*;

    #[tokio::test]
    async fn removing_more_than_on_hand_changes_nothing() {
        let repo = create_repository();
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        item.add(1).unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let mut item: InventoryItem = repo.get_by_id(id).await.unwrap();
        let err = item.remove(5).unwrap_err();

        assert!(matches!(
            err,
            InventoryItemError::InsufficientStock {
                requested: 5,
                on_hand: 1
            }
        ));
        assert_eq!(item.count(), 1);
        assert_eq!(item.version(), Version::new(2));
        assert!(item.uncommitted_changes().is_empty());

        let domain_err = DomainError::from(err);
        assert!(!domain_err.is_invalid_argument());
    }

    #[tokio::test]
    async fn noop_commands_do_not_reach_the_store() {
        let repo = create_repository();
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        item.deactivate().unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let mut item: InventoryItem = repo.get_by_id(id).await.unwrap();
        item.rename("shoes").unwrap();
        item.deactivate().unwrap();
        assert!(item.uncommitted_changes().is_empty());

        let expected = item.version();
        let version = repo.save(&mut item, expected).await.unwrap();
        assert_eq!(version, Version::new(2));
        assert_eq!(repo.store().event_count().await, 2);
    }
}

mod concurrency {
    use super::*;

    type SharedRepository = Arc<Repository<InMemoryEventStore>>;

    async fn add_once(
        repo: SharedRepository,
        id: AggregateId,
        quantity: u32,
    ) -> Result<Version, DomainError> {
        let mut item: InventoryItem = repo.get_by_id(id).await?;
        let expected = item.version();
        item.add(quantity)?;
        repo.save(&mut item, expected).await
    }

    async fn add_with_retry(
        repo: SharedRepository,
        id: AggregateId,
        quantity: u32,
    ) -> Result<Version, DomainError> {
        loop {
            match add_once(Arc::clone(&repo), id, quantity).await {
                Err(err) if err.is_concurrency_conflict() => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn stale_save_is_rejected_and_stream_unchanged() {
        let repo = create_repository();
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let mut first: InventoryItem = repo.get_by_id(id).await.unwrap();
        let mut second: InventoryItem = repo.get_by_id(id).await.unwrap();

        first.add(5).unwrap();
        second.add(7).unwrap();

        repo.save(&mut first, Version::first()).await.unwrap();
        let err = repo.save(&mut second, Version::first()).await.unwrap_err();

        assert!(err.is_concurrency_conflict());
        assert_eq!(second.uncommitted_changes().len(), 1);

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.count(), 5);
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn stale_expected_version_on_reloaded_item_conflicts() {
        let repo = create_repository();
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let mut other: InventoryItem = repo.get_by_id(id).await.unwrap();
        other.add(3).unwrap();
        repo.save(&mut other, Version::first()).await.unwrap();

        let mut mine: InventoryItem = repo.get_by_id(id).await.unwrap();
        mine.add(2).unwrap();
        let err = repo.save(&mut mine, Version::first()).await.unwrap_err();

        assert!(err.is_concurrency_conflict());
        assert!(!err.is_invalid_argument());
        assert_eq!(mine.uncommitted_changes().len(), 1);

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.count(), 3);
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn creating_the_same_item_twice_conflicts() {
        let repo = create_repository();
        let id = AggregateId::new();

        let mut first = InventoryItem::create(id, "shoes").unwrap();
        let mut second = InventoryItem::create(id, "boots").unwrap();

        repo.save(&mut first, Version::initial()).await.unwrap();
        let err = repo.save(&mut second, Version::initial()).await.unwrap_err();

        assert!(err.is_concurrency_conflict());
        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.name(), "shoes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_one_wins_per_version() {
        let repo = Arc::new(create_repository());
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let handles: Vec<_> = (1..=8)
            .map(|quantity| {
                tokio::spawn(add_once(Arc::clone(&repo), id, quantity))
            })
            .collect();

        let mut saved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => saved += 1,
                Err(err) => assert!(err.is_concurrency_conflict(), "unexpected error {err}"),
            }
        }

        let events = repo.store().get_events_for_aggregate(id).await.unwrap();
        assert!(saved >= 1);
        assert_eq!(events.len(), 1 + saved);
        for (index, event) in events.iter().enumerate() {
            assert_eq!(event.version, Version::new(index as i64 + 1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn retry_after_conflict_eventually_applies_every_command() {
        let repo = Arc::new(create_repository());
        let id = AggregateId::new();
        let mut item = InventoryItem::create(id, "shoes").unwrap();
        repo.save(&mut item, Version::initial()).await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                tokio::spawn(add_with_retry(Arc::clone(&repo), id, 2))
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();
        assert_eq!(loaded.count(), 10);
        assert_eq!(loaded.version(), Version::new(6));
    }
}

mod replay {
    use super::*;

    fn history(id: AggregateId) -> Vec<InventoryItemEvent> {
        vec![
            InventoryItemEvent::created(id, "shoes", Version::new(1)),
            InventoryItemEvent::items_added(id, 10, Version::new(2)),
            InventoryItemEvent::renamed(id, "shoes", "boots", Version::new(3)),
            InventoryItemEvent::items_removed(id, 4, Version::new(4)),
            InventoryItemEvent::items_added(id, 1, Version::new(5)),
            InventoryItemEvent::deactivated(id, Version::new(6)),
        ]
    }

    #[test]
    fn replay_in_sub_batches_matches_full_replay() {
        let id = AggregateId::new();
        let events = history(id);

        let mut whole = InventoryItem::new_for_replay();
        whole.load_from_history(events.clone());

        for split in [vec![1, 5], vec![2, 2, 2], vec![3, 3], vec![1, 1, 1, 1, 1, 1]] {
            let mut batched = InventoryItem::new_for_replay();
            let mut rest = events.as_slice();
            for size in split {
                let (batch, tail) = rest.split_at(size);
                batched.load_from_history(batch.to_vec());
                rest = tail;
            }

            assert_eq!(batched.version(), whole.version());
            assert_eq!(batched.aggregate_id(), whole.aggregate_id());
            assert_eq!(batched.name(), whole.name());
            assert_eq!(batched.count(), whole.count());
            assert_eq!(batched.is_active(), whole.is_active());
        }

        assert_eq!(whole.version(), Version::new(6));
        assert_eq!(whole.count(), 7);
        assert_eq!(whole.name(), "boots");
        assert!(!whole.is_active());
    }

    #[tokio::test]
    async fn reload_matches_raised_state() {
        let repo = create_repository();
        let id = AggregateId::new();
        let mut item = InventoryItem::new_for_replay();
        for event in history(id) {
            item.raise_event(event);
        }
        repo.save(&mut item, Version::initial()).await.unwrap();

        let loaded: InventoryItem = repo.get_by_id(id).await.unwrap();

        assert_eq!(loaded.version(), item.version());
        assert_eq!(loaded.name(), item.name());
        assert_eq!(loaded.count(), item.count());
        assert_eq!(loaded.is_active(), item.is_active());
    }
}

mod store_failures {
    use super::*;

    /// Event store double whose backing log is always unreachable.
    struct UnavailableStore;

    fn unreachable() -> EventStoreError {
        EventStoreError::Unavailable(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "backing log unreachable",
        )))
    }

    #[async_trait]
    impl EventStore for UnavailableStore {
        async fn get_events_for_aggregate(
            &self,
            _aggregate_id: AggregateId,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            Err(unreachable())
        }

        async fn get_events_for_aggregate_from_version(
            &self,
            _aggregate_id: AggregateId,
            _from_version: Version,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            Err(unreachable())
        }

        async fn save_events(
            &self,
            _aggregate_id: AggregateId,
            _events: Vec<EventEnvelope>,
            _expected_version: Version,
        ) -> event_store::Result<Version> {
            Err(unreachable())
        }

        async fn get_aggregate_version(
            &self,
            _aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Version>> {
            Err(unreachable())
        }
    }

    #[tokio::test]
    async fn load_failure_is_store_unavailable() {
        let repo = Repository::new(UnavailableStore);

        let err = repo
            .get_by_id::<InventoryItem>(AggregateId::new())
            .await
            .unwrap_err();

        assert!(err.is_store_unavailable());
        assert!(!err.is_concurrency_conflict());
    }

    #[tokio::test]
    async fn save_failure_keeps_uncommitted_changes() {
        let repo = Repository::new(UnavailableStore);
        let mut item = InventoryItem::create(AggregateId::new(), "shoes").unwrap();
        item.add(2).unwrap();

        let err = repo.save(&mut item, Version::initial()).await.unwrap_err();

        assert!(err.is_store_unavailable());
        assert!(matches!(
            err,
            DomainError::EventStore(ref e) if e.is_retryable()
        ));
        assert_eq!(item.uncommitted_changes().len(), 2);
        assert_eq!(item.version(), Version::new(2));
    }

    #[tokio::test]
    async fn save_without_changes_skips_unavailable_store() {
        let repo = Repository::new(UnavailableStore);
        let mut item = InventoryItem::new_for_replay();

        let version = repo.save(&mut item, Version::initial()).await.unwrap();

        assert_eq!(version, Version::initial());
    }
}
