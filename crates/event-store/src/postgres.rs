//! PostgreSQL event store backend built on sqlx.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, Result, Version,
    config::PostgresConfig,
    store::{EventStore, concurrency_conflict, ensure_batch_follows, validate_append},
};

/// PostgreSQL-backed event store implementation.
///
/// Each stream owns a row in `streams` whose `version` column is advanced
/// with a compare-and-set update inside the same transaction that inserts
/// the events, so a stale writer matches zero rows and appends nothing.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the given configuration.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        Ok(Self::new(config.connect().await?))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata = decode_metadata(row.try_get("metadata")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        Ok(self
            .get_aggregate_version(aggregate_id)
            .await?
            .unwrap_or(Version::initial()))
    }
}

/// Decodes the `metadata` column of a stored event.
///
/// A value that is not a JSON object is corrupt stored data and surfaces as
/// [`crate::EventStoreError::Serialization`]: the backend answered, so this
/// is not an availability problem and retrying will not help.
fn decode_metadata(value: serde_json::Value) -> Result<HashMap<String, serde_json::Value>> {
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self))]
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::first())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM events
            WHERE aggregate_id = $1 AND version >= $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = rows.len(), "read stream");
        rows.into_iter().map(Self::row_to_event).collect()
    }

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn save_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<EventEnvelope>,
        expected_version: Version,
    ) -> Result<Version> {
        validate_append(aggregate_id, &events, expected_version)?;

        let Some(first_event) = events.first() else {
            tracing::debug!("empty batch, nothing to append");
            return Ok(expected_version);
        };

        let new_version = expected_version.advanced_by(events.len());
        let mut tx = self.pool.begin().await?;

        // Claim the stream: create it, or advance it only if nobody else has.
        let claimed = if expected_version == Version::initial() {
            sqlx::query(
                r#"
                INSERT INTO streams (aggregate_id, aggregate_type, version)
                VALUES ($1, $2, $3)
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(aggregate_id.as_uuid())
            .bind(&first_event.aggregate_type)
            .bind(new_version.as_i64())
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query("UPDATE streams SET version = $3 WHERE aggregate_id = $1 AND version = $2")
                .bind(aggregate_id.as_uuid())
                .bind(expected_version.as_i64())
                .bind(new_version.as_i64())
                .execute(&mut *tx)
                .await?
        };

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            let actual = self.current_version(aggregate_id).await?;
            return Err(concurrency_conflict(aggregate_id, expected_version, actual));
        }

        // The stream is at `expected_version`, so a misplaced batch is the caller's bug.
        if let Err(err) = ensure_batch_follows(&events, expected_version) {
            tx.rollback().await?;
            return Err(err);
        }

        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await;

            if let Err(sqlx::Error::Database(ref db_err)) = inserted
                && db_err.constraint() == Some("unique_aggregate_version")
            {
                return Err(concurrency_conflict(
                    aggregate_id,
                    expected_version,
                    event.version,
                ));
            }
            inserted?;
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_appended_total").increment(events.len() as u64);
        tracing::info!(%new_version, "appended events");
        Ok(new_version)
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM streams WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }
}
