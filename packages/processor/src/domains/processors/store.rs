use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Mutex;

use super::models::{Processor, ProcessorPatch};
use crate::common::{merge_json_object, ProcessorError, Result};

#[async_trait]
pub trait ProcessorStore: Send + Sync {
    /// Insert or update in one statement. `created_at` is only set on insert.
    async fn upsert(&self, id: &str, patch: &ProcessorPatch) -> Result<Processor>;

    async fn find(&self, id: &str) -> Result<Option<Processor>>;
}

// ============================================================================
// Postgres
// ============================================================================

#[derive(Clone)]
pub struct PostgresProcessorStore {
    pool: PgPool,
}

impl PostgresProcessorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessorStore for PostgresProcessorStore {
    async fn upsert(&self, id: &str, patch: &ProcessorPatch) -> Result<Processor> {
        let processor = sqlx::query_as::<_, Processor>(
            r#"
            INSERT INTO processors (id, metadata, last_poll_at, last_processed_at, created_at, updated_at)
            VALUES ($1, COALESCE($2, '{}'::jsonb), $3, $4, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                metadata = processors.metadata || COALESCE($2, '{}'::jsonb),
                last_poll_at = COALESCE($3, processors.last_poll_at),
                last_processed_at = COALESCE($4, processors.last_processed_at),
                updated_at = NOW()
            RETURNING id, metadata, last_poll_at, last_processed_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&patch.metadata)
        .bind(patch.last_poll_at)
        .bind(patch.last_processed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(processor)
    }

    async fn find(&self, id: &str) -> Result<Option<Processor>> {
        let processor = sqlx::query_as::<_, Processor>(
            r#"
            SELECT id, metadata, last_poll_at, last_processed_at, created_at, updated_at
            FROM processors
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(processor)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryProcessorStore {
    processors: Mutex<HashMap<String, Processor>>,
    unavailable: AtomicBool,
}

impl InMemoryProcessorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProcessorError::store(anyhow!("in-memory processor store unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessorStore for InMemoryProcessorStore {
    async fn upsert(&self, id: &str, patch: &ProcessorPatch) -> Result<Processor> {
        self.check_available()?;
        let mut processors = self.processors.lock().await;
        let now = Utc::now();

        let processor = processors.entry(id.to_string()).or_insert_with(|| Processor {
            id: id.to_string(),
            metadata: json!({}),
            last_poll_at: None,
            last_processed_at: None,
            created_at: now,
            updated_at: now,
        });

        if let Some(metadata) = &patch.metadata {
            merge_json_object(&mut processor.metadata, metadata);
        }
        if patch.last_poll_at.is_some() {
            processor.last_poll_at = patch.last_poll_at;
        }
        if patch.last_processed_at.is_some() {
            processor.last_processed_at = patch.last_processed_at;
        }
        processor.updated_at = now;

        Ok(processor.clone())
    }

    async fn find(&self, id: &str) -> Result<Option<Processor>> {
        self.check_available()?;
        Ok(self.processors.lock().await.get(id).cloned())
    }
}
