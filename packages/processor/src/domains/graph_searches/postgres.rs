//! PostgreSQL-backed graph search store.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use super::models::{GraphResult, GraphSearch, GraphSearchFilter, NewGraphSearch, PROGRESS_FAILED};
use super::store::GraphSearchStore;
use crate::common::{GraphSearchId, Result};

const COLUMNS: &str = "id, name, type, status, options, metadata, result, error, processor_id, \
                       created_at, updated_at";

#[derive(Clone)]
pub struct PostgresGraphSearchStore {
    pool: PgPool,
}

impl PostgresGraphSearchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphSearchStore for PostgresGraphSearchStore {
    async fn insert(&self, new: NewGraphSearch) -> Result<GraphSearch> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            INSERT INTO graph_searches (id, name, type, status, options, metadata, processor_id)
            VALUES ($1, $2, $3, 'PENDING', $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(GraphSearchId::new())
        .bind(&new.name)
        .bind(new.kind)
        .bind(&new.options)
        .bind(&new.metadata)
        .bind(&new.processor_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(search)
    }

    async fn find(&self, filter: &GraphSearchFilter) -> Result<Option<GraphSearch>> {
        let search = match filter {
            GraphSearchFilter::Id(id) => {
                sqlx::query_as::<_, GraphSearch>(&format!(
                    "SELECT {COLUMNS} FROM graph_searches WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            GraphSearchFilter::Name(name) => {
                sqlx::query_as::<_, GraphSearch>(&format!(
                    r#"
                    SELECT {COLUMNS} FROM graph_searches
                    WHERE name = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#
                ))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(search)
    }

    async fn list(&self) -> Result<Vec<GraphSearch>> {
        let searches = sqlx::query_as::<_, GraphSearch>(&format!(
            "SELECT {COLUMNS} FROM graph_searches ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(searches)
    }

    async fn delete(&self, id: GraphSearchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM graph_searches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_pending(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM graph_searches WHERE status = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn claim_next_pending(&self, owner: &str) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            WITH next_search AS (
                SELECT id
                FROM graph_searches
                WHERE status = 'PENDING'
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE graph_searches
            SET
                status = 'PROCESSING',
                processor_id = $1,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_search)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn mark_processing(
        &self,
        id: GraphSearchId,
        owner: &str,
    ) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            UPDATE graph_searches
            SET status = 'PROCESSING', processor_id = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn merge_metadata(
        &self,
        id: GraphSearchId,
        patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            UPDATE graph_searches
            SET metadata = metadata || $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn record_progress(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            UPDATE graph_searches
            SET result = $2, metadata = metadata || $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(Json(result))
        .bind(metadata_patch)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn mark_done(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            UPDATE graph_searches
            SET
                status = 'DONE',
                error = NULL,
                result = $2,
                metadata = metadata || $3,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PROCESSING', 'DONE')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(Json(result))
        .bind(metadata_patch)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn mark_done_error(
        &self,
        id: GraphSearchId,
        error: &str,
    ) -> Result<Option<GraphSearch>> {
        let search = sqlx::query_as::<_, GraphSearch>(&format!(
            r#"
            UPDATE graph_searches
            SET
                status = 'DONE_ERROR',
                error = $2,
                metadata = CASE
                    WHEN jsonb_typeof(metadata -> 'progress') = 'object'
                    THEN jsonb_set(metadata, '{{progress,state}}', to_jsonb($3::text))
                    ELSE metadata
                END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .bind(PROGRESS_FAILED)
        .fetch_optional(&self.pool)
        .await?;

        Ok(search)
    }

    async fn reset_outdated(&self, owner: &str, error_marker: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE graph_searches
            SET status = 'PENDING', processor_id = NULL, updated_at = NOW()
            WHERE processor_id = $1
              AND (
                  status = 'PROCESSING'
                  OR (status = 'DONE_ERROR' AND STRPOS(LOWER(error), LOWER($2)) > 0)
              )
            "#,
        )
        .bind(owner)
        .bind(error_marker)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
