use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::DocumentStore;
use crate::error::StoreError;
use crate::models::{DocumentMetadata, DocumentRecord};

/// Postgres-backed document store
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Connect a pool to `database_url`
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    async fn load(&self, doc_id: &str, with_state: bool) -> Result<Option<DocumentRecord>, StoreError> {
        // Document ids are uuids; anything else cannot exist
        let Ok(document_id) = uuid::Uuid::parse_str(doc_id) else {
            warn!("Rejecting malformed document id '{}'", doc_id);
            return Ok(None);
        };

        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        debug!(
            "Loading document {}. Pool connections: {} idle, {} in use",
            document_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        let query_sql = r#"
            SELECT
                d.id,
                d.name,
                d.type,
                d.owner,
                d.created_at,
                d.updated_at,
                CASE WHEN $2 THEN d.state END AS state,
                d.commit_id
            FROM documents d
            WHERE
                d.id = $1
                AND d.deleted = FALSE
        "#;

        let row = sqlx::query(query_sql)
            .bind(document_id)
            .bind(with_state)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: uuid::Uuid = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        let metadata = DocumentMetadata {
            id: id.to_string(),
            title: row.try_get("name")?,
            owner: row.try_get("owner")?,
            doc_type: row.try_get("type")?,
            created_at,
            updated_at,
        };

        info!("Document '{}' loaded", metadata.title);

        Ok(Some(DocumentRecord {
            metadata,
            state: row.try_get("state")?,
            commit_id: row.try_get("commit_id")?,
        }))
    }

    async fn store(&self, doc_id: &str, state: Vec<u8>, commit_id: i64) -> Result<bool, StoreError> {
        let Ok(document_id) = uuid::Uuid::parse_str(doc_id) else {
            return Ok(false);
        };

        let update_sql = r#"
            UPDATE documents
            SET state = $1,
                commit_id = $2,
                updated_at = NOW()
            WHERE id = $3
                AND deleted = FALSE
        "#;

        let result = sqlx::query(update_sql)
            .bind(state)
            .bind(commit_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl DocumentStore for PgDocumentStore {
    fn get_document<'a>(
        &'a self,
        doc_id: &'a str,
        with_state: bool,
    ) -> BoxFuture<'a, Result<Option<DocumentRecord>, StoreError>> {
        self.load(doc_id, with_state).boxed()
    }

    fn update_state_of_document<'a>(
        &'a self,
        doc_id: &'a str,
        state: Vec<u8>,
        commit_id: i64,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        self.store(doc_id, state, commit_id).boxed()
    }
}
