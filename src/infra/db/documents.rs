use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{DocumentsRepo, RepoError},
    domain::entities::DocumentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const DOCUMENT_COLUMNS: &str = "id, slug, kind, title, body_html, published_at, \
     cached_artifact_name, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    slug: String,
    kind: String,
    title: String,
    body_html: String,
    published_at: OffsetDateTime,
    cached_artifact_name: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DocumentRow> for DocumentRecord {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            kind: row.kind,
            title: row.title,
            body_html: row.body_html,
            published_at: row.published_at,
            cached_artifact_name: row.cached_artifact_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DocumentsRepo for PostgresRepositories {
    async fn find_document(&self, id: Uuid) -> Result<Option<DocumentRecord>, RepoError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(DocumentRecord::from))
    }

    async fn find_document_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<DocumentRecord>, RepoError> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE slug = $1");
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(DocumentRecord::from))
    }

    async fn store_cached_artifact_name(&self, id: Uuid, name: &str) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET cached_artifact_name = $2
            WHERE id = $1
              AND (cached_artifact_name IS NULL OR cached_artifact_name = '')
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_cached_artifact_name(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE documents SET cached_artifact_name = NULL WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
