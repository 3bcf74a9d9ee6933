use async_trait::async_trait;
use chunkvault_core::models::{UploadRecord, UploadStatus, UploadTransition};
use chunkvault_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::repository::UploadRepository;

pub(crate) const UPLOAD_COLUMNS: &str =
    "id, file_id, chunk_number, status, storage_key, size_bytes, created_at, updated_at";

/// Repository for the `uploads` table
#[derive(Clone)]
pub struct PgUploadRepository {
    pool: PgPool,
}

impl PgUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadRepository for PgUploadRepository {
    #[tracing::instrument(skip(self), fields(db.table = "uploads", db.operation = "select"))]
    async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<UploadRecord>, AppError> {
        let uploads = sqlx::query_as::<Postgres, UploadRecord>(&format!(
            "SELECT {} FROM uploads WHERE file_id = $1 ORDER BY chunk_number",
            UPLOAD_COLUMNS
        ))
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }

    #[tracing::instrument(
        skip(self, from, transition),
        fields(db.table = "uploads", db.operation = "update", to = %transition.to)
    )]
    async fn transition(
        &self,
        file_id: Uuid,
        chunk_number: i32,
        from: &[UploadStatus],
        transition: &UploadTransition,
    ) -> Result<Option<UploadRecord>, AppError> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();

        let upload = sqlx::query_as::<Postgres, UploadRecord>(&format!(
            r#"
            UPDATE uploads
            SET status = $4, storage_key = $5, size_bytes = $6, updated_at = NOW()
            WHERE file_id = $1 AND chunk_number = $2 AND status::text = ANY($3)
            RETURNING {}
            "#,
            UPLOAD_COLUMNS
        ))
        .bind(file_id)
        .bind(chunk_number)
        .bind(&from)
        .bind(transition.to)
        .bind(&transition.storage_key)
        .bind(transition.size_bytes)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }
}
