use async_trait::async_trait;
use chunkvault_core::models::{
    FileFilter, FileMetadata, FileRecord, FileStatus, NewFile, UploadRecord,
};
use chunkvault_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::locks::FileLease;
use super::repository::FileRepository;
use super::transaction::with_transaction;
use super::uploads::UPLOAD_COLUMNS;

pub(crate) const FILE_COLUMNS: &str = "id, owner_id, name, create_datetime, checksum, status, \
     expected_chunk_count, assembled_key, size_bytes, created_at, updated_at";

/// Map a unique violation on `(owner_id, name)` to `DuplicateName`
fn name_conflict(err: sqlx::Error, name: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::DuplicateName(name.to_string());
        }
    }
    AppError::Database(err)
}

/// Advisory lock key for a file; distinct files may share a key, which only
/// serializes them.
fn advisory_key(file_id: Uuid) -> i64 {
    let bits = file_id.as_u128();
    ((bits >> 64) as u64 ^ bits as u64) as i64
}

/// Open transaction holding `pg_advisory_xact_lock` for one file.
///
/// Dropping it rolls the transaction back, which releases the lock once the
/// connection returns to the pool.
struct PgFileLease {
    _tx: Transaction<'static, Postgres>,
}

impl FileLease for PgFileLease {}

/// Repository for the `files` table
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(
        skip(self, new_file),
        fields(db.table = "files", db.operation = "insert", owner_id = %new_file.owner_id)
    )]
    async fn create_with_uploads(
        &self,
        new_file: NewFile,
    ) -> Result<(FileRecord, Vec<UploadRecord>), AppError> {
        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                let file = sqlx::query_as::<Postgres, FileRecord>(&format!(
                    r#"
                    INSERT INTO files (owner_id, name, create_datetime, checksum, expected_chunk_count)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {}
                    "#,
                    FILE_COLUMNS
                ))
                .bind(new_file.owner_id)
                .bind(&new_file.name)
                .bind(new_file.create_datetime)
                .bind(&new_file.checksum)
                .bind(new_file.expected_chunk_count)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| name_conflict(e, &new_file.name))?;

                let mut uploads = sqlx::query_as::<Postgres, UploadRecord>(&format!(
                    r#"
                    INSERT INTO uploads (file_id, chunk_number)
                    SELECT $1, n FROM generate_series(1, $2) AS n
                    RETURNING {}
                    "#,
                    UPLOAD_COLUMNS
                ))
                .bind(file.id)
                .bind(file.expected_chunk_count)
                .fetch_all(&mut **tx)
                .await?;
                uploads.sort_by_key(|u| u.chunk_number);

                Ok((file, uploads))
            })
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select", db.record_id = %file_id))]
    async fn get(&self, owner_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let file = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM files WHERE owner_id = $1 AND id = $2",
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "select"))]
    async fn list(
        &self,
        owner_id: Uuid,
        filter: &FileFilter,
    ) -> Result<Vec<FileRecord>, AppError> {
        let files = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            SELECT {}
            FROM files
            WHERE owner_id = $1
              AND ($2::text IS NULL OR strpos(lower(name), lower($2)) > 0)
              AND ($3::text IS NULL OR status::text = $3)
            ORDER BY name
            LIMIT $4 OFFSET $5
            "#,
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .bind(filter.name_contains.as_deref())
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    #[tracing::instrument(skip(self, metadata), fields(db.table = "files", db.operation = "update", db.record_id = %file_id))]
    async fn update_metadata(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        metadata: &FileMetadata,
    ) -> Result<Option<FileRecord>, AppError> {
        let file = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            UPDATE files
            SET name = $3, checksum = $4, create_datetime = $5, updated_at = NOW()
            WHERE owner_id = $1 AND id = $2 AND assembled_key IS NULL
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .bind(file_id)
        .bind(&metadata.name)
        .bind(&metadata.checksum)
        .bind(metadata.create_datetime)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| name_conflict(e, &metadata.name))?;

        Ok(file)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %file_id))]
    async fn set_status(&self, file_id: Uuid, status: FileStatus) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND assembled_key IS NULL AND status <> $2
            "#,
        )
        .bind(file_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update", db.record_id = %file_id))]
    async fn mark_assembled(
        &self,
        file_id: Uuid,
        assembled_key: &str,
        size_bytes: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET assembled_key = $2, size_bytes = $3, status = 'completed', updated_at = NOW()
            WHERE id = $1 AND assembled_key IS NULL
            "#,
        )
        .bind(file_id)
        .bind(assembled_key)
        .bind(size_bytes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete", db.record_id = %file_id))]
    async fn delete(&self, owner_id: Uuid, file_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM files WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.operation = "advisory_lock", file_id = %file_id))]
    async fn lock_file(&self, file_id: Uuid) -> Result<Box<dyn FileLease>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_key(file_id))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgFileLease { _tx: tx }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_columns_match_record_fields() {
        let columns: Vec<&str> = FILE_COLUMNS.split(',').map(str::trim).collect();
        assert_eq!(columns.len(), 11);
        assert!(columns.contains(&"assembled_key"));
        assert!(columns.contains(&"expected_chunk_count"));
    }

    #[test]
    fn test_advisory_key_is_stable_per_file() {
        let file_id = Uuid::new_v4();
        assert_eq!(advisory_key(file_id), advisory_key(file_id));
        assert_eq!(advisory_key(Uuid::nil()), 0);
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = name_conflict(sqlx::Error::RowNotFound, "a.bin");
        assert!(matches!(err, AppError::Database(_)));
    }
}
