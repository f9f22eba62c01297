use survey_core::model::{UserId, UserProgress};

use super::SqliteRepository;
use super::mapping::{conn, from_document, to_document};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(&self, user_id: &UserId) -> Result<Option<UserProgress>, StorageError> {
        let row = sqlx::query("SELECT document FROM user_progress WHERE user_id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(from_document).transpose()
    }

    async fn put_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let document = to_document(progress)?;

        sqlx::query(
            r"
            INSERT INTO user_progress (user_id, updated_at, document)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                updated_at = excluded.updated_at,
                document = excluded.document
            ",
        )
        .bind(progress.user_id().as_str())
        .bind(progress.updated_at())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_progress(&self) -> Result<Vec<UserProgress>, StorageError> {
        let rows = sqlx::query("SELECT document FROM user_progress ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(from_document).collect()
    }
}
