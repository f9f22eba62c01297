use survey_core::model::{UserId, UserProfile};

use super::SqliteRepository;
use super::mapping::{conn, from_document, to_document};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StorageError> {
        let row = sqlx::query("SELECT document FROM user_profiles WHERE user_id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(from_document).transpose()
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let document = to_document(profile)?;

        sqlx::query(
            r"
            INSERT INTO user_profiles (user_id, last_seen_at, document)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                last_seen_at = excluded.last_seen_at,
                document = excluded.document
            ",
        )
        .bind(profile.user_id.as_str())
        .bind(profile.last_seen_at)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>, StorageError> {
        let rows = sqlx::query("SELECT document FROM user_profiles ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(from_document).collect()
    }
}
