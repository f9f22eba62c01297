use survey_core::model::{ModelId, QuestionId, Response, ResponseId, ResponseKind, UserId};

use super::SqliteRepository;
use super::mapping::{conn, from_document, is_unique_violation, to_document};
use crate::repository::{ResponseRepository, StorageError};

fn table(kind: ResponseKind) -> &'static str {
    match kind {
        ResponseKind::Survey => "survey_responses",
        ResponseKind::Attribution => "step_responses",
    }
}

#[async_trait::async_trait]
impl ResponseRepository for SqliteRepository {
    async fn put_response(&self, response: &Response) -> Result<ResponseId, StorageError> {
        let document = to_document(response)?;
        let sql = format!(
            "INSERT INTO {} (id, user_id, question_id, model, submitted_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            table(response.kind())
        );

        sqlx::query(&sql)
            .bind(response.id().to_string())
            .bind(response.user_id().as_str())
            .bind(response.question_id().as_str())
            .bind(response.model().as_str().to_owned())
            .bind(response.submitted_at())
            .bind(document)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Conflict
                } else {
                    conn(e)
                }
            })?;

        Ok(response.id())
    }

    async fn responses_for_user(
        &self,
        user_id: &UserId,
        kind: ResponseKind,
        model: Option<&ModelId>,
    ) -> Result<Vec<Response>, StorageError> {
        let sql = format!(
            "SELECT document FROM {}
             WHERE user_id = ?1 AND (?2 IS NULL OR model = ?2)
             ORDER BY seq ASC",
            table(kind)
        );

        let rows = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(model.map(ModelId::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(from_document).collect()
    }

    async fn response_for(
        &self,
        user_id: &UserId,
        question_id: &QuestionId,
    ) -> Result<Option<Response>, StorageError> {
        let mut latest: Option<Response> = None;
        for kind in [ResponseKind::Survey, ResponseKind::Attribution] {
            let sql = format!(
                "SELECT document FROM {}
                 WHERE user_id = ?1 AND question_id = ?2
                 ORDER BY seq DESC
                 LIMIT 1",
                table(kind)
            );
            let row = sqlx::query(&sql)
                .bind(user_id.as_str())
                .bind(question_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?;

            if let Some(row) = row {
                let found: Response = from_document(&row)?;
                if latest
                    .as_ref()
                    .is_none_or(|l| found.submitted_at() >= l.submitted_at())
                {
                    latest = Some(found);
                }
            }
        }
        Ok(latest)
    }

    async fn all_responses(&self, kind: ResponseKind) -> Result<Vec<Response>, StorageError> {
        let sql = format!("SELECT document FROM {} ORDER BY seq ASC", table(kind));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(from_document).collect()
    }
}
