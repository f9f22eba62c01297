use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use survey_core::model::{
    ModelId, QuestionId, Response, ResponseId, ResponseKind, UserId, UserProfile, UserProgress,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Survey and step-level (attribution) responses.
///
/// Responses are append-only; a participant re-answering a question adds a
/// new document and lookups return the most recent one.
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Store a response in the collection matching its kind.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists, or other storage errors.
    async fn put_response(&self, response: &Response) -> Result<ResponseId, StorageError>;

    /// Responses of one user for a task, optionally restricted to a model.
    ///
    /// Ordered oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn responses_for_user(
        &self,
        user_id: &UserId,
        kind: ResponseKind,
        model: Option<&ModelId>,
    ) -> Result<Vec<Response>, StorageError>;

    /// Latest response of a user to a question, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn response_for(
        &self,
        user_id: &UserId,
        question_id: &QuestionId,
    ) -> Result<Option<Response>, StorageError>;

    /// Every stored response of a task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn all_responses(&self, kind: ResponseKind) -> Result<Vec<Response>, StorageError>;
}

/// One progress document per user. Writes replace the whole document.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read or decoded.
    async fn get_progress(&self, user_id: &UserId) -> Result<Option<UserProgress>, StorageError>;

    /// Overwrite the user's progress document (last write wins).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn put_progress(&self, progress: &UserProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn list_progress(&self) -> Result<Vec<UserProgress>, StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read or decoded.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StorageError>;

    /// Profiles ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn list_profiles(&self) -> Result<Vec<UserProfile>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    responses: Arc<Mutex<Vec<Response>>>,
    progress: Arc<Mutex<HashMap<UserId, UserProgress>>>,
    profiles: Arc<Mutex<HashMap<UserId, UserProfile>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ResponseRepository for InMemoryRepository {
    async fn put_response(&self, response: &Response) -> Result<ResponseId, StorageError> {
        let mut guard = self.responses.lock().map_err(poisoned)?;
        if guard.iter().any(|r| r.id() == response.id()) {
            return Err(StorageError::Conflict);
        }
        guard.push(response.clone());
        Ok(response.id())
    }

    async fn responses_for_user(
        &self,
        user_id: &UserId,
        kind: ResponseKind,
        model: Option<&ModelId>,
    ) -> Result<Vec<Response>, StorageError> {
        let guard = self.responses.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|r| r.kind() == kind && r.user_id() == user_id)
            .filter(|r| model.is_none_or(|m| &r.model() == m))
            .cloned()
            .collect())
    }

    async fn response_for(
        &self,
        user_id: &UserId,
        question_id: &QuestionId,
    ) -> Result<Option<Response>, StorageError> {
        let guard = self.responses.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .rev()
            .find(|r| r.user_id() == user_id && r.question_id() == question_id)
            .cloned())
    }

    async fn all_responses(&self, kind: ResponseKind) -> Result<Vec<Response>, StorageError> {
        let guard = self.responses.lock().map_err(poisoned)?;
        Ok(guard.iter().filter(|r| r.kind() == kind).cloned().collect())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(&self, user_id: &UserId) -> Result<Option<UserProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(user_id).cloned())
    }

    async fn put_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert(progress.user_id().clone(), progress.clone());
        Ok(())
    }

    async fn list_progress(&self) -> Result<Vec<UserProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut all: Vec<UserProgress> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.user_id().cmp(b.user_id()));
        Ok(all)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        Ok(guard.get(user_id).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let mut guard = self.profiles.lock().map_err(poisoned)?;
        guard.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        let mut all: Vec<UserProfile> = guard.values().cloned().collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }
}

/// Aggregates the document collections behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub responses: Arc<dyn ResponseRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let responses: Arc<dyn ResponseRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo);
        Self {
            responses,
            progress,
            profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::model::{
        Country, ImageRating, ImageStep, Rating, StepRating, SurveyResponse,
    };
    use survey_core::time::fixed_now;

    fn response(user: &str, question: &str, model: &str) -> Response {
        let rating = ImageRating::new(Rating::new(3).unwrap(), Rating::new(4).unwrap());
        Response::Survey(SurveyResponse {
            id: ResponseId::generate(),
            user_id: UserId::new(user).unwrap(),
            question_id: QuestionId::new(question).unwrap(),
            model: ModelId::new(model).unwrap(),
            country: Country::new("Kenya"),
            category: "food".into(),
            sub_category: "ugali".into(),
            variant: "general".into(),
            image_ratings: ImageStep::SURVEY_STEPS
                .iter()
                .map(|&step| StepRating { step, rating })
                .collect(),
            best_step: ImageStep::Edit5,
            worst_step: ImageStep::Base,
            comment: None,
            completion_time_ms: 1000,
            submitted_at: fixed_now(),
        })
    }

    #[tokio::test]
    async fn filters_responses_by_user_and_model() {
        let repo = InMemoryRepository::new();
        repo.put_response(&response("a", "q1", "flux")).await.unwrap();
        repo.put_response(&response("a", "q2", "qwen")).await.unwrap();
        repo.put_response(&response("b", "q1", "flux")).await.unwrap();

        let user = UserId::new("a").unwrap();
        let flux = ModelId::new("flux").unwrap();
        let mine = repo
            .responses_for_user(&user, ResponseKind::Survey, Some(&flux))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        let all_mine = repo
            .responses_for_user(&user, ResponseKind::Survey, None)
            .await
            .unwrap();
        assert_eq!(all_mine.len(), 2);
        assert!(
            repo.all_responses(ResponseKind::Attribution)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn latest_response_wins_lookup() {
        let repo = InMemoryRepository::new();
        let first = response("a", "q1", "flux");
        let second = response("a", "q1", "flux");
        repo.put_response(&first).await.unwrap();
        repo.put_response(&second).await.unwrap();

        let found = repo
            .response_for(&UserId::new("a").unwrap(), &QuestionId::new("q1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), second.id());
        assert!(matches!(
            repo.put_response(&second).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn progress_document_is_overwritten() {
        let repo = InMemoryRepository::new();
        let user = UserId::new("a").unwrap();
        let flux = ModelId::new("flux").unwrap();
        let mut progress = UserProgress::new(user.clone(), fixed_now());
        repo.put_progress(&progress).await.unwrap();

        progress.record_submission(&flux, &QuestionId::new("q1").unwrap(), 3, fixed_now());
        repo.put_progress(&progress).await.unwrap();

        let stored = repo.get_progress(&user).await.unwrap().unwrap();
        assert_eq!(stored.current_index(&flux), 1);
        assert_eq!(repo.list_progress().await.unwrap().len(), 1);
    }
}
