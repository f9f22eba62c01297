use std::sync::Arc;

use tracing::{debug, warn};

use survey_core::model::{ModelId, ProgressState, QuestionId, UserId, UserProgress};
use storage::repository::{ProgressRepository, StorageError};

use crate::error::ProgressError;
use crate::Clock;

/// Where a participant resumes a model's question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub index: usize,
    pub state: ProgressState,
    /// The stored cursor was stale and has been reset.
    pub repaired: bool,
}

/// Cursor position after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    pub index: usize,
    pub state: ProgressState,
    pub completed: usize,
}

impl ProgressStep {
    fn of(progress: &UserProgress, model: &ModelId, total: usize) -> Self {
        Self {
            index: progress.current_index(model),
            state: progress.state_for(model, total),
            completed: progress.completed_for(model).len(),
        }
    }
}

/// Persists per-user cursors and completed sets.
///
/// Every transition rewrites the whole progress document; concurrent writers
/// for one user resolve as last write wins.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    async fn load(&self, user_id: &UserId) -> Result<UserProgress, ProgressError> {
        let stored = self
            .progress
            .get_progress(user_id)
            .await
            .map_err(|e| storage_failure(user_id, "read", e))?;
        Ok(stored.unwrap_or_else(|| UserProgress::new(user_id.clone(), self.clock.now())))
    }

    async fn save(&self, progress: &UserProgress) -> Result<(), ProgressError> {
        self.progress
            .put_progress(progress)
            .await
            .map_err(|e| storage_failure(progress.user_id(), "write", e))
    }

    /// Resume point for `model`, repairing a cursor left stale by a dataset
    /// that shrank since it was stored.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the record cannot be read, or the
    /// repaired record cannot be written.
    pub async fn resume(
        &self,
        user_id: &UserId,
        model: &ModelId,
        total: usize,
    ) -> Result<ResumePoint, ProgressError> {
        let fixed = self.load(user_id).await?.reconcile(model, total);
        if fixed.repaired {
            warn!(user = %user_id, %model, total, "stale progress reset");
            self.save(&fixed.progress).await?;
        }
        let progress = fixed.progress;
        debug!(user = %user_id, %model, index = progress.current_index(model), "resume");
        Ok(ResumePoint {
            index: progress.current_index(model),
            state: progress.state_for(model, total),
            repaired: fixed.repaired,
        })
    }

    /// Mark `question_id` answered and advance the cursor.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the record cannot be read or written.
    pub async fn record_submission(
        &self,
        user_id: &UserId,
        model: &ModelId,
        question_id: &QuestionId,
        total: usize,
    ) -> Result<ProgressStep, ProgressError> {
        let mut progress = self.load(user_id).await?;
        progress.record_submission(model, question_id, total, self.clock.now());
        self.save(&progress).await?;
        Ok(ProgressStep::of(&progress, model, total))
    }

    /// Move the cursor back one question; the completed set is untouched.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the record cannot be read or written.
    pub async fn navigate_back(
        &self,
        user_id: &UserId,
        model: &ModelId,
        total: usize,
    ) -> Result<ProgressStep, ProgressError> {
        let mut progress = self.load(user_id).await?;
        progress.navigate_back(model, self.clock.now());
        self.save(&progress).await?;
        Ok(ProgressStep::of(&progress, model, total))
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the record cannot be read.
    pub async fn progress_for(&self, user_id: &UserId) -> Result<Option<UserProgress>, ProgressError> {
        self.progress
            .get_progress(user_id)
            .await
            .map_err(|e| storage_failure(user_id, "read", e))
    }
}

fn storage_failure(user_id: &UserId, op: &str, err: StorageError) -> ProgressError {
    warn!(user = %user_id, op, error = %err, "progress persistence failed");
    ProgressError::Storage(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use survey_core::time::{fixed_clock, fixed_now};

    fn tracker() -> (ProgressTracker, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let progress: Arc<dyn ProgressRepository> = repo.clone();
        (ProgressTracker::new(fixed_clock(), progress), repo)
    }

    fn ids() -> (UserId, ModelId) {
        (UserId::new("u1").unwrap(), ModelId::new("flux").unwrap())
    }

    fn qid(n: usize) -> QuestionId {
        QuestionId::new(format!("q{n}")).unwrap()
    }

    #[tokio::test]
    async fn fresh_user_starts_at_zero_without_writing() {
        let (tracker, repo) = tracker();
        let (user, flux) = ids();
        let point = tracker.resume(&user, &flux, 10).await.unwrap();
        assert_eq!(point.index, 0);
        assert_eq!(point.state, ProgressState::NotStarted);
        assert!(!point.repaired);
        assert!(repo.get_progress(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn submissions_advance_and_persist() {
        let (tracker, repo) = tracker();
        let (user, flux) = ids();
        for n in 0..3 {
            tracker.record_submission(&user, &flux, &qid(n), 3).await.unwrap();
        }
        let step = tracker.navigate_back(&user, &flux, 3).await.unwrap();
        assert_eq!(step.index, 2);
        assert_eq!(step.completed, 3);

        let stored = repo.get_progress(&user).await.unwrap().unwrap();
        assert_eq!(stored.current_index(&flux), 2);
    }

    #[tokio::test]
    async fn resume_repairs_and_persists_stale_cursor() {
        let (tracker, repo) = tracker();
        let (user, flux) = ids();
        let mut stale = UserProgress::new(user.clone(), fixed_now());
        for n in 0..8 {
            stale.record_submission(&flux, &qid(n), 8, fixed_now());
        }
        repo.put_progress(&stale).await.unwrap();

        let point = tracker.resume(&user, &flux, 5).await.unwrap();
        assert!(point.repaired);
        assert_eq!(point.index, 0);

        let stored = repo.get_progress(&user).await.unwrap().unwrap();
        assert!(stored.completed_for(&flux).is_empty());
        assert!(!tracker.resume(&user, &flux, 5).await.unwrap().repaired);
    }
}
