use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use survey_core::model::{
    AttributionQuestion, AttributionResponse, AttributionResponseDraft, Identity, ModelId,
    ProgressState, QuestionId, Response, ResponseKind, UserId,
};
use storage::repository::ResponseRepository;

use crate::error::{LoadError, SurveyError};
use crate::loader::QuestionLoader;
use crate::profile::ProfileService;
use crate::progress::{ProgressStep, ProgressTracker};
use crate::survey::started;
use crate::Clock;

/// A participant comparing both models' outputs step by step.
///
/// Progress is stored under the reserved `attribution` model key.
#[derive(Debug, Clone)]
pub struct AttributionSession {
    user_id: UserId,
    questions: Vec<AttributionQuestion>,
    index: usize,
    state: ProgressState,
    previous: HashMap<QuestionId, AttributionResponse>,
    presented_at: DateTime<Utc>,
}

impl AttributionSession {
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn questions(&self) -> &[AttributionQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&AttributionQuestion> {
        self.questions.get(self.index)
    }

    #[must_use]
    pub fn previous_answer(&self, id: &QuestionId) -> Option<&AttributionResponse> {
        self.previous.get(id)
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn state(&self) -> ProgressState {
        self.state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ProgressState::Complete
    }
}

#[derive(Clone)]
pub struct AttributionService {
    clock: Clock,
    loader: QuestionLoader,
    tracker: ProgressTracker,
    profiles: ProfileService,
    responses: Arc<dyn ResponseRepository>,
}

impl AttributionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        loader: QuestionLoader,
        tracker: ProgressTracker,
        profiles: ProfileService,
        responses: Arc<dyn ResponseRepository>,
    ) -> Self {
        Self {
            clock,
            loader,
            tracker,
            profiles,
            responses,
        }
    }

    /// # Errors
    ///
    /// Returns `SurveyError::Load` when the attribution file is missing or
    /// yields no questions, and storage-backed errors otherwise.
    pub async fn start(&self, identity: &Identity) -> Result<AttributionSession, SurveyError> {
        let key = ModelId::attribution();
        self.profiles.ensure_profile(identity).await?;
        let questions = self.loader.load_attribution().await?;
        if questions.is_empty() {
            return Err(LoadError::NoData {
                model: key,
                source: None,
            }
            .into());
        }

        let resume = self
            .tracker
            .resume(&identity.user_id, &key, questions.len())
            .await?;
        let previous = self
            .responses
            .responses_for_user(&identity.user_id, ResponseKind::Attribution, None)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Response::Attribution(a) => Some((a.question_id.clone(), a)),
                Response::Survey(_) => None,
            })
            .collect();

        info!(
            user = %identity.user_id,
            index = resume.index,
            total = questions.len(),
            "attribution session started"
        );
        Ok(AttributionSession {
            user_id: identity.user_id.clone(),
            questions,
            index: resume.index,
            state: started(resume.state),
            previous,
            presented_at: self.clock.now(),
        })
    }

    /// # Errors
    ///
    /// Returns `SurveyError::Completed`, `SurveyError::QuestionMismatch` or
    /// `SurveyError::AttributionValidation` before anything is stored, and
    /// storage-backed errors afterwards.
    pub async fn submit(
        &self,
        session: &mut AttributionSession,
        mut draft: AttributionResponseDraft,
    ) -> Result<AttributionResponse, SurveyError> {
        let question = session.current_question().ok_or(SurveyError::Completed)?;
        if draft.question_id != question.id {
            return Err(SurveyError::QuestionMismatch {
                expected: question.id.clone(),
                got: draft.question_id,
            });
        }
        if draft.completion_time_ms == 0 {
            draft.completion_time_ms = self.clock.millis_since(session.presented_at);
        }
        draft.user_id = session.user_id.clone();
        let now = self.clock.now();
        let response = draft.validate(question, now)?;

        self.responses
            .put_response(&Response::Attribution(response.clone()))
            .await?;
        let step = self
            .tracker
            .record_submission(
                &session.user_id,
                &ModelId::attribution(),
                &response.question_id,
                session.total(),
            )
            .await?;

        session
            .previous
            .insert(response.question_id.clone(), response.clone());
        apply(session, step, now);
        Ok(response)
    }

    /// # Errors
    ///
    /// Returns `SurveyError::Progress` if the cursor cannot be stored.
    pub async fn go_back(
        &self,
        session: &mut AttributionSession,
    ) -> Result<ProgressStep, SurveyError> {
        let step = self
            .tracker
            .navigate_back(&session.user_id, &ModelId::attribution(), session.total())
            .await?;
        apply(session, step, self.clock.now());
        Ok(step)
    }
}

fn apply(session: &mut AttributionSession, step: ProgressStep, now: DateTime<Utc>) {
    session.index = step.index;
    session.state = step.state;
    session.presented_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::StaticDatasetSource;
    use storage::repository::Storage;
    use survey_core::model::{AttributionRating, Rating};
    use survey_core::time::fixed_clock;

    const CSV: &str = "country,step,prompt,flux_output_file,qwen_output_file\n\
        Nigeria,0,market,f0.png,q0.png\n\
        Nigeria,1,add rain,f1.png,q1.png\n\
        Nigeria,2,add night,f2.png,q2.png\n";

    fn service(storage: &Storage) -> AttributionService {
        let clock = fixed_clock();
        let source = StaticDatasetSource::new().with_attribution(CSV);
        AttributionService::new(
            clock,
            QuestionLoader::new(Arc::new(source)),
            ProgressTracker::new(clock, Arc::clone(&storage.progress)),
            ProfileService::new(clock, Arc::clone(&storage.profiles)),
            Arc::clone(&storage.responses),
        )
    }

    fn draft(session: &AttributionSession) -> AttributionResponseDraft {
        let q = session.current_question().unwrap();
        let r = Rating::new(4).unwrap();
        let rating = AttributionRating {
            prompt_adherence: r,
            cultural_representativeness: r,
            image_quality: r,
        };
        q.outputs.iter().fold(
            AttributionResponseDraft::new(session.user_id().clone(), q.id.clone()),
            |d, o| d.rate(o.model.clone(), rating),
        )
    }

    #[tokio::test]
    async fn steps_through_attribution_questions() {
        let storage = Storage::in_memory();
        let svc = service(&storage);
        let identity = Identity::new(UserId::new("p2").unwrap(), "P Two");
        let mut session = svc.start(&identity).await.unwrap();
        assert_eq!(session.total(), 2);

        let d = draft(&session);
        let response = svc.submit(&mut session, d).await.unwrap();
        assert_eq!(response.step, 1);
        assert_eq!(session.index(), 1);

        let d = draft(&session);
        svc.submit(&mut session, d).await.unwrap();
        assert!(session.is_complete());

        svc.go_back(&mut session).await.unwrap();
        assert_eq!(session.index(), 1);
        assert_eq!(session.state(), ProgressState::InProgress);

        let resumed = svc.start(&identity).await.unwrap();
        assert_eq!(resumed.index(), 1);
        assert!(resumed.previous_answer(&session.questions()[0].id).is_some());
    }
}
