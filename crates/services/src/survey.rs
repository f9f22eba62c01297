use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use survey_core::model::{
    Country, Identity, ModelId, ProgressState, QuestionId, Response, ResponseKind,
    SurveyQuestion, SurveyResponse, SurveyResponseDraft, UserId,
};
use storage::repository::ResponseRepository;

use crate::error::SurveyError;
use crate::loader::{QuestionLoader, QuestionSet};
use crate::profile::ProfileService;
use crate::progress::{ProgressStep, ProgressTracker};
use crate::Clock;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A participant working through one model's questions for a country.
#[derive(Debug, Clone)]
pub struct SurveySession {
    user_id: UserId,
    set: QuestionSet,
    index: usize,
    state: ProgressState,
    repaired: bool,
    previous: HashMap<QuestionId, SurveyResponse>,
    presented_at: DateTime<Utc>,
}

impl SurveySession {
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn model(&self) -> &ModelId {
        &self.set.model
    }

    #[must_use]
    pub fn country(&self) -> &Country {
        &self.set.country
    }

    #[must_use]
    pub fn questions(&self) -> &[SurveyQuestion] {
        &self.set.questions
    }

    /// Question at the cursor; `None` once every question is answered.
    #[must_use]
    pub fn current_question(&self) -> Option<&SurveyQuestion> {
        self.set.get(self.index)
    }

    /// The participant's latest stored answer to `id`, used to pre-fill.
    #[must_use]
    pub fn previous_answer(&self, id: &QuestionId) -> Option<&SurveyResponse> {
        self.previous.get(id)
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.set.total()
    }

    #[must_use]
    pub fn state(&self) -> ProgressState {
        self.state
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ProgressState::Complete
    }

    /// Whether a stale stored cursor was reset when the session started.
    #[must_use]
    pub fn was_repaired(&self) -> bool {
        self.repaired
    }

    fn apply(&mut self, step: ProgressStep, now: DateTime<Utc>) {
        self.index = step.index;
        self.state = step.state;
        self.presented_at = now;
    }
}

/// An opened session is under way even before its first answer is stored.
pub(crate) fn started(state: ProgressState) -> ProgressState {
    match state {
        ProgressState::NotStarted => ProgressState::InProgress,
        other => other,
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub response: SurveyResponse,
    pub step: ProgressStep,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Drives the image-evolution survey: start, submit, go back.
#[derive(Clone)]
pub struct SurveyService {
    clock: Clock,
    loader: QuestionLoader,
    tracker: ProgressTracker,
    profiles: ProfileService,
    responses: Arc<dyn ResponseRepository>,
}

impl SurveyService {
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

    /// Open a session where the participant left off.
    ///
    /// # Errors
    ///
    /// Returns `SurveyError::Load` when the model has no data or no questions
    /// for the country, and storage-backed errors from profile, progress or
    /// response lookups.
    pub async fn start(
        &self,
        identity: &Identity,
        model: &ModelId,
        country: &Country,
    ) -> Result<SurveySession, SurveyError> {
        self.profiles.ensure_profile(identity).await?;
        let set = self.loader.load(model, country).await?;
        let resume = self
            .tracker
            .resume(&identity.user_id, model, set.total())
            .await?;

        let previous = self
            .responses
            .responses_for_user(&identity.user_id, ResponseKind::Survey, Some(model))
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Response::Survey(s) => Some((s.question_id.clone(), s)),
                Response::Attribution(_) => None,
            })
            .collect();

        info!(
            user = %identity.user_id,
            %model,
            country = %country,
            index = resume.index,
            total = set.total(),
            "survey session started"
        );
        Ok(SurveySession {
            user_id: identity.user_id.clone(),
            set,
            index: resume.index,
            state: started(resume.state),
            repaired: resume.repaired,
            previous,
            presented_at: self.clock.now(),
        })
    }

    /// Validate and store an answer to the current question, then advance.
    ///
    /// A draft without a completion time gets the time elapsed since the
    /// question was presented.
    ///
    /// # Errors
    ///
    /// Returns `SurveyError::Completed` when no question is current,
    /// `SurveyError::QuestionMismatch` or `SurveyError::Validation` before
    /// anything is stored, and storage-backed errors afterwards.
    pub async fn submit(
        &self,
        session: &mut SurveySession,
        mut draft: SurveyResponseDraft,
    ) -> Result<SubmitOutcome, SurveyError> {
        let question = session.current_question().ok_or(SurveyError::Completed)?;
        if &draft.question_id != question.id() {
            return Err(SurveyError::QuestionMismatch {
                expected: question.id().clone(),
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
            .put_response(&Response::Survey(response.clone()))
            .await?;
        let step = self
            .tracker
            .record_submission(
                &session.user_id,
                session.model(),
                &response.question_id,
                session.total(),
            )
            .await?;

        session
            .previous
            .insert(response.question_id.clone(), response.clone());
        session.apply(step, now);
        Ok(SubmitOutcome { response, step })
    }

    /// Step back to the previous question.
    ///
    /// # Errors
    ///
    /// Returns `SurveyError::Progress` if the cursor cannot be stored.
    pub async fn go_back(&self, session: &mut SurveySession) -> Result<ProgressStep, SurveyError> {
        let step = self
            .tracker
            .navigate_back(&session.user_id, session.model(), session.total())
            .await?;
        session.apply(step, self.clock.now());
        Ok(step)
    }
}
