use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::attribution::AttributionResponse;
use crate::model::country::Country;
use crate::model::ids::{ModelId, QuestionId, ResponseId, UserId};
use crate::model::question::SurveyQuestion;
use crate::model::rating::ImageRating;
use crate::model::step::ImageStep;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons a survey submission is rejected before it reaches storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseValidationError {
    #[error("response targets question {got}, expected {expected}")]
    WrongQuestion {
        expected: QuestionId,
        got: QuestionId,
    },

    #[error("a best step must be selected")]
    MissingBest,

    #[error("a worst step must be selected")]
    MissingWorst,

    #[error("best and worst step must differ (both {0})")]
    BestEqualsWorst(ImageStep),

    #[error("{0} is not part of this question")]
    StepNotInQuestion(ImageStep),

    #[error("missing rating for {0}")]
    MissingRating(ImageStep),
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Participant input for one survey question, prior to validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyResponseDraft {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub image_ratings: BTreeMap<ImageStep, ImageRating>,
    pub best_step: Option<ImageStep>,
    pub worst_step: Option<ImageStep>,
    pub comment: Option<String>,
    pub completion_time_ms: u64,
}

impl SurveyResponseDraft {
    #[must_use]
    pub fn new(user_id: UserId, question_id: QuestionId) -> Self {
        Self {
            user_id,
            question_id,
            image_ratings: BTreeMap::new(),
            best_step: None,
            worst_step: None,
            comment: None,
            completion_time_ms: 0,
        }
    }

    #[must_use]
    pub fn rate(mut self, step: ImageStep, rating: ImageRating) -> Self {
        self.image_ratings.insert(step, rating);
        self
    }

    #[must_use]
    pub fn best_worst(mut self, best: ImageStep, worst: ImageStep) -> Self {
        self.best_step = Some(best);
        self.worst_step = Some(worst);
        self
    }

    /// Check the draft against the question it answers.
    ///
    /// # Errors
    ///
    /// Returns `ResponseValidationError` when best/worst are missing, equal or
    /// outside the question, or when a presented step is left unrated.
    pub fn validate(
        self,
        question: &SurveyQuestion,
        submitted_at: DateTime<Utc>,
    ) -> Result<SurveyResponse, ResponseValidationError> {
        if &self.question_id != question.id() {
            return Err(ResponseValidationError::WrongQuestion {
                expected: question.id().clone(),
                got: self.question_id,
            });
        }

        let best = self.best_step.ok_or(ResponseValidationError::MissingBest)?;
        let worst = self.worst_step.ok_or(ResponseValidationError::MissingWorst)?;
        if best == worst {
            return Err(ResponseValidationError::BestEqualsWorst(best));
        }
        for step in [best, worst] {
            if !question.has_step(step) {
                return Err(ResponseValidationError::StepNotInQuestion(step));
            }
        }

        if let Some(extra) = self
            .image_ratings
            .keys()
            .find(|step| !question.has_step(**step))
        {
            return Err(ResponseValidationError::StepNotInQuestion(*extra));
        }

        let mut image_ratings = Vec::with_capacity(question.images().len());
        for step in ImageStep::SURVEY_STEPS {
            let rating = self
                .image_ratings
                .get(&step)
                .ok_or(ResponseValidationError::MissingRating(step))?;
            image_ratings.push(StepRating {
                step,
                rating: *rating,
            });
        }

        Ok(SurveyResponse {
            id: ResponseId::generate(),
            user_id: self.user_id,
            question_id: self.question_id,
            model: question.model().clone(),
            country: question.country().clone(),
            category: question.category().to_owned(),
            sub_category: question.sub_category().to_owned(),
            variant: question.variant().to_owned(),
            image_ratings,
            best_step: best,
            worst_step: worst,
            comment: normalize_comment(self.comment),
            completion_time_ms: self.completion_time_ms,
            submitted_at,
        })
    }
}

pub(crate) fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
}

//
// ─── RESPONSE ──────────────────────────────────────────────────────────────────
//

/// Rating given to the image of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRating {
    pub step: ImageStep,
    pub rating: ImageRating,
}

/// A validated survey judgement. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: ResponseId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub model: ModelId,
    pub country: Country,
    pub category: String,
    pub sub_category: String,
    pub variant: String,
    pub image_ratings: Vec<StepRating>,
    pub best_step: ImageStep,
    pub worst_step: ImageStep,
    pub comment: Option<String>,
    pub completion_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

impl SurveyResponse {
    #[must_use]
    pub fn rating_for(&self, step: ImageStep) -> Option<ImageRating> {
        self.image_ratings
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.rating)
    }
}

/// Which evaluation task a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Survey,
    Attribution,
}

impl ResponseKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Survey => "survey",
            ResponseKind::Attribution => "attribution",
        }
    }
}

/// Any stored response, tagged by task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Survey(SurveyResponse),
    Attribution(AttributionResponse),
}

impl Response {
    #[must_use]
    pub fn id(&self) -> ResponseId {
        match self {
            Response::Survey(r) => r.id,
            Response::Attribution(r) => r.id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Survey(_) => ResponseKind::Survey,
            Response::Attribution(_) => ResponseKind::Attribution,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            Response::Survey(r) => &r.user_id,
            Response::Attribution(r) => &r.user_id,
        }
    }

    #[must_use]
    pub fn question_id(&self) -> &QuestionId {
        match self {
            Response::Survey(r) => &r.question_id,
            Response::Attribution(r) => &r.question_id,
        }
    }

    /// Progress key the response counts towards.
    #[must_use]
    pub fn model(&self) -> ModelId {
        match self {
            Response::Survey(r) => r.model.clone(),
            Response::Attribution(_) => ModelId::attribution(),
        }
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        match self {
            Response::Survey(r) => r.submitted_at,
            Response::Attribution(r) => r.submitted_at,
        }
    }

    #[must_use]
    pub fn as_survey(&self) -> Option<&SurveyResponse> {
        match self {
            Response::Survey(r) => Some(r),
            Response::Attribution(_) => None,
        }
    }

    #[must_use]
    pub fn as_attribution(&self) -> Option<&AttributionResponse> {
        match self {
            Response::Attribution(r) => Some(r),
            Response::Survey(_) => None,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::image::ImageRef;
    use crate::model::item::SurveyItem;
    use crate::model::rating::Rating;
    use crate::time::fixed_now;

    fn question() -> SurveyQuestion {
        let img = |n: u8| Some(ImageRef::parse(format!("flux_kenya_food_{n}.png")).unwrap());
        let item = SurveyItem {
            row: 0,
            model: ModelId::new("flux").unwrap(),
            country: Country::new("Kenya"),
            category: "food".into(),
            sub_category: "ugali".into(),
            variant: "traditional".into(),
            t2i_prompt: "p1".into(),
            i2i_prompt: "p2".into(),
            base: Some(ImageRef::parse("flux_kenya_food_ugali_traditional.png").unwrap()),
            edits: [img(1), img(2), img(3), img(4), img(5)],
        };
        SurveyQuestion::from_item(&item, 0, 1, ImageStep::SURVEY_STEPS).unwrap()
    }

    fn full_draft(q: &SurveyQuestion) -> SurveyResponseDraft {
        let r = ImageRating::new(Rating::new(4).unwrap(), Rating::new(3).unwrap());
        let mut draft = SurveyResponseDraft::new(UserId::new("u1").unwrap(), q.id().clone());
        for step in ImageStep::SURVEY_STEPS {
            draft = draft.rate(step, r);
        }
        draft.best_worst(ImageStep::Edit5, ImageStep::Base)
    }

    #[test]
    fn valid_draft_copies_question_fields() {
        let q = question();
        let mut draft = full_draft(&q);
        draft.comment = Some("  looks staged  ".into());
        draft.completion_time_ms = 4200;

        let resp = draft.validate(&q, fixed_now()).unwrap();
        assert_eq!(resp.model.as_str(), "flux");
        assert_eq!(resp.category, "food");
        assert_eq!(resp.image_ratings.len(), 4);
        assert_eq!(resp.comment.as_deref(), Some("looks staged"));
        assert_eq!(resp.completion_time_ms, 4200);
        assert_eq!(
            resp.rating_for(ImageStep::Edit3).unwrap().image_quality.value(),
            4
        );
    }

    #[test]
    fn best_equal_worst_is_rejected() {
        let q = question();
        let draft = full_draft(&q).best_worst(ImageStep::Edit1, ImageStep::Edit1);
        assert_eq!(
            draft.validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::BestEqualsWorst(ImageStep::Edit1)
        );
    }

    #[test]
    fn missing_selection_is_rejected() {
        let q = question();
        let mut draft = full_draft(&q);
        draft.best_step = None;
        assert_eq!(
            draft.clone().validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::MissingBest
        );
        draft.best_step = Some(ImageStep::Base);
        draft.worst_step = None;
        assert_eq!(
            draft.validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::MissingWorst
        );
    }

    #[test]
    fn steps_outside_question_are_rejected() {
        let q = question();
        let draft = full_draft(&q).best_worst(ImageStep::Edit2, ImageStep::Base);
        assert_eq!(
            draft.validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::StepNotInQuestion(ImageStep::Edit2)
        );
    }

    #[test]
    fn unrated_step_is_rejected() {
        let q = question();
        let mut draft = full_draft(&q);
        draft.image_ratings.remove(&ImageStep::Edit3);
        assert_eq!(
            draft.validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::MissingRating(ImageStep::Edit3)
        );
    }

    #[test]
    fn wrong_question_is_rejected() {
        let q = question();
        let mut draft = full_draft(&q);
        draft.question_id = QuestionId::new("other").unwrap();
        assert!(matches!(
            draft.validate(&q, fixed_now()).unwrap_err(),
            ResponseValidationError::WrongQuestion { .. }
        ));
    }

    #[test]
    fn tagged_response_round_trips_through_json() {
        let q = question();
        let resp = Response::Survey(full_draft(&q).validate(&q, fixed_now()).unwrap());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"kind\":\"survey\""));
        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
        assert_eq!(back.kind(), ResponseKind::Survey);
    }
}
