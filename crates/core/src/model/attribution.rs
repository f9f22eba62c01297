use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::country::Country;
use crate::model::ids::{IdError, ModelId, QuestionId, ResponseId, UserId};
use crate::model::image::ImageRef;
use crate::model::rating::Rating;
use crate::model::response::normalize_comment;

/// Output columns of the attribution dataset, in presentation order.
pub const ATTRIBUTION_MODELS: [&str; 2] = ["flux", "qwen"];

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttributionValidationError {
    #[error("response targets question {got}, expected {expected}")]
    WrongQuestion {
        expected: QuestionId,
        got: QuestionId,
    },

    #[error("missing rating for {0}")]
    MissingRating(ModelId),

    #[error("{0} is not an output of this question")]
    UnknownOutput(ModelId),
}

//
// ─── ITEMS ─────────────────────────────────────────────────────────────────────
//

/// One row of the attribution dataset
/// (`country, step, prompt, flux_output_file, qwen_output_file`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionItem {
    pub row: usize,
    pub country: Country,
    pub step: u32,
    pub prompt: String,
    pub flux_output: Option<ImageRef>,
    pub qwen_output: Option<ImageRef>,
}

impl AttributionItem {
    fn outputs(&self) -> Result<Option<Vec<LabelledOutput>>, IdError> {
        let (Some(flux), Some(qwen)) = (&self.flux_output, &self.qwen_output) else {
            return Ok(None);
        };
        Ok(Some(vec![
            LabelledOutput {
                model: ModelId::new(ATTRIBUTION_MODELS[0])?,
                image: flux.clone(),
            },
            LabelledOutput {
                model: ModelId::new(ATTRIBUTION_MODELS[1])?,
                image: qwen.clone(),
            },
        ]))
    }

    /// Image both models started from: the step-0 output.
    fn base_image(&self) -> Option<ImageRef> {
        self.flux_output.clone().or_else(|| self.qwen_output.clone())
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// One model's output for an attribution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledOutput {
    pub model: ModelId,
    pub image: ImageRef,
}

/// Compares both models' outputs for one prompt-driven edit step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionQuestion {
    pub id: QuestionId,
    pub country: Country,
    pub step: u32,
    pub prompt: String,
    pub base_image: Option<ImageRef>,
    pub outputs: Vec<LabelledOutput>,
    pub index: usize,
    pub total: usize,
}

impl AttributionQuestion {
    /// Build the ordered question set from dataset rows.
    ///
    /// Rows are grouped by country and ordered by step. The step-0 row of a
    /// country supplies the shared base image; every later step becomes a
    /// question. Rows missing either output are skipped.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if a question id cannot be formed.
    pub fn build_set(items: &[AttributionItem]) -> Result<Vec<Self>, IdError> {
        let mut by_country: BTreeMap<String, Vec<&AttributionItem>> = BTreeMap::new();
        for item in items {
            if item.country.is_empty() {
                continue;
            }
            by_country.entry(item.country.key()).or_default().push(item);
        }

        let mut questions = Vec::new();
        for (key, mut rows) in by_country {
            rows.sort_by_key(|r| (r.step, r.row));
            let base_image = rows
                .iter()
                .find(|r| r.step == 0)
                .and_then(|r| r.base_image());

            for row in rows.into_iter().filter(|r| r.step > 0) {
                let Some(outputs) = row.outputs()? else {
                    continue;
                };
                questions.push(Self {
                    id: QuestionId::new(format!("attr_{}_step{}", key.replace(' ', "_"), row.step))?,
                    country: row.country.clone(),
                    step: row.step,
                    prompt: row.prompt.clone(),
                    base_image: base_image.clone(),
                    outputs,
                    index: 0,
                    total: 0,
                });
            }
        }

        let total = questions.len();
        for (index, q) in questions.iter_mut().enumerate() {
            q.index = index;
            q.total = total;
        }
        Ok(questions)
    }

    #[must_use]
    pub fn has_output(&self, model: &ModelId) -> bool {
        self.outputs.iter().any(|o| &o.model == model)
    }
}

//
// ─── RESPONSES ─────────────────────────────────────────────────────────────────
//

/// Multi-field judgement of one model's output at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRating {
    pub prompt_adherence: Rating,
    pub cultural_representativeness: Rating,
    pub image_quality: Rating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRating {
    pub model: ModelId,
    pub rating: AttributionRating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionResponseDraft {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub ratings: BTreeMap<ModelId, AttributionRating>,
    pub preferred: Option<ModelId>,
    pub comment: Option<String>,
    pub completion_time_ms: u64,
}

impl AttributionResponseDraft {
    #[must_use]
    pub fn new(user_id: UserId, question_id: QuestionId) -> Self {
        Self {
            user_id,
            question_id,
            ratings: BTreeMap::new(),
            preferred: None,
            comment: None,
            completion_time_ms: 0,
        }
    }

    #[must_use]
    pub fn rate(mut self, model: ModelId, rating: AttributionRating) -> Self {
        self.ratings.insert(model, rating);
        self
    }

    /// # Errors
    ///
    /// Returns `AttributionValidationError` if an output is unrated, a rating
    /// or preference names a model the question does not show, or the draft
    /// targets another question.
    pub fn validate(
        self,
        question: &AttributionQuestion,
        submitted_at: DateTime<Utc>,
    ) -> Result<AttributionResponse, AttributionValidationError> {
        if self.question_id != question.id {
            return Err(AttributionValidationError::WrongQuestion {
                expected: question.id.clone(),
                got: self.question_id,
            });
        }

        if let Some(unknown) = self
            .ratings
            .keys()
            .chain(self.preferred.iter())
            .find(|m| !question.has_output(m))
        {
            return Err(AttributionValidationError::UnknownOutput(unknown.clone()));
        }

        let mut ratings = Vec::with_capacity(question.outputs.len());
        for output in &question.outputs {
            let rating = self
                .ratings
                .get(&output.model)
                .ok_or_else(|| AttributionValidationError::MissingRating(output.model.clone()))?;
            ratings.push(OutputRating {
                model: output.model.clone(),
                rating: *rating,
            });
        }

        Ok(AttributionResponse {
            id: ResponseId::generate(),
            user_id: self.user_id,
            question_id: self.question_id,
            country: question.country.clone(),
            step: question.step,
            ratings,
            preferred: self.preferred,
            comment: normalize_comment(self.comment),
            completion_time_ms: self.completion_time_ms,
            submitted_at,
        })
    }
}

/// A validated attribution judgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionResponse {
    pub id: ResponseId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub country: Country,
    pub step: u32,
    pub ratings: Vec<OutputRating>,
    pub preferred: Option<ModelId>,
    pub comment: Option<String>,
    pub completion_time_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
