use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::country::Country;
use crate::model::ids::{IdError, ModelId, QuestionId};
use crate::model::image::ImageRef;
use crate::model::item::SurveyItem;
use crate::model::step::ImageStep;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuestionError {
    #[error("row {row} has no image for {step}")]
    MissingImage { row: usize, step: ImageStep },

    #[error("presentation order must be a permutation of the survey steps")]
    InvalidOrder,

    #[error(transparent)]
    Id(#[from] IdError),
}

/// An image shown for one step of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepImage {
    pub step: ImageStep,
    pub image: ImageRef,
}

/// A survey question derived from one dataset row.
///
/// `images` always holds the four survey steps exactly once, in the order
/// they are presented to the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    id: QuestionId,
    model: ModelId,
    country: Country,
    category: String,
    sub_category: String,
    variant: String,
    t2i_prompt: String,
    i2i_prompt: String,
    images: Vec<StepImage>,
    index: usize,
    total: usize,
}

impl SurveyQuestion {
    /// Build a question from a dataset row.
    ///
    /// `order` is the presentation order of the survey steps and must be a
    /// permutation of [`ImageStep::SURVEY_STEPS`].
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidOrder` for a bad permutation and
    /// `QuestionError::MissingImage` if the row lacks a survey step image.
    pub fn from_item(
        item: &SurveyItem,
        index: usize,
        total: usize,
        order: [ImageStep; 4],
    ) -> Result<Self, QuestionError> {
        let mut sorted = order;
        sorted.sort();
        if sorted != ImageStep::SURVEY_STEPS {
            return Err(QuestionError::InvalidOrder);
        }

        let images = order
            .iter()
            .map(|&step| {
                item.image_for(step)
                    .cloned()
                    .map(|image| StepImage { step, image })
                    .ok_or(QuestionError::MissingImage {
                        row: item.row,
                        step,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: item.question_id()?,
            model: item.model.clone(),
            country: item.country.clone(),
            category: item.category.clone(),
            sub_category: item.sub_category.clone(),
            variant: item.variant.clone(),
            t2i_prompt: item.t2i_prompt.clone(),
            i2i_prompt: item.i2i_prompt.clone(),
            images,
            index,
            total,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    #[must_use]
    pub fn country(&self) -> &Country {
        &self.country
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn sub_category(&self) -> &str {
        &self.sub_category
    }

    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    #[must_use]
    pub fn t2i_prompt(&self) -> &str {
        &self.t2i_prompt
    }

    #[must_use]
    pub fn i2i_prompt(&self) -> &str {
        &self.i2i_prompt
    }

    /// Images in presentation order.
    #[must_use]
    pub fn images(&self) -> &[StepImage] {
        &self.images
    }

    /// Steps in presentation order.
    #[must_use]
    pub fn steps(&self) -> Vec<ImageStep> {
        self.images.iter().map(|i| i.step).collect()
    }

    #[must_use]
    pub fn has_step(&self, step: ImageStep) -> bool {
        self.images.iter().any(|i| i.step == step)
    }

    /// Zero-based position in the loaded question set.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> SurveyItem {
        let img = |n: &str| Some(ImageRef::parse(format!("qwen/qwen_china_food_{n}.png")).unwrap());
        SurveyItem {
            row: 0,
            model: ModelId::new("qwen").unwrap(),
            country: Country::new("china"),
            category: "food".into(),
            sub_category: "dumplings".into(),
            variant: "traditional".into(),
            t2i_prompt: "Dumplings in China".into(),
            i2i_prompt: "Make it more Chinese".into(),
            base: img("base"),
            edits: [img("1"), None, img("3"), None, img("5")],
        }
    }

    #[test]
    fn keeps_presentation_order() {
        let order = [
            ImageStep::Edit5,
            ImageStep::Base,
            ImageStep::Edit3,
            ImageStep::Edit1,
        ];
        let q = SurveyQuestion::from_item(&item(), 2, 7, order).unwrap();
        assert_eq!(q.steps(), order.to_vec());
        assert_eq!(q.index(), 2);
        assert_eq!(q.total(), 7);
        assert!(q.has_step(ImageStep::Edit3));
        assert!(!q.has_step(ImageStep::Edit2));
        assert_eq!(q.id().as_str(), "qwen_china_food_base");
    }

    #[test]
    fn rejects_non_survey_order() {
        let order = [
            ImageStep::Base,
            ImageStep::Edit1,
            ImageStep::Edit2,
            ImageStep::Edit5,
        ];
        let err = SurveyQuestion::from_item(&item(), 0, 1, order).unwrap_err();
        assert_eq!(err, QuestionError::InvalidOrder);
    }

    #[test]
    fn missing_image_is_reported() {
        let mut it = item();
        it.edits[2] = None;
        let err = SurveyQuestion::from_item(&it, 0, 1, ImageStep::SURVEY_STEPS).unwrap_err();
        assert!(matches!(
            err,
            QuestionError::MissingImage {
                step: ImageStep::Edit3,
                ..
            }
        ));
    }
}
