use serde::{Deserialize, Serialize};

use crate::model::country::Country;
use crate::model::ids::{IdError, ModelId, QuestionId};
use crate::model::image::ImageRef;
use crate::model::step::ImageStep;

//
// ─── SURVEY ITEM ───────────────────────────────────────────────────────────────
//

/// One row of a model's evaluation dataset.
///
/// `row` is the zero-based position of the row among the data rows of the
/// source file; it only serves as a fallback identity when the row has no
/// usable base image name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyItem {
    pub row: usize,
    pub model: ModelId,
    pub country: Country,
    pub category: String,
    pub sub_category: String,
    pub variant: String,
    pub t2i_prompt: String,
    pub i2i_prompt: String,
    pub base: Option<ImageRef>,
    pub edits: [Option<ImageRef>; 5],
}

impl SurveyItem {
    /// Image reference for the given step, if the row has one.
    #[must_use]
    pub fn image_for(&self, step: ImageStep) -> Option<&ImageRef> {
        match step {
            ImageStep::Base => self.base.as_ref(),
            other => self.edits[usize::from(other.number()) - 1].as_ref(),
        }
    }

    /// Stable question identity.
    ///
    /// The base image's file stem already encodes model, country, category,
    /// sub-category and variant, so it survives row reordering in the
    /// dataset. Rows without a base image fall back to model, country and row.
    ///
    /// # Errors
    ///
    /// Returns `IdError` only if every component is empty, which cannot
    /// happen for a valid `ModelId`.
    pub fn question_id(&self) -> Result<QuestionId, IdError> {
        if let Some(stem) = self.base.as_ref().and_then(ImageRef::file_stem) {
            return QuestionId::new(stem);
        }
        QuestionId::new(format!(
            "{}_{}_row{}",
            self.model,
            self.country.key().replace(' ', "_"),
            self.row
        ))
    }

    /// Fill blank metadata cells from the base image's file name.
    pub fn fill_missing_metadata(&mut self) {
        let Some(meta) = self
            .base
            .as_ref()
            .and_then(ImageRef::file_name)
            .map(FilenameMetadata::parse)
        else {
            return;
        };

        if self.country.is_empty() && !meta.country.is_empty() {
            self.country = Country::new(&meta.country);
        }
        if self.category.is_empty() {
            self.category = meta.category;
        }
        if self.sub_category.is_empty() {
            self.sub_category = meta.sub_category;
        }
        if self.variant.is_empty() {
            self.variant = meta.variant;
        }
    }
}

//
// ─── FILENAME METADATA ─────────────────────────────────────────────────────────
//

/// Variant suffixes recognised at the end of an image file name.
pub const VARIANTS: [&str; 5] = ["general", "modern", "traditional", "common", "national"];

/// Metadata encoded in generated image file names:
/// `<model>_<country>_<category>_<sub..>_<variant>[_<step>].<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilenameMetadata {
    pub model: String,
    pub country: String,
    pub category: String,
    pub sub_category: String,
    pub variant: String,
}

impl FilenameMetadata {
    #[must_use]
    pub fn parse(file_name: &str) -> Self {
        let stem = match file_name.rfind('.') {
            Some(idx) if idx > 0 => &file_name[..idx],
            _ => file_name,
        };
        let stem = strip_step_suffix(stem);

        let mut parts: Vec<&str> = stem.split('_').collect();
        let mut meta = FilenameMetadata::default();
        meta.model = take_front(&mut parts);
        if parts.len() > 1 && parts[0] == "united" && parts[1] == "states" {
            meta.country = "united_states".to_owned();
            parts.drain(..2);
        } else {
            meta.country = take_front(&mut parts);
        }
        meta.category = take_front(&mut parts);

        if let Some(last) = parts.last() {
            if VARIANTS.contains(last) {
                meta.variant = (*last).to_owned();
                parts.pop();
            }
        }
        meta.sub_category = parts.join("_");
        meta
    }
}

fn take_front(parts: &mut Vec<&str>) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        parts.remove(0).to_owned()
    }
}

/// Drops a trailing `_<digits>` step marker.
fn strip_step_suffix(stem: &str) -> &str {
    match stem.rfind('_') {
        Some(idx)
            if idx + 1 < stem.len() && stem[idx + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &stem[..idx]
        }
        _ => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> SurveyItem {
        SurveyItem {
            row: 4,
            model: ModelId::new("flux").unwrap(),
            country: Country::new(""),
            category: String::new(),
            sub_category: String::new(),
            variant: String::new(),
            t2i_prompt: "A meal in Kenya".into(),
            i2i_prompt: "Make it more Kenyan".into(),
            base: Some(ImageRef::parse("flux/flux_kenya_food_street_food_traditional_0.png").unwrap()),
            edits: [
                Some(ImageRef::parse("e1.png").unwrap()),
                None,
                Some(ImageRef::parse("e3.png").unwrap()),
                None,
                Some(ImageRef::parse("e5.png").unwrap()),
            ],
        }
    }

    #[test]
    fn parses_standard_file_name() {
        let meta = FilenameMetadata::parse("flux_kenya_food_street_food_traditional_3.png");
        assert_eq!(meta.model, "flux");
        assert_eq!(meta.country, "kenya");
        assert_eq!(meta.category, "food");
        assert_eq!(meta.sub_category, "street_food");
        assert_eq!(meta.variant, "traditional");
    }

    #[test]
    fn parses_two_token_country_without_variant() {
        let meta = FilenameMetadata::parse("qwen_united_states_architecture_house.jpg");
        assert_eq!(meta.country, "united_states");
        assert_eq!(meta.category, "architecture");
        assert_eq!(meta.sub_category, "house");
        assert_eq!(meta.variant, "");
    }

    #[test]
    fn short_names_leave_fields_blank() {
        let meta = FilenameMetadata::parse("flux.png");
        assert_eq!(meta.model, "flux");
        assert!(meta.country.is_empty());
        assert!(meta.category.is_empty());
    }

    #[test]
    fn metadata_fills_blank_cells_only() {
        let mut it = item();
        it.category = "cuisine".into();
        it.fill_missing_metadata();
        assert_eq!(it.country.as_str(), "kenya");
        assert_eq!(it.category, "cuisine");
        assert_eq!(it.sub_category, "street_food");
        assert_eq!(it.variant, "traditional");
    }

    #[test]
    fn question_id_uses_base_stem_then_row() {
        let it = item();
        assert_eq!(
            it.question_id().unwrap().as_str(),
            "flux_kenya_food_street_food_traditional_0"
        );

        let mut no_base = item();
        no_base.base = None;
        no_base.country = Country::new("United States");
        assert_eq!(
            no_base.question_id().unwrap().as_str(),
            "flux_united_states_row4"
        );
    }

    #[test]
    fn image_for_maps_edit_numbers() {
        let it = item();
        assert!(it.image_for(ImageStep::Edit1).is_some());
        assert!(it.image_for(ImageStep::Edit2).is_none());
        assert_eq!(it.image_for(ImageStep::Edit5).unwrap().to_string(), "e5.png");
    }
}
