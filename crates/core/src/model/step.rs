use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("invalid image step: {0}")]
    Invalid(u8),
}

/// Image-generation checkpoint of a dataset row.
///
/// `Base` is the text-to-image output; `Edit1`..`Edit5` are the successive
/// image-to-image edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ImageStep {
    Base,
    Edit1,
    Edit2,
    Edit3,
    Edit4,
    Edit5,
}

impl ImageStep {
    /// Steps shown to participants for every survey question.
    pub const SURVEY_STEPS: [ImageStep; 4] = [
        ImageStep::Base,
        ImageStep::Edit1,
        ImageStep::Edit3,
        ImageStep::Edit5,
    ];

    /// Converts a step number (0-5) to an `ImageStep`.
    ///
    /// # Errors
    ///
    /// Returns `StepError::Invalid` for numbers above 5.
    pub fn from_number(value: u8) -> Result<Self, StepError> {
        match value {
            0 => Ok(Self::Base),
            1 => Ok(Self::Edit1),
            2 => Ok(Self::Edit2),
            3 => Ok(Self::Edit3),
            4 => Ok(Self::Edit4),
            5 => Ok(Self::Edit5),
            _ => Err(StepError::Invalid(value)),
        }
    }

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            ImageStep::Base => 0,
            ImageStep::Edit1 => 1,
            ImageStep::Edit2 => 2,
            ImageStep::Edit3 => 3,
            ImageStep::Edit4 => 4,
            ImageStep::Edit5 => 5,
        }
    }

    /// Label used by the analysis scripts (`step0` .. `step5`).
    #[must_use]
    pub fn label(self) -> String {
        format!("step{}", self.number())
    }
}

impl TryFrom<u8> for ImageStep {
    type Error = StepError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_number(value)
    }
}

impl From<ImageStep> for u8 {
    fn from(value: ImageStep) -> Self {
        value.number()
    }
}

impl fmt::Display for ImageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step{}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survey_steps_are_zero_one_three_five() {
        let numbers: Vec<u8> = ImageStep::SURVEY_STEPS.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![0, 1, 3, 5]);
    }

    #[test]
    fn numeric_conversion_rejects_out_of_range() {
        assert_eq!(ImageStep::from_number(3).unwrap(), ImageStep::Edit3);
        assert!(matches!(
            ImageStep::from_number(6),
            Err(StepError::Invalid(6))
        ));
    }

    #[test]
    fn label_matches_display() {
        assert_eq!(ImageStep::Edit5.label(), "step5");
        assert_eq!(ImageStep::Base.to_string(), "step0");
    }
}
