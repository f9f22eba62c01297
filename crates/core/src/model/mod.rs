mod attribution;
mod country;
mod ids;
mod image;
mod item;
mod profile;
mod progress;
mod question;
mod rating;
mod response;
mod step;

pub use ids::{IdError, ModelId, QuestionId, ResponseId, UserId};

pub use attribution::{
    ATTRIBUTION_MODELS, AttributionItem, AttributionQuestion, AttributionRating,
    AttributionResponse, AttributionResponseDraft, AttributionValidationError, LabelledOutput,
    OutputRating,
};
pub use country::Country;
pub use image::{ImageRef, ImageRefError};
pub use item::{FilenameMetadata, SurveyItem, VARIANTS};
pub use profile::{Identity, UserProfile};
pub use progress::{ProgressState, Reconciliation, UserProgress};
pub use question::{QuestionError, StepImage, SurveyQuestion};
pub use rating::{ImageRating, Rating, RatingError};
pub use response::{
    Response, ResponseKind, ResponseValidationError, StepRating, SurveyResponse,
    SurveyResponseDraft,
};
pub use step::{ImageStep, StepError};
