//! Shared error types for the services crate.

use thiserror::Error;

use survey_core::model::{
    AttributionValidationError, Country, IdError, ModelId, QuestionError, QuestionId,
    ResponseValidationError,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted while fetching or parsing dataset files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DatasetError {
    #[error("dataset source is not configured")]
    NotConfigured,
    #[error("dataset request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid dataset url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("missing column `{0}`")]
    MissingColumn(&'static str),
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

/// Errors emitted by `QuestionLoader`. Both variants are non-fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("No data available for {model}")]
    NoData {
        model: ModelId,
        #[source]
        source: Option<DatasetError>,
    },
    #[error("No survey items found for {model} in {}.", .country.display_name())]
    NoQuestions { model: ModelId, country: Country },
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Id(#[from] IdError),
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProfileService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SurveyService` and `AttributionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SurveyError {
    #[error("survey is already complete")]
    Completed,
    #[error("draft answers {got}, current question is {expected}")]
    QuestionMismatch {
        expected: QuestionId,
        got: QuestionId,
    },
    #[error(transparent)]
    Validation(#[from] ResponseValidationError),
    #[error(transparent)]
    AttributionValidation(#[from] AttributionValidationError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DashboardService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DashboardError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
