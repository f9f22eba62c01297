#![forbid(unsafe_code)]

pub mod app_services;
pub mod attribution;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod profile;
pub mod progress;
pub mod survey;

pub use survey_core::Clock;

pub use app_services::AppServices;
pub use attribution::{AttributionService, AttributionSession};
pub use dashboard::{DashboardService, ResponseStats, UserProgressRow};
pub use dataset::{
    CsvCache, DatasetConfig, DatasetSource, HttpDatasetSource, StaticDatasetSource,
};
pub use error::{
    AppServicesError, DashboardError, DatasetError, LoadError, ProfileError, ProgressError,
    SurveyError,
};
pub use loader::{QuestionLoader, QuestionSet};
pub use profile::ProfileService;
pub use progress::{ProgressStep, ProgressTracker, ResumePoint};
pub use survey::{SubmitOutcome, SurveyService, SurveySession};
