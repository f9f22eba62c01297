use std::path::Path;
use std::sync::Arc;

use storage::repository::Storage;

use crate::attribution::AttributionService;
use crate::dashboard::DashboardService;
use crate::dataset::{DatasetConfig, DatasetSource, HttpDatasetSource, StaticDatasetSource};
use crate::error::{AppServicesError, DatasetError};
use crate::loader::QuestionLoader;
use crate::profile::ProfileService;
use crate::progress::ProgressTracker;
use crate::survey::SurveyService;
use crate::Clock;

/// Assembles app-facing services over one storage backend and dataset source.
#[derive(Clone)]
pub struct AppServices {
    loader: QuestionLoader,
    tracker: Arc<ProgressTracker>,
    profiles: Arc<ProfileService>,
    survey: Arc<SurveyService>,
    attribution: Arc<AttributionService>,
    dashboard: Arc<DashboardService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        source: Arc<dyn DatasetSource>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, source))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, source: Arc<dyn DatasetSource>) -> Self {
        let loader = QuestionLoader::new(source);
        let tracker = ProgressTracker::new(clock, Arc::clone(&storage.progress));
        let profiles = ProfileService::new(clock, Arc::clone(&storage.profiles));
        let survey = SurveyService::new(
            clock,
            loader.clone(),
            tracker.clone(),
            profiles.clone(),
            Arc::clone(&storage.responses),
        );
        let attribution = AttributionService::new(
            clock,
            loader.clone(),
            tracker.clone(),
            profiles.clone(),
            Arc::clone(&storage.responses),
        );
        let dashboard = DashboardService::new(
            Arc::clone(&storage.responses),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.profiles),
        );

        Self {
            loader,
            tracker: Arc::new(tracker),
            profiles: Arc::new(profiles),
            survey: Arc::new(survey),
            attribution: Arc::new(attribution),
            dashboard: Arc::new(dashboard),
        }
    }

    /// Pick a dataset source: a local directory wins over a base URL, which
    /// wins over `SURVEY_DATASET_URL`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Dataset` if the directory cannot be read or
    /// no source is configured.
    pub fn dataset_source(
        base_url: Option<&str>,
        dir: Option<&Path>,
    ) -> Result<Arc<dyn DatasetSource>, AppServicesError> {
        if let Some(dir) = dir {
            return Ok(Arc::new(StaticDatasetSource::from_dir(dir)?));
        }
        let config = match (base_url, DatasetConfig::from_env()) {
            (Some(url), Some(env)) => DatasetConfig {
                base_url: url.to_owned(),
                ..env
            },
            (Some(url), None) => DatasetConfig::new(url),
            (None, Some(env)) => env,
            (None, None) => return Err(DatasetError::NotConfigured.into()),
        };
        Ok(Arc::new(HttpDatasetSource::new(config)))
    }

    /// Shares its dataset cache with the survey and attribution services.
    #[must_use]
    pub fn loader(&self) -> &QuestionLoader {
        &self.loader
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.tracker)
    }

    #[must_use]
    pub fn profiles(&self) -> Arc<ProfileService> {
        Arc::clone(&self.profiles)
    }

    #[must_use]
    pub fn survey(&self) -> Arc<SurveyService> {
        Arc::clone(&self.survey)
    }

    #[must_use]
    pub fn attribution(&self) -> Arc<AttributionService> {
        Arc::clone(&self.attribution)
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::model::{Country, Identity, ModelId, UserId};
    use survey_core::time::fixed_clock;

    #[test]
    fn directory_source_wins() {
        let dir = std::env::temp_dir().join(format!("survey-ds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("flux.csv"), "model,country\n").unwrap();
        let source = AppServices::dataset_source(Some("https://example.org"), Some(&dir));
        assert!(source.unwrap().content_base().is_some());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn in_memory_services_share_the_loader_cache() {
        let csv = "model,country,category,sub_category,variant,T2I prompt,I2I prompt,base,edit_1,edit_2,edit_3,edit_4,edit_5\n\
            flux,Kenya,food,a,general,t,i,a_0.png,a_1.png,a_2.png,a_3.png,a_4.png,a_5.png\n";
        let source = StaticDatasetSource::new().with_survey(ModelId::new("flux").unwrap(), csv);
        let services =
            AppServices::from_storage(&Storage::in_memory(), fixed_clock(), Arc::new(source));
        let identity = Identity::new(UserId::new("u").unwrap(), "U");
        services
            .survey()
            .start(&identity, &ModelId::new("flux").unwrap(), &Country::new("Kenya"))
            .await
            .unwrap();
        assert_eq!(services.loader().cache().len(), 1);
    }
}
