use std::collections::BTreeMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use survey_core::model::{
    AttributionQuestion, Country, ImageStep, ModelId, SurveyItem, SurveyQuestion,
};

use crate::dataset::{self, CsvCache, DatasetSource};
use crate::error::{DatasetError, LoadError};

/// Ordered questions for one model and country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    pub model: ModelId,
    pub country: Country,
    pub questions: Vec<SurveyQuestion>,
}

impl QuestionSet {
    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SurveyQuestion> {
        self.questions.get(index)
    }
}

/// Builds question sets from dataset files, caching the raw text per model.
#[derive(Clone)]
pub struct QuestionLoader {
    source: Arc<dyn DatasetSource>,
    cache: CsvCache,
    shuffle: bool,
}

impl QuestionLoader {
    #[must_use]
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self {
            source,
            cache: CsvCache::new(),
            shuffle: true,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CsvCache) -> Self {
        self.cache = cache;
        self
    }

    /// Toggle per-question shuffling of the image steps.
    ///
    /// When off, images keep ascending step order.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &CsvCache {
        &self.cache
    }

    #[must_use]
    pub fn content_base(&self) -> Option<Url> {
        self.source.content_base()
    }

    async fn survey_text(&self, model: &ModelId) -> Result<Option<Arc<str>>, DatasetError> {
        if let Some(text) = self.cache.get(model) {
            debug!(%model, "dataset cache hit");
            return Ok(Some(text));
        }
        let fetched = self.source.fetch_survey_csv(model).await?;
        Ok(fetched.map(|text| self.cache.insert(model.clone(), text)))
    }

    /// Rows of `model`'s dataset that belong to `country` and carry every
    /// survey step image.
    async fn usable_items(
        &self,
        model: &ModelId,
        country: &Country,
    ) -> Result<Vec<SurveyItem>, LoadError> {
        let no_data = |source: Option<DatasetError>| LoadError::NoData {
            model: model.clone(),
            source,
        };

        let text = match self.survey_text(model).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!(%model, "no dataset file for model");
                return Err(no_data(None));
            }
            Err(err) => {
                warn!(%model, error = %err, "dataset fetch failed");
                return Err(no_data(Some(err)));
            }
        };

        let items = match dataset::parse_survey_items(model, &text) {
            Ok(items) => items,
            Err(err) => {
                warn!(%model, error = %err, "dataset file is malformed");
                self.cache.invalidate(model);
                return Err(no_data(Some(err)));
            }
        };

        Ok(items
            .into_iter()
            .filter(|item| item.country.matches(country))
            .filter(|item| {
                let complete = ImageStep::SURVEY_STEPS
                    .iter()
                    .all(|&step| item.image_for(step).is_some());
                if !complete {
                    warn!(%model, row = item.row, "skipping row with missing step images");
                }
                complete
            })
            .collect())
    }

    /// Load the question set for a model and country.
    ///
    /// Each question gets its own random presentation order of the survey
    /// steps unless shuffling is disabled.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::NoData` when the model's file is missing or
    /// unreadable and `LoadError::NoQuestions` when no row matches `country`.
    pub async fn load(&self, model: &ModelId, country: &Country) -> Result<QuestionSet, LoadError> {
        let items = self.usable_items(model, country).await?;
        if items.is_empty() {
            info!(%model, country = %country, "no survey items for country");
            return Err(LoadError::NoQuestions {
                model: model.clone(),
                country: country.clone(),
            });
        }

        let questions = build_questions(&items, self.shuffle)?;
        info!(%model, country = %country, total = questions.len(), "loaded question set");
        Ok(QuestionSet {
            model: model.clone(),
            country: country.clone(),
            questions,
        })
    }

    /// Question count per model for a country, fetched concurrently.
    ///
    /// Failures count as zero; every requested model appears in the result.
    pub async fn count_questions(
        &self,
        models: &[ModelId],
        country: &Country,
    ) -> BTreeMap<ModelId, usize> {
        let mut counts: BTreeMap<ModelId, usize> =
            models.iter().map(|m| (m.clone(), 0)).collect();

        let mut tasks = JoinSet::new();
        for model in counts.keys().cloned() {
            let loader = self.clone();
            let country = country.clone();
            tasks.spawn(async move {
                let count = loader.usable_items(&model, &country).await.map(|i| i.len());
                (model, count)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((model, Ok(count))) => {
                    counts.insert(model, count);
                }
                Ok((model, Err(err))) => {
                    debug!(%model, error = %err, "counting as zero");
                }
                Err(err) => warn!(error = %err, "count task failed"),
            }
        }
        counts
    }

    /// Load the attribution question set.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::NoData` when the attribution file is missing or
    /// unreadable.
    pub async fn load_attribution(&self) -> Result<Vec<AttributionQuestion>, LoadError> {
        let model = ModelId::attribution();
        let no_data = |source: Option<DatasetError>| LoadError::NoData {
            model: model.clone(),
            source,
        };

        let text = match self.cache.attribution() {
            Some(text) => {
                debug!("attribution cache hit");
                text
            }
            None => match self.source.fetch_attribution_csv().await {
                Ok(Some(text)) => self.cache.insert_attribution(text),
                Ok(None) => return Err(no_data(None)),
                Err(err) => {
                    warn!(error = %err, "attribution fetch failed");
                    return Err(no_data(Some(err)));
                }
            },
        };

        let items = dataset::parse_attribution_items(&text).map_err(|err| {
            warn!(error = %err, "attribution file is malformed");
            no_data(Some(err))
        })?;
        let questions = AttributionQuestion::build_set(&items)?;
        info!(total = questions.len(), "loaded attribution set");
        Ok(questions)
    }
}

fn build_questions(items: &[SurveyItem], shuffle: bool) -> Result<Vec<SurveyQuestion>, LoadError> {
    let total = items.len();
    let mut rng = rand::rng();
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let mut order = ImageStep::SURVEY_STEPS;
            if shuffle {
                order.shuffle(&mut rng);
            }
            SurveyQuestion::from_item(item, index, total, order).map_err(LoadError::from)
        })
        .collect()
}
