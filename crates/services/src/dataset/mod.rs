//! Dataset files: where they come from and how rows become domain items.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use survey_core::model::{AttributionItem, Country, ImageRef, ModelId, SurveyItem};

use crate::error::DatasetError;

pub mod cache;
pub mod csv;

pub use cache::CsvCache;

/// Default per-model file location relative to the dataset base URL.
pub const DEFAULT_SURVEY_TEMPLATE: &str = "{model}/prompt-img-path_extended.csv";
/// Default attribution file location relative to the dataset base URL.
pub const DEFAULT_ATTRIBUTION_FILE: &str = "attribution/attribution.csv";

/// Where dataset CSV text comes from.
///
/// `Ok(None)` means the file does not exist for that model.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `DatasetError` when the file exists but cannot be fetched.
    async fn fetch_survey_csv(&self, model: &ModelId) -> Result<Option<String>, DatasetError>;

    /// # Errors
    ///
    /// Returns `DatasetError` when the file exists but cannot be fetched.
    async fn fetch_attribution_csv(&self) -> Result<Option<String>, DatasetError>;

    /// Base against which relative image paths resolve, if known.
    fn content_base(&self) -> Option<Url> {
        None
    }
}

//
// ─── HTTP SOURCE ───────────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub base_url: String,
    pub survey_file_template: String,
    pub attribution_file: String,
}

impl DatasetConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            survey_file_template: DEFAULT_SURVEY_TEMPLATE.into(),
            attribution_file: DEFAULT_ATTRIBUTION_FILE.into(),
        }
    }

    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("SURVEY_DATASET_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let survey_file_template = env::var("SURVEY_DATASET_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_SURVEY_TEMPLATE.into());
        let attribution_file = env::var("SURVEY_ATTRIBUTION_FILE")
            .unwrap_or_else(|_| DEFAULT_ATTRIBUTION_FILE.into());
        Some(Self {
            base_url,
            survey_file_template,
            attribution_file,
        })
    }

    fn base(&self) -> Result<Url, DatasetError> {
        let mut raw = self.base_url.trim().to_owned();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    /// Location of a model's survey file.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::Url` if the base URL or template is malformed.
    pub fn survey_url(&self, model: &ModelId) -> Result<Url, DatasetError> {
        let path = self.survey_file_template.replace("{model}", model.as_str());
        Ok(self.base()?.join(path.trim_start_matches('/'))?)
    }

    /// # Errors
    ///
    /// Returns `DatasetError::Url` if the base URL or file path is malformed.
    pub fn attribution_url(&self) -> Result<Url, DatasetError> {
        Ok(self
            .base()?
            .join(self.attribution_file.trim_start_matches('/'))?)
    }
}

/// Fetches dataset files over HTTP.
#[derive(Clone)]
pub struct HttpDatasetSource {
    client: Client,
    config: DatasetConfig,
}

impl HttpDatasetSource {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        DatasetConfig::from_env().map(Self::new)
    }

    #[must_use]
    pub fn new(config: DatasetConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    async fn fetch(&self, url: Url) -> Result<Option<String>, DatasetError> {
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DatasetError::HttpStatus(response.status()));
        }
        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn fetch_survey_csv(&self, model: &ModelId) -> Result<Option<String>, DatasetError> {
        let url = self.config.survey_url(model)?;
        self.fetch(url).await
    }

    async fn fetch_attribution_csv(&self) -> Result<Option<String>, DatasetError> {
        let url = self.config.attribution_url()?;
        self.fetch(url).await
    }

    fn content_base(&self) -> Option<Url> {
        self.config.base().ok()
    }
}

//
// ─── STATIC SOURCE ─────────────────────────────────────────────────────────────
//

/// Dataset held in memory, for tests and offline runs.
#[derive(Clone, Debug, Default)]
pub struct StaticDatasetSource {
    survey: HashMap<ModelId, String>,
    attribution: Option<String>,
    content_base: Option<Url>,
}

impl StaticDatasetSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_survey(mut self, model: ModelId, text: impl Into<String>) -> Self {
        self.survey.insert(model, text.into());
        self
    }

    #[must_use]
    pub fn with_attribution(mut self, text: impl Into<String>) -> Self {
        self.attribution = Some(text.into());
        self
    }

    /// Load `<dir>/<model>.csv` files and an optional `<dir>/attribution.csv`.
    ///
    /// Relative image paths resolve against `dir`.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::Io` if the directory cannot be read.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let mut source = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            if stem.eq_ignore_ascii_case(ModelId::ATTRIBUTION) {
                source.attribution = Some(text);
            } else if let Ok(model) = ModelId::new(stem) {
                source.survey.insert(model, text);
            }
        }
        source.content_base = std::fs::canonicalize(dir)
            .ok()
            .and_then(|abs| Url::from_directory_path(abs).ok());
        Ok(source)
    }

    /// Models with a survey file.
    #[must_use]
    pub fn models(&self) -> Vec<ModelId> {
        let mut models: Vec<ModelId> = self.survey.keys().cloned().collect();
        models.sort();
        models
    }
}

#[async_trait]
impl DatasetSource for StaticDatasetSource {
    async fn fetch_survey_csv(&self, model: &ModelId) -> Result<Option<String>, DatasetError> {
        Ok(self.survey.get(model).cloned())
    }

    async fn fetch_attribution_csv(&self) -> Result<Option<String>, DatasetError> {
        Ok(self.attribution.clone())
    }

    fn content_base(&self) -> Option<Url> {
        self.content_base.clone()
    }
}

//
// ─── ROW MAPPING ───────────────────────────────────────────────────────────────
//

const SURVEY_REQUIRED: [&str; 6] = ["base", "edit_1", "edit_2", "edit_3", "edit_4", "edit_5"];
const EDIT_COLUMNS: [&str; 5] = ["edit_1", "edit_2", "edit_3", "edit_4", "edit_5"];
const ATTRIBUTION_REQUIRED: [&str; 4] =
    ["step", "prompt", "flux_output_file", "qwen_output_file"];

fn image_cell(raw: &str) -> Option<ImageRef> {
    ImageRef::parse(raw).ok()
}

/// Map a model's survey file to items, in file order.
///
/// Blank metadata cells are filled from the base image's file name.
///
/// # Errors
///
/// Returns `DatasetError` for malformed CSV or a missing image column.
pub fn parse_survey_items(model: &ModelId, text: &str) -> Result<Vec<SurveyItem>, DatasetError> {
    let table = csv::Table::parse(text)?;
    table.header().require(&SURVEY_REQUIRED)?;

    let items = table
        .records()
        .map(|record| {
            let mut item = SurveyItem {
                row: record.index(),
                model: model.clone(),
                country: Country::new(record.get("country")),
                category: record.get("category").to_owned(),
                sub_category: record.get_any(&["sub_category", "subcategory"]).to_owned(),
                variant: record.get("variant").to_owned(),
                t2i_prompt: record
                    .get_any(&["T2I prompt", "t2i_prompt", "prompt"])
                    .to_owned(),
                i2i_prompt: record.get_any(&["I2I prompt", "i2i_prompt"]).to_owned(),
                base: image_cell(record.get("base")),
                edits: EDIT_COLUMNS.map(|column| image_cell(record.get(column))),
            };
            item.fill_missing_metadata();
            if item.country.is_empty() {
                if let Some(country) = Country::from_prompt(&item.t2i_prompt) {
                    item.country = country;
                }
            }
            item
        })
        .collect();
    Ok(items)
}

/// Map the attribution file to items, in file order.
///
/// Rows without a country cell take the country named in the prompt.
///
/// # Errors
///
/// Returns `DatasetError` for malformed CSV, a missing column or a
/// non-numeric step.
pub fn parse_attribution_items(text: &str) -> Result<Vec<AttributionItem>, DatasetError> {
    let table = csv::Table::parse(text)?;
    table.header().require(&ATTRIBUTION_REQUIRED)?;

    table
        .records()
        .map(|record| {
            let raw_step = record.get("step");
            let step = raw_step.parse::<u32>().map_err(|_| DatasetError::InvalidRow {
                row: record.index(),
                message: format!("invalid step `{raw_step}`"),
            })?;
            let prompt = record.get("prompt").to_owned();
            let country = match record.get("country") {
                "" => Country::from_prompt(&prompt).unwrap_or_else(|| Country::new("")),
                named => Country::new(named),
            };
            Ok(AttributionItem {
                row: record.index(),
                country,
                step,
                prompt,
                flux_output: image_cell(record.get("flux_output_file")),
                qwen_output: image_cell(record.get("qwen_output_file")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::model::ImageStep;

    const HEADER: &str =
        "model,country,category,sub_category,variant,T2I prompt,I2I prompt,base,edit_1,edit_2,edit_3,edit_4,edit_5";

    fn flux() -> ModelId {
        ModelId::new("flux").unwrap()
    }

    #[test]
    fn survey_rows_fill_metadata_from_file_name() {
        let text = format!(
            "{HEADER}\nflux,,,,,\"A photo of food in Kenya\",,flux/flux_kenya_food_ugali_dish_traditional_0.png,e1.png,e2.png,e3.png,e4.png,e5.png\n"
        );
        let items = parse_survey_items(&flux(), &text).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.country.key(), "kenya");
        assert_eq!(item.category, "food");
        assert_eq!(item.sub_category, "ugali_dish");
        assert_eq!(item.variant, "traditional");
        assert_eq!(
            item.image_for(ImageStep::Edit5).unwrap().to_string(),
            "e5.png"
        );
    }

    #[test]
    fn survey_file_without_image_columns_is_rejected() {
        let err = parse_survey_items(&flux(), "model,country\nflux,Kenya\n").unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn("base")));
    }

    #[test]
    fn attribution_rows_take_country_from_prompt() {
        let text = "country,step,prompt,flux_output_file,qwen_output_file\n\
                    ,0,\"A street in South Korea\",f0.png,q0.png\n\
                    India,1,add lanterns,f1.png,\n";
        let items = parse_attribution_items(text).unwrap();
        assert_eq!(items[0].country.display_name(), "Korea");
        assert_eq!(items[1].country.key(), "india");
        assert!(items[1].qwen_output.is_none());
    }

    #[test]
    fn attribution_step_must_be_numeric() {
        let text = "step,prompt,flux_output_file,qwen_output_file\nfirst,p,f.png,q.png\n";
        assert!(matches!(
            parse_attribution_items(text).unwrap_err(),
            DatasetError::InvalidRow { row: 0, .. }
        ));
    }

    #[test]
    fn config_joins_template_under_base() {
        let config = DatasetConfig::new("https://data.example.org/survey");
        assert_eq!(
            config.survey_url(&ModelId::new("qwen").unwrap()).unwrap().as_str(),
            "https://data.example.org/survey/qwen/prompt-img-path_extended.csv"
        );
        assert_eq!(
            config.attribution_url().unwrap().as_str(),
            "https://data.example.org/survey/attribution/attribution.csv"
        );
    }

    #[tokio::test]
    async fn static_source_reports_absent_models() {
        let source = StaticDatasetSource::new().with_survey(flux(), HEADER);
        assert!(source.fetch_survey_csv(&flux()).await.unwrap().is_some());
        assert!(
            source
                .fetch_survey_csv(&ModelId::new("sd35").unwrap())
                .await
                .unwrap()
                .is_none()
        );
        assert!(source.fetch_attribution_csv().await.unwrap().is_none());
    }
}
