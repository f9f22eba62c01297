//! Aggregates for the administrator view.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use survey_core::model::{
    Country, ImageStep, ModelId, QuestionId, Rating, Response, ResponseKind, SurveyResponse,
    UserId,
};
use storage::repository::{ProfileRepository, ProgressRepository, ResponseRepository};

use crate::error::DashboardError;

//
// ─── VIEW TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelProgress {
    pub model: ModelId,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

/// One participant's completion across models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProgressRow {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub models: Vec<ModelProgress>,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepChoices {
    pub step: ImageStep,
    pub best: usize,
    pub worst: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepMeans {
    pub step: ImageStep,
    pub samples: usize,
    pub image_quality: f64,
    pub cultural_representativeness: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryBest {
    pub country: Country,
    pub best_step: ImageStep,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub model: ModelId,
    pub responses: usize,
    pub choices: Vec<StepChoices>,
    pub means: Vec<StepMeans>,
    pub best_by_country: Vec<CountryBest>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResponseStats {
    pub models: Vec<ModelStats>,
}

/// Mean attribution ratings for one output label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputStats {
    pub model: ModelId,
    pub samples: usize,
    pub prompt_adherence: f64,
    pub cultural_representativeness: f64,
    pub image_quality: f64,
    pub preferred: usize,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

#[derive(Clone)]
pub struct DashboardService {
    responses: Arc<dyn ResponseRepository>,
    progress: Arc<dyn ProgressRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        responses: Arc<dyn ResponseRepository>,
        progress: Arc<dyn ProgressRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            responses,
            progress,
            profiles,
        }
    }

    /// Completion per participant against the given question counts.
    ///
    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if progress or profiles cannot be read.
    pub async fn user_progress(
        &self,
        totals: &BTreeMap<ModelId, usize>,
    ) -> Result<Vec<UserProgressRow>, DashboardError> {
        let names: HashMap<UserId, String> = self
            .profiles
            .list_profiles()
            .await?
            .into_iter()
            .map(|p| (p.user_id, p.display_name))
            .collect();

        let rows = self
            .progress
            .list_progress()
            .await?
            .into_iter()
            .map(|progress| {
                let models: Vec<ModelProgress> = totals
                    .iter()
                    .map(|(model, &total)| {
                        let completed = progress.completed_for(model).len().min(total);
                        ModelProgress {
                            model: model.clone(),
                            completed,
                            total,
                            percent: percent(completed, total),
                        }
                    })
                    .collect();
                let completed = models.iter().map(|m| m.completed).sum();
                let total = models.iter().map(|m| m.total).sum();
                UserProgressRow {
                    display_name: names.get(progress.user_id()).cloned(),
                    user_id: progress.user_id().clone(),
                    models,
                    completed,
                    total,
                    percent: percent(completed, total),
                }
            })
            .collect();
        Ok(rows)
    }

    /// Best/worst choices, mean ratings and the favourite step per country.
    ///
    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if responses cannot be read.
    pub async fn response_stats(&self) -> Result<ResponseStats, DashboardError> {
        let mut by_model: BTreeMap<ModelId, Vec<SurveyResponse>> = BTreeMap::new();
        let stored = self.responses.all_responses(ResponseKind::Survey).await?;
        for response in latest_answers(stored) {
            if let Some(survey) = response.as_survey() {
                by_model
                    .entry(survey.model.clone())
                    .or_default()
                    .push(survey.clone());
            }
        }

        let models = by_model
            .into_iter()
            .map(|(model, responses)| model_stats(model, &responses))
            .collect();
        Ok(ResponseStats { models })
    }

    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if responses cannot be read.
    pub async fn attribution_stats(&self) -> Result<Vec<OutputStats>, DashboardError> {
        #[derive(Default)]
        struct Acc {
            samples: usize,
            prompt: u64,
            cultural: u64,
            quality: u64,
            preferred: usize,
        }

        let mut acc: BTreeMap<ModelId, Acc> = BTreeMap::new();
        let stored = self.responses.all_responses(ResponseKind::Attribution).await?;
        for response in latest_answers(stored) {
            let Some(attr) = response.as_attribution() else {
                continue;
            };
            for output in &attr.ratings {
                let entry = acc.entry(output.model.clone()).or_default();
                entry.samples += 1;
                entry.prompt += score(output.rating.prompt_adherence);
                entry.cultural += score(output.rating.cultural_representativeness);
                entry.quality += score(output.rating.image_quality);
            }
            if let Some(preferred) = &attr.preferred {
                acc.entry(preferred.clone()).or_default().preferred += 1;
            }
        }

        Ok(acc
            .into_iter()
            .map(|(model, a)| OutputStats {
                model,
                samples: a.samples,
                prompt_adherence: mean(a.prompt, a.samples),
                cultural_representativeness: mean(a.cultural, a.samples),
                image_quality: mean(a.quality, a.samples),
                preferred: a.preferred,
            })
            .collect())
    }
}

/// One response per user and question: the most recent one. Re-answering
/// after going back replaces the earlier answer.
fn latest_answers(responses: Vec<Response>) -> Vec<Response> {
    let mut latest: HashMap<(UserId, QuestionId), Response> = HashMap::new();
    for response in responses {
        let key = (response.user_id().clone(), response.question_id().clone());
        match latest.get(&key) {
            Some(kept) if kept.submitted_at() > response.submitted_at() => {}
            _ => {
                latest.insert(key, response);
            }
        }
    }
    latest.into_values().collect()
}

fn model_stats(model: ModelId, responses: &[SurveyResponse]) -> ModelStats {
    let choices = ImageStep::SURVEY_STEPS
        .iter()
        .map(|&step| StepChoices {
            step,
            best: responses.iter().filter(|r| r.best_step == step).count(),
            worst: responses.iter().filter(|r| r.worst_step == step).count(),
        })
        .collect();

    let means = ImageStep::SURVEY_STEPS
        .iter()
        .map(|&step| {
            let ratings: Vec<_> = responses.iter().filter_map(|r| r.rating_for(step)).collect();
            let samples = ratings.len();
            StepMeans {
                step,
                samples,
                image_quality: mean(ratings.iter().map(|r| score(r.image_quality)).sum(), samples),
                cultural_representativeness: mean(
                    ratings
                        .iter()
                        .map(|r| score(r.cultural_representativeness))
                        .sum(),
                    samples,
                ),
            }
        })
        .collect();

    let mut tallies: BTreeMap<String, (Country, BTreeMap<ImageStep, usize>)> = BTreeMap::new();
    for r in responses {
        let (_, counts) = tallies
            .entry(r.country.key())
            .or_insert_with(|| (r.country.clone(), BTreeMap::new()));
        *counts.entry(r.best_step).or_default() += 1;
    }
    let best_by_country = tallies
        .into_values()
        .filter_map(|(country, counts)| {
            mode(&counts).map(|best_step| CountryBest { country, best_step })
        })
        .collect();

    ModelStats {
        model,
        responses: responses.len(),
        choices,
        means,
        best_by_country,
    }
}

/// Most frequent step; ties go to the lowest step.
fn mode(counts: &BTreeMap<ImageStep, usize>) -> Option<ImageStep> {
    let mut best: Option<(ImageStep, usize)> = None;
    for (&step, &n) in counts {
        if best.is_none_or(|(_, top)| n > top) {
            best = Some((step, n));
        }
    }
    best.map(|(step, _)| step)
}

fn score(rating: Rating) -> u64 {
    u64::from(rating.value())
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: u64, samples: usize) -> f64 {
    if samples == 0 {
        0.0
    } else {
        sum as f64 / samples as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 * 100.0 / total as f64
    }
}
