use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use survey_core::model::ModelId;

/// Raw dataset text keyed by model, plus one slot for the attribution file.
///
/// Clones share the same entries. Nothing is evicted implicitly: switching
/// country reuses the cached text, and callers invalidate explicitly.
#[derive(Debug, Clone, Default)]
pub struct CsvCache {
    inner: Arc<Mutex<CacheState>>,
}

#[derive(Debug, Default)]
struct CacheState {
    survey: HashMap<ModelId, Arc<str>>,
    attribution: Option<Arc<str>>,
}

impl CsvCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, model: &ModelId) -> Option<Arc<str>> {
        self.state().survey.get(model).cloned()
    }

    pub fn insert(&self, model: ModelId, text: impl Into<Arc<str>>) -> Arc<str> {
        let text = text.into();
        self.state().survey.insert(model, Arc::clone(&text));
        text
    }

    #[must_use]
    pub fn attribution(&self) -> Option<Arc<str>> {
        self.state().attribution.clone()
    }

    pub fn insert_attribution(&self, text: impl Into<Arc<str>>) -> Arc<str> {
        let text = text.into();
        self.state().attribution = Some(Arc::clone(&text));
        text
    }

    /// Drop one model's entry. Returns whether anything was cached.
    pub fn invalidate(&self, model: &ModelId) -> bool {
        self.state().survey.remove(model).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.survey.clear();
        state.attribution = None;
    }

    /// Number of cached model files (the attribution slot is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().survey.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
