use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::{ModelId, QuestionId, UserId};

/// Where a participant stands in one model's question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    /// No cursor stored for the model.
    NotStarted,
    /// Cursor is below the question count.
    InProgress,
    /// Cursor reached the question count.
    Complete,
}

/// Result of [`UserProgress::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub progress: UserProgress,
    pub repaired: bool,
}

/// Per-user survey progress document.
///
/// Holds, per model, the ids of answered questions (set semantics) and the
/// cursor of the next question to present, plus a flattened list of every
/// completed id. Invariant: each cursor stays within `0..=total` for the
/// question count it was last advanced against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    user_id: UserId,
    completed_by_model: BTreeMap<ModelId, Vec<QuestionId>>,
    current_question_by_model: BTreeMap<ModelId, usize>,
    completed_questions: Vec<QuestionId>,
    updated_at: DateTime<Utc>,
}

impl UserProgress {
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            completed_by_model: BTreeMap::new(),
            current_question_by_model: BTreeMap::new(),
            completed_questions: Vec::new(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Models that have a stored cursor or completed set.
    #[must_use]
    pub fn models(&self) -> Vec<ModelId> {
        let mut models: Vec<ModelId> = self
            .current_question_by_model
            .keys()
            .chain(self.completed_by_model.keys())
            .cloned()
            .collect();
        models.sort();
        models.dedup();
        models
    }

    #[must_use]
    pub fn completed_for(&self, model: &ModelId) -> &[QuestionId] {
        self.completed_by_model
            .get(model)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn completed_questions(&self) -> &[QuestionId] {
        &self.completed_questions
    }

    #[must_use]
    pub fn is_completed(&self, model: &ModelId, question_id: &QuestionId) -> bool {
        self.completed_for(model).contains(question_id)
    }

    /// Cursor for the model; `0` when nothing is stored.
    #[must_use]
    pub fn current_index(&self, model: &ModelId) -> usize {
        self.current_question_by_model
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn state_for(&self, model: &ModelId, total: usize) -> ProgressState {
        match self.current_question_by_model.get(model) {
            None if self.completed_for(model).is_empty() => ProgressState::NotStarted,
            Some(&index) if index >= total => ProgressState::Complete,
            _ => ProgressState::InProgress,
        }
    }

    /// Fraction of the model's questions answered, in `0.0..=1.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn completion_ratio(&self, model: &ModelId, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let done = self.completed_for(model).len().min(total);
        done as f64 / total as f64
    }

    /// Record an answer for the question at the cursor and move forward.
    ///
    /// The cursor never passes `total`. Re-answering a question already in
    /// the completed set still advances the cursor but adds no duplicate.
    pub fn record_submission(
        &mut self,
        model: &ModelId,
        question_id: &QuestionId,
        total: usize,
        now: DateTime<Utc>,
    ) {
        let next = self.current_index(model).saturating_add(1).min(total);
        self.current_question_by_model.insert(model.clone(), next);

        let completed = self.completed_by_model.entry(model.clone()).or_default();
        if !completed.contains(question_id) {
            completed.push(question_id.clone());
        }
        if !self.completed_questions.contains(question_id) {
            self.completed_questions.push(question_id.clone());
        }
        self.updated_at = now;
    }

    /// Step the cursor back by one, stopping at zero.
    pub fn navigate_back(&mut self, model: &ModelId, now: DateTime<Utc>) {
        let prev = self.current_index(model).saturating_sub(1);
        self.current_question_by_model.insert(model.clone(), prev);
        self.updated_at = now;
    }

    /// Repair a stale cursor against the current question count.
    ///
    /// A cursor past `total`, or a cursor at `total` while more questions are
    /// recorded as completed than now exist, means the dataset shrank under
    /// the stored record. The model's cursor is then reset to zero and its
    /// completed entry dropped. A cursor equal to `total` with a consistent
    /// completed set is a finished model and is left alone.
    #[must_use]
    pub fn reconcile(self, model: &ModelId, total: usize) -> Reconciliation {
        let Some(&index) = self.current_question_by_model.get(model) else {
            return Reconciliation {
                progress: self,
                repaired: false,
            };
        };

        let shrank = self.completed_for(model).len() > total;
        let stale = index > total || (index == total && shrank);
        if !stale {
            return Reconciliation {
                progress: self,
                repaired: false,
            };
        }

        let mut progress = self;
        progress.current_question_by_model.insert(model.clone(), 0);
        if let Some(dropped) = progress.completed_by_model.remove(model) {
            progress
                .completed_questions
                .retain(|id| !dropped.contains(id));
        }
        Reconciliation {
            progress,
            repaired: true,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn model(name: &str) -> ModelId {
        ModelId::new(name).unwrap()
    }

    fn qid(n: usize) -> QuestionId {
        QuestionId::new(format!("q{n}")).unwrap()
    }

    fn progress() -> UserProgress {
        UserProgress::new(UserId::new("user-1").unwrap(), fixed_now())
    }

    #[test]
    fn fresh_record_is_not_started() {
        let p = progress();
        assert_eq!(p.state_for(&model("flux"), 10), ProgressState::NotStarted);
        assert_eq!(p.current_index(&model("flux")), 0);
    }

    #[test]
    fn ten_submissions_complete_the_model() {
        let mut p = progress();
        let flux = model("flux");
        for n in 0..10 {
            let before = p.current_index(&flux);
            p.record_submission(&flux, &qid(n), 10, fixed_now());
            assert!(p.current_index(&flux) > before);
            assert_eq!(
                p.state_for(&flux, 10),
                if n < 9 {
                    ProgressState::InProgress
                } else {
                    ProgressState::Complete
                }
            );
        }
        assert_eq!(p.current_index(&flux), 10);
        assert_eq!(p.completed_for(&flux).len(), 10);
    }

    #[test]
    fn cursor_never_passes_total() {
        let mut p = progress();
        let flux = model("flux");
        for n in 0..5 {
            p.record_submission(&flux, &qid(n), 3, fixed_now());
        }
        assert_eq!(p.current_index(&flux), 3);
    }

    #[test]
    fn resubmission_does_not_duplicate() {
        let mut p = progress();
        let flux = model("flux");
        p.record_submission(&flux, &qid(1), 5, fixed_now());
        p.navigate_back(&flux, fixed_now());
        p.record_submission(&flux, &qid(1), 5, fixed_now());

        assert_eq!(p.completed_for(&flux), &[qid(1)]);
        assert_eq!(p.completed_questions(), &[qid(1)]);
        assert_eq!(p.current_index(&flux), 1);
    }

    #[test]
    fn navigate_back_stops_at_zero_and_keeps_completed() {
        let mut p = progress();
        let flux = model("flux");
        p.record_submission(&flux, &qid(1), 5, fixed_now());
        p.navigate_back(&flux, fixed_now());
        p.navigate_back(&flux, fixed_now());
        assert_eq!(p.current_index(&flux), 0);
        assert!(p.is_completed(&flux, &qid(1)));
        assert_eq!(p.state_for(&flux, 5), ProgressState::InProgress);
    }

    #[test]
    fn models_are_tracked_independently() {
        let mut p = progress();
        p.record_submission(&model("flux"), &qid(1), 5, fixed_now());
        p.record_submission(&model("qwen"), &qid(2), 5, fixed_now());
        p.record_submission(&model("qwen"), &qid(3), 5, fixed_now());
        assert_eq!(p.current_index(&model("flux")), 1);
        assert_eq!(p.current_index(&model("qwen")), 2);
        assert_eq!(p.completed_questions().len(), 3);
        assert_eq!(p.models(), vec![model("flux"), model("qwen")]);
    }

    #[test]
    fn reconcile_resets_after_dataset_shrinks() {
        let mut p = progress();
        let flux = model("flux");
        let qwen = model("qwen");
        for n in 0..8 {
            p.record_submission(&flux, &qid(n), 8, fixed_now());
        }
        p.record_submission(&qwen, &qid(100), 4, fixed_now());

        let fixed = p.reconcile(&flux, 5);
        assert!(fixed.repaired);
        let p = fixed.progress;
        assert_eq!(p.current_index(&flux), 0);
        assert!(p.completed_for(&flux).is_empty());
        assert_eq!(p.completed_questions(), &[qid(100)]);
        assert_eq!(p.current_index(&qwen), 1);
    }

    #[test]
    fn reconcile_resets_cursor_past_total() {
        let mut p = progress();
        let flux = model("flux");
        for n in 0..7 {
            p.record_submission(&flux, &qid(n), 7, fixed_now());
        }
        let fixed = p.reconcile(&flux, 3);
        assert!(fixed.repaired);
        assert_eq!(fixed.progress.current_index(&flux), 0);
    }

    #[test]
    fn reconcile_resets_cursor_at_total_when_completed_outgrows_it() {
        let mut p = progress();
        let flux = model("flux");
        for n in 0..5 {
            p.record_submission(&flux, &qid(n), 5, fixed_now());
        }
        p.navigate_back(&flux, fixed_now());
        assert_eq!(p.current_index(&flux), 4);

        let kept = p.clone().reconcile(&flux, 5);
        assert!(!kept.repaired);
        assert_eq!(kept.progress.current_index(&flux), 4);

        let fixed = p.reconcile(&flux, 4);
        assert!(fixed.repaired);
        assert_eq!(fixed.progress.current_index(&flux), 0);
        assert!(fixed.progress.completed_for(&flux).is_empty());
        assert!(fixed.progress.completed_questions().is_empty());
    }

    #[test]
    fn reconcile_keeps_finished_model() {
        let mut p = progress();
        let flux = model("flux");
        for n in 0..4 {
            p.record_submission(&flux, &qid(n), 4, fixed_now());
        }
        let fixed = p.clone().reconcile(&flux, 4);
        assert!(!fixed.repaired);
        assert_eq!(fixed.progress, p);
        assert_eq!(fixed.progress.state_for(&flux, 4), ProgressState::Complete);
    }

    #[test]
    fn reconcile_ignores_unknown_model() {
        let p = progress();
        let fixed = p.clone().reconcile(&model("sd35"), 0);
        assert!(!fixed.repaired);
        assert_eq!(fixed.progress, p);
    }

    #[test]
    fn completion_ratio_is_bounded() {
        let mut p = progress();
        let flux = model("flux");
        p.record_submission(&flux, &qid(1), 4, fixed_now());
        assert!((p.completion_ratio(&flux, 4) - 0.25).abs() < f64::EPSILON);
        assert_eq!(p.completion_ratio(&flux, 0), 0.0);
    }
}
