//! Per-learner progress records.
//!
//! Records are owned by the (user, node) pair and outlive content
//! regeneration; they are created on first access and never deleted while
//! the course exists. The `remedial_generated` flags are the idempotency
//! guards for the remediation policy and are only flipped after the matching
//! insertion has committed.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::grader::QuestionResult;
use crate::utils::now_utc;

/// One graded attempt, kept in an append-only history.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub score: f64,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub timestamp: OffsetDateTime,
    pub results: Vec<QuestionResult>,
    pub passed: bool,
}

/// Progress of one learner through one submodule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmoduleProgress {
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub sub_module_id: String,
    #[serde(default)]
    pub test_attempts: u32,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default)]
    pub best_test_score: f64,
    #[serde(default)]
    pub quiz_passed: bool,
    #[serde(default)]
    pub last_attempt_score: f64,
    #[serde(default)]
    pub last_attempt_answers: Vec<String>,
    #[serde(default)]
    pub last_attempt_results: Vec<QuestionResult>,
    #[serde(default)]
    pub last_attempt_passed: bool,
    #[serde(default)]
    pub weak_areas: Vec<String>,
    /// Idempotency guard: at most one remedial submodule per failure streak.
    #[serde(default)]
    pub remedial_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remedial_sub_module_id: Option<String>,
    #[serde(default)]
    pub content_completed: bool,
    #[serde(default)]
    pub completed_via_exam: bool,
    #[serde(default)]
    pub attempt_history: Vec<AttemptRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_test_at: Option<OffsetDateTime>,
}

impl SubmoduleProgress {
    pub fn new(user_id: &str, course_id: &str, module_id: &str, sub_module_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            sub_module_id: sub_module_id.to_string(),
            test_attempts: 0,
            fail_count: 0,
            best_test_score: 0.0,
            quiz_passed: false,
            last_attempt_score: 0.0,
            last_attempt_answers: Vec::new(),
            last_attempt_results: Vec::new(),
            last_attempt_passed: false,
            weak_areas: Vec::new(),
            remedial_generated: false,
            remedial_sub_module_id: None,
            content_completed: false,
            completed_via_exam: false,
            attempt_history: Vec::new(),
            started_at: now_utc(),
            last_test_at: None,
        }
    }

    pub fn has_attempted(&self) -> bool {
        self.test_attempts > 0
    }

    /// Record one graded attempt: bumps the counters, refreshes the
    /// last-attempt snapshot and best score, and appends to the history.
    pub fn record_attempt(
        &mut self,
        score: f64,
        passed: bool,
        answers: Vec<String>,
        results: Vec<QuestionResult>,
        weak_areas: Vec<String>,
    ) -> u32 {
        self.test_attempts += 1;
        self.last_test_at = Some(now_utc());
        self.best_test_score = self.best_test_score.max(score);
        self.last_attempt_score = score;
        self.last_attempt_answers = answers;
        self.last_attempt_passed = passed;
        if passed {
            self.quiz_passed = true;
            self.content_completed = true;
        } else {
            self.fail_count += 1;
            // keep only the strongest signals for the remedial prompt
            self.weak_areas = weak_areas.into_iter().take(3).collect();
        }
        self.attempt_history.push(AttemptRecord {
            attempt_number: self.test_attempts,
            score,
            timestamp: now_utc(),
            results: results.clone(),
            passed,
        });
        self.last_attempt_results = results;
        self.test_attempts
    }
}

/// Progress of one learner through one module's exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    #[serde(default)]
    pub exam_attempts: u32,
    #[serde(default)]
    pub best_exam_score: f64,
    #[serde(default)]
    pub exam_passed: bool,
    #[serde(default)]
    pub last_attempt_score: f64,
    #[serde(default)]
    pub last_attempt_answers: Vec<String>,
    #[serde(default)]
    pub last_attempt_results: Vec<QuestionResult>,
    #[serde(default)]
    pub last_attempt_passed: bool,
    /// Idempotency guard: at most one remedial module per failure streak.
    #[serde(default)]
    pub remedial_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remedial_module_id: Option<String>,
    #[serde(default)]
    pub attempt_history: Vec<AttemptRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_exam_at: Option<OffsetDateTime>,
}

impl ModuleProgress {
    pub fn new(user_id: &str, course_id: &str, module_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            exam_attempts: 0,
            best_exam_score: 0.0,
            exam_passed: false,
            last_attempt_score: 0.0,
            last_attempt_answers: Vec::new(),
            last_attempt_results: Vec::new(),
            last_attempt_passed: false,
            remedial_generated: false,
            remedial_module_id: None,
            attempt_history: Vec::new(),
            started_at: now_utc(),
            last_exam_at: None,
        }
    }

    pub fn has_attempted(&self) -> bool {
        self.exam_attempts > 0
    }

    pub fn record_attempt(
        &mut self,
        score: f64,
        passed: bool,
        answers: Vec<String>,
        results: Vec<QuestionResult>,
    ) -> u32 {
        self.exam_attempts += 1;
        self.last_exam_at = Some(now_utc());
        self.best_exam_score = self.best_exam_score.max(score);
        self.last_attempt_score = score;
        self.last_attempt_answers = answers;
        self.last_attempt_passed = passed;
        if passed {
            self.exam_passed = true;
        }
        self.attempt_history.push(AttemptRecord {
            attempt_number: self.exam_attempts,
            score,
            timestamp: now_utc(),
            results: results.clone(),
            passed,
        });
        self.last_attempt_results = results;
        self.exam_attempts
    }

    /// Question texts answered wrong across the whole attempt history, used
    /// to target the remedial module.
    pub fn wrong_question_texts(&self, limit: usize) -> Vec<String> {
        let mut texts = Vec::new();
        for attempt in &self.attempt_history {
            for result in &attempt.results {
                if !result.is_correct && texts.len() < limit {
                    texts.push(format!(
                        "{} (answered: {})",
                        result.correct_answer, result.user_answer
                    ));
                }
            }
        }
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_attempt_increments_fail_count_and_keeps_best_score() {
        let mut progress = SubmoduleProgress::new("u", "c", "m", "s");
        progress.record_attempt(80.0, true, vec![], vec![], vec![]);
        assert!(progress.quiz_passed);
        assert_eq!(progress.fail_count, 0);

        progress.record_attempt(30.0, false, vec![], vec![], vec!["q1".to_string()]);
        assert_eq!(progress.test_attempts, 2);
        assert_eq!(progress.fail_count, 1);
        assert_eq!(progress.best_test_score, 80.0);
        assert_eq!(progress.last_attempt_score, 30.0);
        // a later failure never clears the pass flag
        assert!(progress.quiz_passed);
        assert_eq!(progress.attempt_history.len(), 2);
    }

    #[test]
    fn weak_areas_are_capped_at_three() {
        let mut progress = SubmoduleProgress::new("u", "c", "m", "s");
        let weak: Vec<String> = (0..5).map(|i| format!("q{i}")).collect();
        progress.record_attempt(0.0, false, vec![], vec![], weak);
        assert_eq!(progress.weak_areas.len(), 3);
    }

    #[test]
    fn module_history_is_append_only() {
        let mut progress = ModuleProgress::new("u", "c", "m");
        progress.record_attempt(40.0, false, vec![], vec![]);
        progress.record_attempt(65.0, false, vec![], vec![]);
        progress.record_attempt(90.0, true, vec![], vec![]);
        assert_eq!(progress.exam_attempts, 3);
        assert_eq!(
            progress
                .attempt_history
                .iter()
                .map(|a| a.attempt_number)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(progress.best_exam_score, 90.0);
        assert!(progress.exam_passed);
    }
}
