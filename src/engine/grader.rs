//! Assessment grading.
//!
//! Per-question rules are shared, but the two aggregate formulas are not:
//! submodule quizzes use a count-based base score minus a hint-penalty
//! percentage, module exams average per-question penalized scores. The
//! asymmetry is an existing contract and both formulas are pinned by tests;
//! do not unify them.

use std::collections::{BTreeSet, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::course::quiz::{Question, QuestionKind};
use crate::error::{Error, Result};
use crate::generator::{ContentGenerator, generate_as, grade_answer_prompt};

/// Which hints the learner opened for one question.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct HintFlags {
    pub hint1: bool,
    pub hint2: bool,
}

impl HintFlags {
    pub fn count(&self) -> u32 {
        self.hint1 as u32 + self.hint2 as u32
    }
}

/// Keyed by zero-based question index.
pub type HintsUsed = HashMap<usize, HintFlags>;

/// Per-question grading verdict before aggregation.
#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub is_correct: bool,
    /// 0..100, before the hint penalty.
    pub raw_score: f64,
    pub explanation: String,
    pub feedback: String,
}

/// Graded view of one submitted answer, as stored in attempt snapshots and
/// returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_index: usize,
    #[serde(rename = "type")]
    pub question_type: String,
    pub is_correct: bool,
    pub user_answer: String,
    pub correct_answer: String,
    pub explanation: String,
    /// Post-penalty score for this question.
    pub score: f64,
    pub hints_used: u32,
    pub feedback: String,
}

#[derive(Debug, Clone)]
pub struct GradedSubmission {
    pub results: Vec<QuestionResult>,
    pub correct_count: u32,
    /// Overall 0..100 score after penalties.
    pub score: f64,
    pub passed: bool,
    /// Question texts the learner got wrong, in question order.
    pub weak_areas: Vec<String>,
}

/// AI grading contract for free-text answers.
#[derive(Debug, Deserialize, JsonSchema)]
struct GradedAnswer {
    score: i64,
    feedback: String,
}

fn hint_multiplier(hints_used: u32, rate: f64) -> f64 {
    (1.0 - hints_used as f64 * rate).max(0.0)
}

/// Exact, case-sensitive match against the canonical answer.
fn grade_multiple_choice(correct_answer: &str, answer: &str) -> bool {
    answer == correct_answer
}

/// Set comparison over trimmed comma-separated tokens. Exact equality scores
/// 100; otherwise partial credit `(correct - wrong) / |canonical|`, floored
/// at 0. An empty canonical set scores 0.
fn grade_multi_select(canonical: &[String], answer: &str) -> (bool, f64) {
    let canonical_set: BTreeSet<&str> = canonical.iter().map(String::as_str).collect();
    if canonical_set.is_empty() {
        return (false, 0.0);
    }
    let user_set: BTreeSet<&str> = answer
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if user_set == canonical_set {
        return (true, 100.0);
    }
    let correct_picks = user_set.intersection(&canonical_set).count() as f64;
    let wrong_picks = user_set.difference(&canonical_set).count() as f64;
    let base = ((correct_picks - wrong_picks) / canonical_set.len() as f64 * 100.0).max(0.0);
    (false, base)
}

/// Grade a single question. Free-text types delegate to the generator; a
/// grading failure degrades that question to zero with explicit feedback and
/// never aborts the submission.
pub async fn grade_question(
    question: &Question,
    answer: &str,
    hints_used: u32,
    generator: &dyn ContentGenerator,
    config: &EngineConfig,
) -> GradeOutcome {
    match &question.kind {
        QuestionKind::MultipleChoice { correct_answer, .. } => {
            let is_correct = grade_multiple_choice(correct_answer, answer);
            GradeOutcome {
                is_correct,
                raw_score: if is_correct { 100.0 } else { 0.0 },
                explanation: question.explanation.clone(),
                feedback: if is_correct { "Correct!" } else { "Incorrect." }.to_string(),
            }
        }
        QuestionKind::MultiSelect {
            correct_answers, ..
        } => {
            let (is_correct, raw_score) = grade_multi_select(correct_answers, answer);
            let feedback = if is_correct {
                "All correct!".to_string()
            } else {
                format!(
                    "Partial credit. Correct answers: {}",
                    correct_answers.join(", ")
                )
            };
            GradeOutcome {
                is_correct,
                raw_score,
                explanation: question.explanation.clone(),
                feedback,
            }
        }
        QuestionKind::ShortAnswer { correct_answer } | QuestionKind::Coding { correct_answer } => {
            let prompt = grade_answer_prompt(&question.question_text, correct_answer, answer);
            match generate_as::<GradedAnswer>(generator, &prompt).await {
                Ok(graded) => {
                    let raw_score = (graded.score as f64).clamp(0.0, 100.0);
                    let penalized = raw_score * hint_multiplier(hints_used, config.hint_penalty_rate);
                    GradeOutcome {
                        is_correct: penalized >= config.pass_threshold,
                        raw_score,
                        explanation: question.explanation.clone(),
                        feedback: graded.feedback,
                    }
                }
                Err(e) => {
                    warn!("free-text grading failed: {e}");
                    GradeOutcome {
                        is_correct: false,
                        raw_score: 0.0,
                        explanation: question.explanation.clone(),
                        feedback: "Grading failed for this answer; it was scored as zero."
                            .to_string(),
                    }
                }
            }
        }
    }
}

fn check_answer_count(questions: &[Question], answers: &[String]) -> Result<()> {
    if answers.len() != questions.len() {
        return Err(Error::Validation(format!(
            "answer count mismatch: got {}, expected {}",
            answers.len(),
            questions.len()
        )));
    }
    Ok(())
}

async fn grade_all(
    questions: &[Question],
    answers: &[String],
    hints: &HintsUsed,
    generator: &dyn ContentGenerator,
    config: &EngineConfig,
) -> Vec<(GradeOutcome, u32)> {
    let mut outcomes = Vec::with_capacity(questions.len());
    for (i, (question, answer)) in questions.iter().zip(answers).enumerate() {
        let hints_used = hints.get(&i).map(HintFlags::count).unwrap_or(0);
        let outcome = grade_question(question, answer, hints_used, generator, config).await;
        outcomes.push((outcome, hints_used));
    }
    outcomes
}

fn build_result(
    index: usize,
    question: &Question,
    answer: &str,
    outcome: &GradeOutcome,
    hints_used: u32,
    score: f64,
) -> QuestionResult {
    QuestionResult {
        question_index: index,
        question_type: question.type_name().to_string(),
        is_correct: outcome.is_correct,
        user_answer: answer.to_string(),
        correct_answer: question.correct_answer_display(),
        explanation: outcome.explanation.clone(),
        score,
        hints_used,
        feedback: outcome.feedback.clone(),
    }
}

/// Submodule-quiz aggregation: count-based base score minus a penalty
/// percentage derived from the total hints used across all questions.
pub async fn grade_quiz(
    questions: &[Question],
    answers: &[String],
    hints: &HintsUsed,
    generator: &dyn ContentGenerator,
    config: &EngineConfig,
) -> Result<GradedSubmission> {
    check_answer_count(questions, answers)?;
    let outcomes = grade_all(questions, answers, hints, generator, config).await;

    let mut results = Vec::with_capacity(questions.len());
    let mut correct_count = 0u32;
    let mut total_hints = 0u32;
    let mut weak_areas = Vec::new();
    for (i, (outcome, hints_used)) in outcomes.iter().enumerate() {
        let question = &questions[i];
        total_hints += hints_used;
        if outcome.is_correct {
            correct_count += 1;
        } else {
            weak_areas.push(question.question_text.clone());
        }
        let per_question = outcome.raw_score * hint_multiplier(*hints_used, config.hint_penalty_rate);
        results.push(build_result(i, question, &answers[i], outcome, *hints_used, per_question));
    }

    let total = questions.len() as f64;
    let (base, penalty) = if questions.is_empty() {
        (0.0, 0.0)
    } else {
        (
            correct_count as f64 / total * 100.0,
            total_hints as f64 * config.hint_penalty_rate / total * 100.0,
        )
    };
    let score = (base - penalty).max(0.0);
    Ok(GradedSubmission {
        results,
        correct_count,
        score,
        passed: score >= config.pass_threshold,
        weak_areas,
    })
}

/// Module-exam aggregation: each question is penalized individually and the
/// overall score is the mean of per-question scores.
pub async fn grade_exam(
    questions: &[Question],
    answers: &[String],
    hints: &HintsUsed,
    generator: &dyn ContentGenerator,
    config: &EngineConfig,
) -> Result<GradedSubmission> {
    check_answer_count(questions, answers)?;
    let outcomes = grade_all(questions, answers, hints, generator, config).await;

    let mut results = Vec::with_capacity(questions.len());
    let mut correct_count = 0u32;
    let mut total_score = 0.0;
    let mut weak_areas = Vec::new();
    for (i, (outcome, hints_used)) in outcomes.iter().enumerate() {
        let question = &questions[i];
        let score_for_q = outcome.raw_score * hint_multiplier(*hints_used, config.hint_penalty_rate);
        total_score += score_for_q;
        if outcome.is_correct {
            correct_count += 1;
        } else {
            weak_areas.push(question.question_text.clone());
        }
        results.push(build_result(i, question, &answers[i], outcome, *hints_used, score_for_q));
    }

    let score = if questions.is_empty() {
        0.0
    } else {
        total_score / questions.len() as f64
    };
    Ok(GradedSubmission {
        results,
        correct_count,
        score,
        passed: score >= config.pass_threshold,
        weak_areas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::quiz::Difficulty;
    use crate::generator::MockGenerator;

    fn mc(text: &str, correct: &str, wrong: &str) -> Question {
        Question {
            question_text: text.to_string(),
            kind: QuestionKind::MultipleChoice {
                options: vec![correct.to_string(), wrong.to_string()],
                correct_answer: correct.to_string(),
            },
            explanation: "because".to_string(),
            hint1: Some("h1".to_string()),
            hint2: Some("h2".to_string()),
            difficulty: Difficulty::Easy,
        }
    }

    fn ms(text: &str, correct: &[&str], extra: &str) -> Question {
        Question {
            question_text: text.to_string(),
            kind: QuestionKind::MultiSelect {
                options: correct
                    .iter()
                    .map(|s| s.to_string())
                    .chain([extra.to_string()])
                    .collect(),
                correct_answers: correct.iter().map(|s| s.to_string()).collect(),
            },
            explanation: String::new(),
            hint1: None,
            hint2: None,
            difficulty: Difficulty::Medium,
        }
    }

    fn short(text: &str, correct: &str) -> Question {
        Question {
            question_text: text.to_string(),
            kind: QuestionKind::ShortAnswer {
                correct_answer: correct.to_string(),
            },
            explanation: String::new(),
            hint1: None,
            hint2: None,
            difficulty: Difficulty::Hard,
        }
    }

    fn hints(entries: &[(usize, u32)]) -> HintsUsed {
        entries
            .iter()
            .map(|&(i, n)| {
                (
                    i,
                    HintFlags {
                        hint1: n >= 1,
                        hint2: n >= 2,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn multiple_choice_is_case_sensitive() {
        assert!(grade_multiple_choice("Option A", "Option A"));
        assert!(!grade_multiple_choice("Option A", "option a"));
        assert!(!grade_multiple_choice("Option A", "Option A "));
    }

    #[test]
    fn multi_select_exact_partial_and_disjoint() {
        let canonical = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        // exact set, order and spacing irrelevant
        assert_eq!(grade_multi_select(&canonical, "C, A,B"), (true, 100.0));
        // no overlap
        assert_eq!(grade_multi_select(&canonical, "D, E"), (false, 0.0));
        // 2 correct, 1 wrong => (2 - 1) / 3
        let (correct, score) = grade_multi_select(&canonical, "A, B, D");
        assert!(!correct);
        assert!((score - 100.0 / 3.0).abs() < 1e-9);
        // more wrong than correct floors at 0
        assert_eq!(grade_multi_select(&canonical, "A, D, E"), (false, 0.0));
        // empty canonical set always scores 0
        assert_eq!(grade_multi_select(&[], ""), (false, 0.0));
    }

    #[test]
    fn hint_multiplier_clamps_at_zero() {
        assert!((hint_multiplier(2, 0.10) - 0.8).abs() < 1e-9);
        assert_eq!(hint_multiplier(10, 0.10), 0.0);
        assert_eq!(hint_multiplier(15, 0.10), 0.0);
    }

    #[tokio::test]
    async fn correct_answer_with_two_hints_scores_eighty_on_exam() {
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        let questions = vec![mc("q", "right", "wrong")];
        let graded = grade_exam(
            &questions,
            &["right".to_string()],
            &hints(&[(0, 2)]),
            &generator,
            &config,
        )
        .await
        .unwrap();
        assert!((graded.results[0].score - 80.0).abs() < 1e-9);
        assert!((graded.score - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn answer_count_mismatch_is_rejected() {
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        let questions = vec![mc("q1", "a", "b"), mc("q2", "a", "b")];
        let result = grade_quiz(
            &questions,
            &["a".to_string()],
            &HintsUsed::new(),
            &generator,
            &config,
        )
        .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn quiz_and_exam_formulas_disagree_on_the_same_input() {
        // q0 answered correctly without hints, q1 answered wrong after using
        // both hints and one more look at hint1 would not change anything:
        // quiz counts all hints into the penalty, the exam only loses the
        // wrong question's points.
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        let questions = vec![mc("q0", "a", "b"), mc("q1", "a", "b")];
        let answers = vec!["a".to_string(), "b".to_string()];
        let used = hints(&[(1, 2)]);

        let quiz = grade_quiz(&questions, &answers, &used, &generator, &config)
            .await
            .unwrap();
        // base 50, penalty 2 * 0.10 / 2 * 100 = 10
        assert!((quiz.score - 40.0).abs() < 1e-9);
        assert!(!quiz.passed);
        assert_eq!(quiz.weak_areas, vec!["q1".to_string()]);

        let exam = grade_exam(&questions, &answers, &used, &generator, &config)
            .await
            .unwrap();
        // (100 + 0) / 2
        assert!((exam.score - 50.0).abs() < 1e-9);
        assert_eq!(exam.correct_count, quiz.correct_count);
        assert!(exam.score != quiz.score);
    }

    #[tokio::test]
    async fn quiz_penalty_floors_at_zero() {
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        let questions = vec![mc("q0", "a", "b")];
        let mut used = HintsUsed::new();
        used.insert(0, HintFlags { hint1: true, hint2: true });
        // wrong answer, two hints: base 0, penalty 20 -> floored to 0
        let graded = grade_quiz(
            &questions,
            &["b".to_string()],
            &used,
            &generator,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(graded.score, 0.0);
    }

    #[tokio::test]
    async fn free_text_uses_ai_score_and_penalty() {
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        generator.insert_response(
            "Grade this student answer",
            serde_json::json!({"score": 80, "feedback": "good reasoning"}),
        );
        let questions = vec![short("explain", "model answer")];
        let graded = grade_exam(
            &questions,
            &["my answer".to_string()],
            &hints(&[(0, 1)]),
            &generator,
            &config,
        )
        .await
        .unwrap();
        // 80 * 0.9 = 72 >= 70 counts as correct
        assert!((graded.results[0].score - 72.0).abs() < 1e-9);
        assert!(graded.results[0].is_correct);
        assert_eq!(graded.results[0].feedback, "good reasoning");
    }

    #[tokio::test]
    async fn free_text_grading_failure_scores_zero_without_aborting() {
        let config = EngineConfig::default();
        let generator = MockGenerator::failing();
        let questions = vec![mc("q0", "a", "b"), short("explain", "model answer")];
        let answers = vec!["a".to_string(), "anything".to_string()];
        let graded = grade_exam(&questions, &answers, &HintsUsed::new(), &generator, &config)
            .await
            .unwrap();
        assert!(graded.results[0].is_correct);
        assert!(!graded.results[1].is_correct);
        assert_eq!(graded.results[1].score, 0.0);
        assert!(graded.results[1].feedback.contains("Grading failed"));
        assert!((graded.score - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn multi_select_partial_credit_feeds_exam_average() {
        let config = EngineConfig::default();
        let generator = MockGenerator::new();
        let questions = vec![ms("pick", &["A", "B"], "C")];
        let graded = grade_exam(
            &questions,
            &["A".to_string()],
            &HintsUsed::new(),
            &generator,
            &config,
        )
        .await
        .unwrap();
        // (1 - 0) / 2 * 100 = 50
        assert!((graded.score - 50.0).abs() < 1e-9);
        assert!(!graded.results[0].is_correct);
    }
}
