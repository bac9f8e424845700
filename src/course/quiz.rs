//! Assessment documents: questions, quizzes and exams.
//!
//! Questions are immutable once stored; a quiz or exam is generated at most
//! once per owning node (keyed upsert in the store). The deterministic
//! fallback builders here keep the learner moving when generation fails.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::utils::now_utc;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One question. The answer key is a tagged variant per question type, so a
/// stored document can never mix, say, a `correctAnswers` array into a
/// multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint2: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    #[serde(rename_all = "camelCase")]
    MultipleChoice {
        options: Vec<String>,
        correct_answer: String,
    },
    #[serde(rename_all = "camelCase")]
    MultiSelect {
        options: Vec<String>,
        correct_answers: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    ShortAnswer { correct_answer: String },
    #[serde(rename_all = "camelCase")]
    Coding { correct_answer: String },
}

impl Question {
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            QuestionKind::MultipleChoice { .. } => "multiple-choice",
            QuestionKind::MultiSelect { .. } => "multi-select",
            QuestionKind::ShortAnswer { .. } => "short-answer",
            QuestionKind::Coding { .. } => "coding",
        }
    }

    pub fn options(&self) -> &[String] {
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. }
            | QuestionKind::MultiSelect { options, .. } => options,
            _ => &[],
        }
    }

    /// Canonical answer as shown back to the learner after an attempt.
    pub fn correct_answer_display(&self) -> String {
        match &self.kind {
            QuestionKind::MultipleChoice { correct_answer, .. }
            | QuestionKind::ShortAnswer { correct_answer }
            | QuestionKind::Coding { correct_answer } => correct_answer.clone(),
            QuestionKind::MultiSelect {
                correct_answers, ..
            } => correct_answers.join(", "),
        }
    }
}

/// A stored quiz (per submodule) or exam (per module); the shapes are
/// identical, only the scoring formula differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
    pub questions: Vec<Question>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn default_passing_score() -> f64 {
    70.0
}

/// Structured-generation target for quizzes and exams; stamped into an
/// [`Assessment`] on storage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAssessment {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
    pub questions: Vec<Question>,
}

impl GeneratedAssessment {
    pub fn into_assessment(self) -> Assessment {
        Assessment {
            title: self.title,
            description: self.description,
            passing_score: self.passing_score,
            questions: self.questions,
            created_at: now_utc(),
        }
    }
}

fn multiple_choice(
    text: &str,
    options: [String; 4],
    explanation: String,
    hint1: &str,
    hint2: &str,
    difficulty: Difficulty,
) -> Question {
    let correct_answer = options[0].clone();
    Question {
        question_text: text.to_string(),
        kind: QuestionKind::MultipleChoice {
            options: options.to_vec(),
            correct_answer,
        },
        explanation,
        hint1: Some(hint1.to_string()),
        hint2: Some(hint2.to_string()),
        difficulty,
    }
}

/// Deterministic quiz used when generation fails for a submodule. The first
/// option of every question is the correct one.
pub fn fallback_quiz(topic: &str, submodule_title: &str) -> Assessment {
    let questions = vec![
        multiple_choice(
            &format!("What is the main purpose of {submodule_title}?"),
            [
                format!("To understand the core concepts of {submodule_title}"),
                "To memorize definitions without understanding".to_string(),
                "To skip ahead to advanced topics".to_string(),
                "None of the above".to_string(),
            ],
            format!(
                "The main goal is to build a solid understanding of {submodule_title} before moving forward."
            ),
            "Think about what you learned in this lesson.",
            "Revisit the lesson introduction.",
            Difficulty::Easy,
        ),
        multiple_choice(
            &format!("Why is understanding {submodule_title} important when learning {topic}?"),
            [
                format!("It forms a foundation for more advanced concepts in {topic}"),
                "It is not important at all".to_string(),
                "It only matters for exams".to_string(),
                "It is optional knowledge".to_string(),
            ],
            format!("{submodule_title} is a key building block in mastering {topic}."),
            "Consider how this lesson connects to the broader course.",
            "Later lessons build on this one.",
            Difficulty::Easy,
        ),
        multiple_choice(
            &format!("Which approach is most effective for learning {submodule_title}?"),
            [
                "Practice and apply concepts through examples".to_string(),
                "Read once and move on".to_string(),
                "Skip the comprehension questions".to_string(),
                "Only look at the summary".to_string(),
            ],
            "Active learning through practice helps reinforce understanding and retention."
                .to_string(),
            "Think about how you learn best.",
            "Passive reading rarely sticks.",
            Difficulty::Easy,
        ),
        multiple_choice(
            &format!("What should you do if you find a concept in {submodule_title} confusing?"),
            [
                "Review the content, use the hints, and ask questions".to_string(),
                "Skip it and hope it makes sense later".to_string(),
                "Give up on the topic".to_string(),
                "Assume it's not important".to_string(),
            ],
            "Taking time to understand confusing concepts builds a stronger foundation."
                .to_string(),
            "Think about effective study strategies.",
            "Hints exist for a reason.",
            Difficulty::Medium,
        ),
        multiple_choice(
            &format!("After completing {submodule_title}, what's the best next step?"),
            [
                "Immediately take the quiz to test understanding".to_string(),
                "Close the app and forget about it".to_string(),
                "Skip to an unrelated topic".to_string(),
                "Only read the flashcards".to_string(),
            ],
            "Testing yourself right after learning helps identify gaps and reinforce knowledge."
                .to_string(),
            "Consider how testing improves learning.",
            "Spaced recall beats cramming.",
            Difficulty::Easy,
        ),
    ];
    Assessment {
        title: format!("Quiz: {submodule_title}"),
        description: "Test your understanding of this lesson".to_string(),
        passing_score: default_passing_score(),
        questions,
        created_at: now_utc(),
    }
}

/// Deterministic exam used when generation fails for a module.
pub fn fallback_exam(module_title: &str, submodule_titles: &[String]) -> Assessment {
    let first_covered = submodule_titles
        .first()
        .cloned()
        .unwrap_or_else(|| "Topic 1".to_string());
    let questions = vec![
        multiple_choice(
            &format!("What is the primary focus of the '{module_title}' module?"),
            [
                format!("Understanding the core concepts of {module_title}"),
                "Memorizing definitions without context".to_string(),
                "Skipping to advanced topics".to_string(),
                "None of the above".to_string(),
            ],
            format!(
                "The module {module_title} is designed to provide a solid foundation in its core concepts."
            ),
            "Think about the main learning objectives of this module.",
            "Consider what the submodules covered.",
            Difficulty::Easy,
        ),
        multiple_choice(
            "Which of the following is covered in this module?",
            [
                first_covered,
                "Unrelated topic".to_string(),
                "Something not in this module".to_string(),
                "None of the above".to_string(),
            ],
            format!("This module covers {}.", submodule_titles.join(", ")),
            "Recall the submodules you studied.",
            "Think about the main topics covered.",
            Difficulty::Easy,
        ),
        multiple_choice(
            "Why is it important to complete all submodules before taking this exam?",
            [
                "To build a complete understanding of the interconnected concepts".to_string(),
                "It's not important".to_string(),
                "Just for extra credit".to_string(),
                "To waste time".to_string(),
            ],
            "Each submodule builds upon previous ones, creating a comprehensive understanding."
                .to_string(),
            "Consider how topics in the module relate to each other.",
            "Think about progressive learning.",
            Difficulty::Easy,
        ),
        multiple_choice(
            &format!("What is the best way to apply what you learned in {module_title}?"),
            [
                "Practice with real-world examples and projects".to_string(),
                "Only read the content once".to_string(),
                "Ignore the comprehension questions".to_string(),
                "Skip to the next module immediately".to_string(),
            ],
            "Applying concepts through practice reinforces learning and builds practical skills."
                .to_string(),
            "Think about effective learning strategies.",
            "Consider how professionals learn new skills.",
            Difficulty::Medium,
        ),
    ];
    Assessment {
        title: format!("Module Exam: {module_title}"),
        description: format!("Comprehensive assessment of {module_title}"),
        passing_score: default_passing_score(),
        questions,
        created_at: now_utc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_kind_tags_match_wire_format() {
        let q = Question {
            question_text: "Pick two".to_string(),
            kind: QuestionKind::MultiSelect {
                options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                correct_answers: vec!["a".to_string(), "b".to_string()],
            },
            explanation: String::new(),
            hint1: None,
            hint2: None,
            difficulty: Difficulty::Hard,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["type"], "multi-select");
        assert_eq!(json["correctAnswers"][0], "a");
        assert_eq!(json["difficulty"], "hard");

        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back.type_name(), "multi-select");
        assert_eq!(back.correct_answer_display(), "a, b");
    }

    #[test]
    fn short_answer_parses_from_stored_shape() {
        let json = serde_json::json!({
            "questionText": "Explain borrowing",
            "type": "short-answer",
            "correctAnswer": "References without ownership",
            "explanation": "See chapter 4",
            "hint1": "Think &T"
        });
        let q: Question = serde_json::from_value(json).unwrap();
        assert_eq!(q.type_name(), "short-answer");
        assert_eq!(q.options(), &[] as &[String]);
        assert_eq!(q.hint2, None);
    }

    #[test]
    fn fallback_quiz_is_answerable_by_first_option() {
        let quiz = fallback_quiz("Rust", "Ownership");
        assert_eq!(quiz.questions.len(), 5);
        for q in &quiz.questions {
            assert_eq!(q.correct_answer_display(), q.options()[0]);
        }
        assert_eq!(quiz.passing_score, 70.0);
    }

    #[test]
    fn fallback_exam_mentions_covered_submodules() {
        let exam = fallback_exam(
            "Ownership",
            &["Moves".to_string(), "Borrows".to_string()],
        );
        assert_eq!(exam.questions.len(), 4);
        assert!(exam.questions[1].options().contains(&"Moves".to_string()));
    }
}
