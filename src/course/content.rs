//! Lesson content documents.
//!
//! Two stored shapes exist in the wild: the current `topics[]` layout and the
//! older flat `summary`/`detailedExplanation` layout that generation
//! fallbacks still produce. Both are modeled explicitly; readers prefer
//! `Topics` and degrade a `Legacy` body to a single summary concept card.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::utils::now_utc;

/// Stored lesson content for one submodule, keyed by (course, submodule).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmoduleContent {
    pub course_id: String,
    pub module_id: String,
    pub sub_module_id: String,
    pub text_content: LessonBody,
    #[serde(default)]
    pub is_remedial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<AiMetadata>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SubmoduleContent {
    pub fn new(course_id: &str, module_id: &str, sub_module_id: &str, body: LessonBody) -> Self {
        Self {
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
            sub_module_id: sub_module_id.to_string(),
            text_content: body,
            is_remedial: false,
            ai_metadata: None,
            created_at: now_utc(),
        }
    }

    pub fn remedial(mut self, model: Option<&str>) -> Self {
        self.is_remedial = true;
        self.ai_metadata = model.map(|m| AiMetadata {
            model_used: m.to_string(),
            generated_at: now_utc(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMetadata {
    pub model_used: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// The two content-format generations. Untagged: a document with
/// `introduction` + `topics` parses as `Topics`, anything else falls back to
/// `Legacy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LessonBody {
    Topics(TopicsContent),
    Legacy(LegacyContent),
}

impl LessonBody {
    /// Short plain-text form used when building generation prompts.
    pub fn summary_text(&self, limit: usize) -> String {
        let mut out = String::new();
        match self {
            LessonBody::Topics(content) => {
                for topic in content.topics.iter().take(5) {
                    let snippet: String = topic.content.chars().take(300).collect();
                    out.push_str(&format!("- {}: {}...\n", topic.title, snippet));
                }
                if out.is_empty() {
                    out = content.summary.clone();
                }
            }
            LessonBody::Legacy(content) => {
                out = content.summary.clone();
            }
        }
        out.chars().take(limit).collect()
    }
}

/// Current content layout, also the structured-generation target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicsContent {
    pub introduction: String,
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub real_world_applications: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comprehension_question: Option<ComprehensionQuestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flashcards: Vec<FlashcardSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensionQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSeed {
    pub front: String,
    pub back: String,
}

/// Pre-`topics[]` layout; still written by deterministic fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyContent {
    pub summary: String,
    pub detailed_explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_takeaways: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FlashcardKind {
    Definition,
    Question,
    Concept,
}

/// A study card surfaced by the flashcards endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    #[serde(rename = "type")]
    pub kind: FlashcardKind,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub submodule: String,
}

/// Extract study cards from one submodule's content: topic flashcards, then
/// comprehension questions as quiz cards; a legacy body contributes its
/// summary as a single concept card.
pub fn flashcards_from(body: &LessonBody, submodule_title: &str) -> Vec<Flashcard> {
    let mut cards = Vec::new();
    match body {
        LessonBody::Topics(content) => {
            for topic in &content.topics {
                for seed in &topic.flashcards {
                    if seed.front.is_empty() || seed.back.is_empty() {
                        continue;
                    }
                    cards.push(Flashcard {
                        kind: FlashcardKind::Definition,
                        front: seed.front.clone(),
                        back: seed.back.clone(),
                        options: Vec::new(),
                        correct_answer: None,
                        hint: None,
                        submodule: submodule_title.to_string(),
                    });
                }
                if let Some(question) = &topic.comprehension_question {
                    if !question.question.is_empty() {
                        cards.push(Flashcard {
                            kind: FlashcardKind::Question,
                            front: question.question.clone(),
                            back: question.correct_answer.clone(),
                            options: question.options.clone(),
                            correct_answer: Some(question.correct_answer.clone()),
                            hint: (!question.hint.is_empty()).then(|| question.hint.clone()),
                            submodule: submodule_title.to_string(),
                        });
                    }
                }
            }
        }
        LessonBody::Legacy(content) => {
            if !content.summary.is_empty() {
                cards.push(Flashcard {
                    kind: FlashcardKind::Concept,
                    front: submodule_title.to_string(),
                    back: content.summary.clone(),
                    options: Vec::new(),
                    correct_answer: None,
                    hint: None,
                    submodule: submodule_title.to_string(),
                });
            }
        }
    }
    cards
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics_body() -> LessonBody {
        LessonBody::Topics(TopicsContent {
            introduction: "intro".to_string(),
            topics: vec![Topic {
                title: "Borrowing".to_string(),
                content: "References never outlive their referent.".to_string(),
                comprehension_question: Some(ComprehensionQuestion {
                    question: "What does &T mean?".to_string(),
                    options: vec!["shared borrow".to_string(), "move".to_string()],
                    correct_answer: "shared borrow".to_string(),
                    hint: "No ownership transfer.".to_string(),
                }),
                flashcards: vec![FlashcardSeed {
                    front: "&mut T".to_string(),
                    back: "unique borrow".to_string(),
                }],
            }],
            summary: "Borrowing basics".to_string(),
            real_world_applications: vec![],
        })
    }

    #[test]
    fn topics_body_yields_flashcards_and_quiz_cards() {
        let cards = flashcards_from(&topics_body(), "Borrowing 101");
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].kind, FlashcardKind::Definition);
        assert_eq!(cards[1].kind, FlashcardKind::Question);
        assert_eq!(cards[1].correct_answer.as_deref(), Some("shared borrow"));
    }

    #[test]
    fn legacy_body_falls_back_to_summary_card() {
        let body = LessonBody::Legacy(LegacyContent {
            summary: "Ownership moves values.".to_string(),
            detailed_explanation: "Long form.".to_string(),
            key_takeaways: vec![],
            examples: vec![],
        });
        let cards = flashcards_from(&body, "Ownership");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].kind, FlashcardKind::Concept);
        assert_eq!(cards[0].back, "Ownership moves values.");
    }

    #[test]
    fn untagged_body_prefers_topics_then_legacy() {
        let topics = serde_json::json!({
            "introduction": "i",
            "topics": [{"title": "t", "content": "c"}],
            "summary": "s"
        });
        assert!(matches!(
            serde_json::from_value::<LessonBody>(topics).unwrap(),
            LessonBody::Topics(_)
        ));
        let legacy = serde_json::json!({
            "summary": "s",
            "detailedExplanation": "d"
        });
        assert!(matches!(
            serde_json::from_value::<LessonBody>(legacy).unwrap(),
            LessonBody::Legacy(_)
        ));
    }
}
