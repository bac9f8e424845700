//! Remediation policy.
//!
//! Two idempotent triggers (guarded by flags on the progress records, which
//! the engine flips only after the insertion here has been persisted):
//! a remedial submodule spliced in after the first failed quiz, and a
//! remedial module inserted after repeated exam failure. A third, advisory
//! check watches the module-wide average and only ever logs.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::progress::{ModuleProgress, SubmoduleProgress};
use crate::config::EngineConfig;
use crate::course::content::{LegacyContent, LessonBody, SubmoduleContent, Topic, TopicsContent};
use crate::course::{Course, LifecycleStatus, Module, Submodule, new_id};
use crate::error::{Error, Result};
use crate::generator::{
    ContentGenerator, generate_as, remedial_content_prompt, remedial_module_prompt,
};

/// Structured-generation target for a full remedial module.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRemedialModule {
    pub module_title: String,
    #[serde(default)]
    pub description: String,
    pub sub_modules: Vec<GeneratedRemedialSubmodule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRemedialSubmodule {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub practice_questions: Vec<PracticeQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQuestion {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Advisory verdict of the module-wide health check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModuleHealth {
    /// Not every non-remedial submodule has a scored attempt yet.
    NotReady,
    Healthy { average: f64 },
    RemediationCandidate { average: f64 },
}

pub struct RemediationPolicy {
    config: EngineConfig,
    generator: Arc<dyn ContentGenerator>,
    /// Model label recorded in the AI metadata of generated lessons.
    model: Option<String>,
}

impl RemediationPolicy {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn ContentGenerator>,
        model: Option<String>,
    ) -> Self {
        Self {
            config,
            generator,
            model,
        }
    }

    /// Synthesize a review lesson and splice it in immediately after the
    /// failed submodule. Generation failure degrades to a deterministic
    /// fallback lesson, so this path always yields an insertion; the caller
    /// persists the course and only then sets the guard flag.
    pub async fn remedial_submodule(
        &self,
        course: &mut Course,
        module_id: &str,
        failed_sub_module_id: &str,
        weak_areas: &[String],
    ) -> Result<(Submodule, SubmoduleContent)> {
        let module_index = course
            .module_position(module_id)
            .ok_or_else(|| Error::not_found("module", module_id))?;
        let sub_index = course.modules[module_index]
            .submodule_position(failed_sub_module_id)
            .ok_or_else(|| Error::not_found("submodule", failed_sub_module_id))?;
        let failed = course.modules[module_index].sub_modules[sub_index].clone();

        let fallback_areas = [failed.title.clone()];
        let areas: &[String] = if weak_areas.is_empty() {
            &fallback_areas
        } else {
            weak_areas
        };
        let prompt = remedial_content_prompt(&failed.title, areas, &course.learner_level);
        let body = match generate_as::<TopicsContent>(self.generator.as_ref(), &prompt).await {
            Ok(content) => LessonBody::Topics(content),
            Err(e) => {
                warn!(
                    submodule = %failed.title,
                    "remedial lesson generation failed, using fallback: {e}"
                );
                fallback_remedial_lesson(&failed.title, &course.topic)
            }
        };

        let remedial = Submodule {
            sub_module_id: new_id(),
            title: format!("Review: {}", failed.title),
            description: format!(
                "A focused, step-by-step review of {} with simpler explanations.",
                failed.title
            ),
            // display only; splicing renumbers nothing
            order_index: failed.order_index,
            content_status: LifecycleStatus::Ready,
            quiz_status: LifecycleStatus::Pending,
            locked: false,
            unlocked_at: Some(crate::utils::now_utc()),
            is_remedial: true,
            related_to_sub_module_id: Some(failed.sub_module_id.clone()),
        };
        let content = SubmoduleContent::new(
            &course.id,
            module_id,
            &remedial.sub_module_id,
            body,
        )
        .remedial(self.model.as_deref());

        course.modules[module_index]
            .sub_modules
            .insert(sub_index + 1, remedial.clone());
        Ok((remedial, content))
    }

    /// Synthesize a full review module and insert it immediately after the
    /// failed one. Generation failure propagates: nothing is inserted, the
    /// guard flag stays unset and the next failing attempt retries.
    pub async fn remedial_module(
        &self,
        course: &mut Course,
        module_id: &str,
        module_progress: &ModuleProgress,
    ) -> Result<(Module, Vec<SubmoduleContent>)> {
        let module_index = course
            .module_position(module_id)
            .ok_or_else(|| Error::not_found("module", module_id))?;
        let original = &course.modules[module_index];

        let failed_topics = vec![original.title.clone()];
        let wrong_answers = module_progress.wrong_question_texts(10);
        let prompt = remedial_module_prompt(&original.title, &failed_topics, &wrong_answers);
        let generated =
            generate_as::<GeneratedRemedialModule>(self.generator.as_ref(), &prompt).await?;

        let remedial_module_id = new_id();
        let mut sub_modules = Vec::with_capacity(generated.sub_modules.len());
        let mut contents = Vec::with_capacity(generated.sub_modules.len());
        for (i, sub) in generated.sub_modules.into_iter().enumerate() {
            let sub_module_id = new_id();
            sub_modules.push(Submodule {
                sub_module_id: sub_module_id.clone(),
                title: sub.title.clone(),
                description: sub.description.clone(),
                order_index: (i + 1) as u32,
                content_status: LifecycleStatus::Ready,
                quiz_status: LifecycleStatus::Pending,
                locked: false,
                unlocked_at: Some(crate::utils::now_utc()),
                is_remedial: true,
                related_to_sub_module_id: None,
            });
            let body = LessonBody::Topics(TopicsContent {
                introduction: sub.description,
                topics: vec![Topic {
                    title: sub.title,
                    content: render_with_practice(&sub.content, &sub.practice_questions),
                    comprehension_question: None,
                    flashcards: Vec::new(),
                }],
                summary: String::new(),
                real_world_applications: Vec::new(),
            });
            contents.push(
                SubmoduleContent::new(&course.id, &remedial_module_id, &sub_module_id, body)
                    .remedial(self.model.as_deref()),
            );
        }

        let remedial = Module {
            module_id: remedial_module_id,
            title: generated.module_title,
            description: format!(
                "Personalized review module to help you master the content from {}",
                original.title
            ),
            exam_status: LifecycleStatus::Pending,
            locked: false,
            unlocked_at: Some(crate::utils::now_utc()),
            is_remedial: true,
            parent_module_id: Some(module_id.to_string()),
            sub_modules,
        };
        course.modules.insert(module_index + 1, remedial.clone());
        info!(
            module = %remedial.title,
            submodules = remedial.sub_modules.len(),
            "inserted remedial module"
        );
        Ok((remedial, contents))
    }

    /// Advisory module-health check: once every non-remedial submodule has a
    /// scored attempt, flag the module when the mean best score is below the
    /// configured threshold and no remedial module exists yet. Decision
    /// point only — this never calls the generator.
    pub fn module_health(
        &self,
        course: &Course,
        module_id: &str,
        progresses: &[SubmoduleProgress],
    ) -> ModuleHealth {
        let Some(module) = course.find_module(module_id) else {
            return ModuleHealth::NotReady;
        };
        let non_remedial: Vec<&Submodule> = module
            .sub_modules
            .iter()
            .filter(|s| !s.is_remedial)
            .collect();
        if non_remedial.is_empty() {
            return ModuleHealth::NotReady;
        }
        let mut total = 0.0;
        let mut scored = 0usize;
        for sub in &non_remedial {
            if let Some(progress) = progresses
                .iter()
                .find(|p| p.sub_module_id == sub.sub_module_id)
            {
                if progress.best_test_score > 0.0 {
                    total += progress.best_test_score;
                    scored += 1;
                }
            }
        }
        if scored < non_remedial.len() {
            return ModuleHealth::NotReady;
        }
        let average = total / scored as f64;
        let has_remedial = course
            .modules
            .iter()
            .any(|m| m.is_remedial && m.parent_module_id.as_deref() == Some(module_id));
        if average < self.config.module_health_threshold && !has_remedial {
            info!(
                module = %module.title,
                average,
                threshold = self.config.module_health_threshold,
                auto = self.config.auto_remediate_weak_modules,
                "module average below threshold; remediation candidate"
            );
            return ModuleHealth::RemediationCandidate { average };
        }
        ModuleHealth::Healthy { average }
    }
}

fn render_with_practice(content: &str, practice: &[PracticeQuestion]) -> String {
    if practice.is_empty() {
        return content.to_string();
    }
    let mut out = String::from(content);
    out.push_str("\n\n## Practice\n");
    for q in practice {
        out.push_str(&format!("\n**{}**\n\n{}\n", q.question, q.answer));
        if !q.explanation.is_empty() {
            out.push_str(&format!("\n_{}_\n", q.explanation));
        }
    }
    out
}

/// Deterministic review lesson used when generation fails; written in the
/// legacy content shape.
fn fallback_remedial_lesson(submodule_title: &str, topic: &str) -> LessonBody {
    LessonBody::Legacy(LegacyContent {
        summary: format!(
            "Let's take a fresh look at {submodule_title}. This time we slow way down and \
             explain everything step by step. Understanding takes time, and a different \
             approach often makes all the difference."
        ),
        detailed_explanation: format!(
            "# {submodule_title} - Simplified\n\n\
             ## What is This About?\n\n\
             {submodule_title} is a fundamental concept in {topic}. Let's break it down into \
             simple terms.\n\n\
             ## Step-by-Step Breakdown\n\n\
             **Step 1: Start Simple** - begin with the most basic example.\n\n\
             **Step 2: Build Understanding** - add one small piece at a time.\n\n\
             **Step 3: Practice** - write your own examples, even simple ones.\n\n\
             **Step 4: Connect the Dots** - relate this to things you already know.\n\n\
             ## Common Mistakes to Avoid\n\n\
             1. **Rushing ahead** - take your time with each concept\n\
             2. **Memorizing without understanding** - focus on *why*, not just *how*\n\
             3. **Skipping practice** - hands-on experience is crucial\n\n\
             ## What To Do Next\n\n\
             Read through this lesson slowly, try the examples yourself, and review until \
             comfortable before retaking the quiz."
        ),
        key_takeaways: vec![
            format!("Understanding {submodule_title} unlocks the lessons that follow"),
            "Take your time - rushing leads to confusion".to_string(),
            "Practice with simple examples before complex ones".to_string(),
            "Focus on understanding WHY, not just HOW".to_string(),
        ],
        examples: vec![
            "Start with the simplest possible example and build from there".to_string(),
            "Try modifying working examples to see what happens".to_string(),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::outline_fixture;
    use crate::engine::progression::unlock_first;
    use crate::generator::MockGenerator;

    fn course() -> Course {
        let mut course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        unlock_first(&mut course);
        course
    }

    fn policy(generator: MockGenerator) -> RemediationPolicy {
        RemediationPolicy::new(EngineConfig::default(), Arc::new(generator), None)
    }

    fn generated_lesson() -> serde_json::Value {
        serde_json::json!({
            "introduction": "Tricky topic, new angle.",
            "topics": [{"title": "Again, slower", "content": "step by step"}],
            "summary": "You got this."
        })
    }

    #[tokio::test]
    async fn remedial_submodule_is_spliced_right_after_the_failure() {
        let generator = MockGenerator::new();
        generator.insert_response("struggling with", generated_lesson());
        let policy = policy(generator);
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let failed = course.modules[0].sub_modules[0].sub_module_id.clone();

        let (remedial, content) = policy
            .remedial_submodule(&mut course, &module_id, &failed, &["q1".to_string()])
            .await
            .unwrap();

        let titles: Vec<&str> = course.modules[0]
            .sub_modules
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec!["Hello, Cargo", "Review: Hello, Cargo", "Variables and Types"]
        );
        assert!(remedial.is_remedial);
        assert!(!remedial.locked);
        assert_eq!(remedial.related_to_sub_module_id.as_deref(), Some(failed.as_str()));
        // indices were not renumbered
        assert_eq!(course.modules[0].sub_modules[2].order_index, 2);
        assert!(content.is_remedial);
        assert!(matches!(content.text_content, LessonBody::Topics(_)));
    }

    #[tokio::test]
    async fn remedial_submodule_generation_failure_uses_fallback_lesson() {
        let policy = policy(MockGenerator::failing());
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let failed = course.modules[0].sub_modules[0].sub_module_id.clone();

        let (_, content) = policy
            .remedial_submodule(&mut course, &module_id, &failed, &[])
            .await
            .unwrap();
        assert_eq!(course.modules[0].sub_modules.len(), 3);
        assert!(matches!(content.text_content, LessonBody::Legacy(_)));
    }

    #[tokio::test]
    async fn remedial_module_is_inserted_after_the_original() {
        let generator = MockGenerator::new();
        generator.insert_response(
            "targeted review module",
            serde_json::json!({
                "moduleTitle": "Mastering Getting Started - A Fresh Approach",
                "description": "Back to basics",
                "subModules": [
                    {"title": "Cargo, again", "content": "lesson text",
                     "practiceQuestions": [{"question": "q", "answer": "a", "explanation": "e"}]},
                    {"title": "Types, again", "content": "more text"}
                ]
            }),
        );
        let policy = policy(generator);
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let progress = ModuleProgress::new("user-1", &course.id, &module_id);

        let (remedial, contents) = policy
            .remedial_module(&mut course, &module_id, &progress)
            .await
            .unwrap();

        assert_eq!(course.modules.len(), 3);
        assert_eq!(course.modules[1].module_id, remedial.module_id);
        assert!(course.modules[1].is_remedial);
        assert_eq!(
            course.modules[1].parent_module_id.as_deref(),
            Some(module_id.as_str())
        );
        assert_eq!(contents.len(), 2);
        match &contents[0].text_content {
            LessonBody::Topics(t) => assert!(t.topics[0].content.contains("## Practice")),
            _ => panic!("expected topics body"),
        }
    }

    #[tokio::test]
    async fn remedial_module_generation_failure_inserts_nothing() {
        let policy = policy(MockGenerator::failing());
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let progress = ModuleProgress::new("user-1", &course.id, &module_id);

        let result = policy.remedial_module(&mut course, &module_id, &progress).await;
        assert!(matches!(result, Err(Error::Generation(_))));
        assert_eq!(course.modules.len(), 2);
    }

    #[test]
    fn module_health_waits_for_full_coverage_then_flags_low_averages() {
        let policy = policy(MockGenerator::new());
        let course = course();
        let module_id = course.modules[0].module_id.clone();
        let sub_ids: Vec<String> = course.modules[0]
            .sub_modules
            .iter()
            .map(|s| s.sub_module_id.clone())
            .collect();

        let mut first = SubmoduleProgress::new("user-1", &course.id, &module_id, &sub_ids[0]);
        first.best_test_score = 40.0;
        assert_eq!(
            policy.module_health(&course, &module_id, &[first.clone()]),
            ModuleHealth::NotReady
        );

        let mut second = SubmoduleProgress::new("user-1", &course.id, &module_id, &sub_ids[1]);
        second.best_test_score = 45.0;
        assert_eq!(
            policy.module_health(&course, &module_id, &[first.clone(), second.clone()]),
            ModuleHealth::RemediationCandidate { average: 42.5 }
        );

        second.best_test_score = 90.0;
        assert_eq!(
            policy.module_health(&course, &module_id, &[first, second]),
            ModuleHealth::Healthy { average: 65.0 }
        );
    }
}
