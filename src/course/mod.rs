pub mod content;
pub mod quiz;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::utils::now_utc;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Lifecycle of a generated artifact (lesson content, quiz, exam).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Pending,
    Generating,
    Ready,
    Failed,
}

/// Root aggregate. The course document exclusively owns its modules and
/// their submodules; progress records live outside it and survive content
/// regeneration. The current-position pointers always reference an unlocked
/// node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Learner proficiency used in generation prompts; classification itself
    /// is an external concern.
    #[serde(default = "default_level")]
    pub learner_level: String,
    #[serde(default)]
    pub status: CourseStatus,
    #[serde(default)]
    pub current_module_id: Option<String>,
    #[serde(default)]
    pub current_sub_module_id: Option<String>,
    pub modules: Vec<Module>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn default_level() -> String {
    "Intermediate".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exam_status: LifecycleStatus,
    pub locked: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlocked_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_remedial: bool,
    /// Weak reference to the module this one remediates: an identifier to
    /// look up, never a traversable pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_module_id: Option<String>,
    pub sub_modules: Vec<Submodule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submodule {
    pub sub_module_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 1-based, contiguous at creation time. Display only: remedial
    /// insertion renumbers nothing, sequencing is list position.
    pub order_index: u32,
    #[serde(default)]
    pub content_status: LifecycleStatus,
    #[serde(default)]
    pub quiz_status: LifecycleStatus,
    pub locked: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlocked_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_remedial: bool,
    /// Weak reference to the submodule whose failure produced this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_to_sub_module_id: Option<String>,
}

impl Submodule {
    /// Locked -> unlocked happens exactly once; re-unlocking an already
    /// unlocked node keeps its original timestamp.
    pub fn unlock(&mut self) {
        if self.locked {
            self.locked = false;
            self.unlocked_at = Some(now_utc());
        }
    }
}

impl Module {
    pub fn unlock(&mut self) {
        if self.locked {
            self.locked = false;
            self.unlocked_at = Some(now_utc());
        }
    }

    pub fn find_submodule(&self, sub_module_id: &str) -> Option<&Submodule> {
        self.sub_modules
            .iter()
            .find(|s| s.sub_module_id == sub_module_id)
    }

    pub fn find_submodule_mut(&mut self, sub_module_id: &str) -> Option<&mut Submodule> {
        self.sub_modules
            .iter_mut()
            .find(|s| s.sub_module_id == sub_module_id)
    }

    pub fn submodule_position(&self, sub_module_id: &str) -> Option<usize> {
        self.sub_modules
            .iter()
            .position(|s| s.sub_module_id == sub_module_id)
    }
}

impl Course {
    pub fn find_module(&self, module_id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    pub fn find_module_mut(&mut self, module_id: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.module_id == module_id)
    }

    pub fn module_position(&self, module_id: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.module_id == module_id)
    }

    pub fn require_module(&self, module_id: &str) -> Result<&Module> {
        self.find_module(module_id)
            .ok_or_else(|| Error::not_found("module", module_id))
    }

    pub fn require_submodule(&self, module_id: &str, sub_module_id: &str) -> Result<&Submodule> {
        self.require_module(module_id)?
            .find_submodule(sub_module_id)
            .ok_or_else(|| Error::not_found("submodule", sub_module_id))
    }

    /// Assemble a course from an already-generated curriculum outline.
    /// Every node starts locked; `unlock_first` opens the entry point.
    pub fn from_outline(user_id: &str, topic: &str, learner_level: &str, outline: CurriculumOutline) -> Course {
        let now = now_utc();
        let modules = outline
            .modules
            .into_iter()
            .map(|m| Module {
                module_id: new_id(),
                title: m.title,
                description: m.description,
                exam_status: LifecycleStatus::Pending,
                locked: true,
                unlocked_at: None,
                is_remedial: false,
                parent_module_id: None,
                sub_modules: m
                    .submodules
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| Submodule {
                        sub_module_id: new_id(),
                        title: s.title,
                        description: s.description,
                        order_index: (i + 1) as u32,
                        content_status: LifecycleStatus::Pending,
                        quiz_status: LifecycleStatus::Pending,
                        locked: true,
                        unlocked_at: None,
                        is_remedial: false,
                        related_to_sub_module_id: None,
                    })
                    .collect(),
            })
            .collect();
        Course {
            id: new_id(),
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            title: outline.title,
            description: outline.description,
            learner_level: learner_level.to_string(),
            status: CourseStatus::NotStarted,
            current_module_id: None,
            current_sub_module_id: None,
            modules,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Curriculum outline as produced by the (external) curriculum generator.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub submodules: Vec<SubmoduleOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmoduleOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
pub(crate) fn outline_fixture() -> CurriculumOutline {
    CurriculumOutline {
        title: "Rust Fundamentals".to_string(),
        description: "From zero to ownership".to_string(),
        modules: vec![
            ModuleOutline {
                title: "Getting Started".to_string(),
                description: "Toolchain and syntax".to_string(),
                submodules: vec![
                    SubmoduleOutline {
                        title: "Hello, Cargo".to_string(),
                        description: "Projects and builds".to_string(),
                    },
                    SubmoduleOutline {
                        title: "Variables and Types".to_string(),
                        description: "Bindings, shadowing, scalars".to_string(),
                    },
                ],
            },
            ModuleOutline {
                title: "Ownership".to_string(),
                description: "Moves, borrows, lifetimes".to_string(),
                submodules: vec![SubmoduleOutline {
                    title: "Moves and Copies".to_string(),
                    description: "Value semantics".to_string(),
                }],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_builds_locked_course_with_contiguous_indices() {
        let course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        assert_eq!(course.status, CourseStatus::NotStarted);
        assert_eq!(course.modules.len(), 2);
        for module in &course.modules {
            assert!(module.locked);
            for (i, sub) in module.sub_modules.iter().enumerate() {
                assert!(sub.locked);
                assert_eq!(sub.order_index, (i + 1) as u32);
            }
        }
    }

    #[test]
    fn unlock_is_one_way_and_keeps_first_timestamp() {
        let mut course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        let sub = &mut course.modules[0].sub_modules[0];
        sub.unlock();
        let first = sub.unlocked_at;
        assert!(!sub.locked);
        assert!(first.is_some());
        sub.unlock();
        assert_eq!(sub.unlocked_at, first);
    }

    #[test]
    fn course_document_round_trips() {
        let course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        let json = serde_json::to_string(&course).unwrap();
        let back: Course = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, course.id);
        assert_eq!(back.modules[0].sub_modules.len(), 2);
        // stored documents use the camelCase field names
        assert!(json.contains("\"subModules\""));
        assert!(json.contains("\"orderIndex\""));
    }
}
