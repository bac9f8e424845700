//! Lock/unlock state machine over the curriculum.
//!
//! A strict linear walk: submodules in list order within a module, modules in
//! list order within the course. Remedial nodes are spliced into those lists
//! and need no special casing. Locks only ever open (locked -> unlocked,
//! exactly once); a failed assessment never re-locks anything. All functions
//! mutate the in-memory course only; persisting the updated document is the
//! caller's one atomic write.

use serde::{Deserialize, Serialize};

use crate::course::{Course, CourseStatus};
use crate::error::{Error, Result};

/// The node a successful assessment just unlocked.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NextNode {
    pub module_id: String,
    pub sub_module_id: String,
    pub title: String,
    /// True when the walk crossed into the following module.
    pub new_module: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_title: Option<String>,
}

/// Open the entry point of a freshly created course: the first module and its
/// first submodule. Everything else stays locked.
pub fn unlock_first(course: &mut Course) {
    let Some(module) = course.modules.first_mut() else {
        return;
    };
    module.unlock();
    let module_id = module.module_id.clone();
    if let Some(sub) = module.sub_modules.first_mut() {
        sub.unlock();
        course.current_sub_module_id = Some(sub.sub_module_id.clone());
    }
    course.current_module_id = Some(module_id);
}

/// Advance after a passed submodule quiz: unlock the next submodule in the
/// same module, or the first submodule of the next module, or signal course
/// completion with `None`.
pub fn advance(course: &mut Course, module_id: &str, sub_module_id: &str) -> Result<Option<NextNode>> {
    let module_index = course
        .module_position(module_id)
        .ok_or_else(|| Error::not_found("module", module_id))?;
    let sub_index = course.modules[module_index]
        .submodule_position(sub_module_id)
        .ok_or_else(|| Error::not_found("submodule", sub_module_id))?;

    let module = &mut course.modules[module_index];
    if sub_index + 1 < module.sub_modules.len() {
        let next = &mut module.sub_modules[sub_index + 1];
        next.unlock();
        let node = NextNode {
            module_id: module_id.to_string(),
            sub_module_id: next.sub_module_id.clone(),
            title: next.title.clone(),
            new_module: false,
            module_title: None,
        };
        course.status = CourseStatus::InProgress;
        course.current_module_id = Some(node.module_id.clone());
        course.current_sub_module_id = Some(node.sub_module_id.clone());
        return Ok(Some(node));
    }

    Ok(enter_module_after(course, module_index))
}

/// Advance after a passed module exam: unlock the next module's first
/// submodule if one exists. Marking the passed module's submodules as
/// content-completed is the caller's concern (it touches progress records,
/// not the course document).
pub fn advance_module(course: &mut Course, module_id: &str) -> Result<Option<NextNode>> {
    let module_index = course
        .module_position(module_id)
        .ok_or_else(|| Error::not_found("module", module_id))?;
    Ok(enter_module_after(course, module_index))
}

fn enter_module_after(course: &mut Course, module_index: usize) -> Option<NextNode> {
    let next_module = course.modules.get_mut(module_index + 1);
    let node = next_module.and_then(|module| {
        let module_id = module.module_id.clone();
        let module_title = module.title.clone();
        let node = module.sub_modules.first_mut().map(|sub| {
            sub.unlock();
            NextNode {
                module_id,
                sub_module_id: sub.sub_module_id.clone(),
                title: sub.title.clone(),
                new_module: true,
                module_title: Some(module_title),
            }
        });
        // a module with nothing to learn is never opened
        if node.is_some() {
            module.unlock();
        }
        node
    });
    match &node {
        Some(node) => {
            course.status = CourseStatus::InProgress;
            course.current_module_id = Some(node.module_id.clone());
            course.current_sub_module_id = Some(node.sub_module_id.clone());
        }
        None => course.status = CourseStatus::Completed,
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::{Course, outline_fixture};

    fn course() -> Course {
        let mut course = Course::from_outline("user-1", "Rust", "Beginner", outline_fixture());
        unlock_first(&mut course);
        course
    }

    fn lock_states(course: &Course) -> Vec<bool> {
        course
            .modules
            .iter()
            .flat_map(|m| m.sub_modules.iter().map(|s| s.locked))
            .collect()
    }

    #[test]
    fn unlock_first_opens_only_the_entry_point() {
        let course = course();
        assert!(!course.modules[0].locked);
        assert_eq!(lock_states(&course), vec![false, true, true]);
        assert_eq!(
            course.current_sub_module_id.as_deref(),
            Some(course.modules[0].sub_modules[0].sub_module_id.as_str())
        );
    }

    #[test]
    fn advance_unlocks_only_the_next_submodule() {
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let first = course.modules[0].sub_modules[0].sub_module_id.clone();

        let next = advance(&mut course, &module_id, &first).unwrap().unwrap();
        assert!(!next.new_module);
        assert_eq!(next.sub_module_id, course.modules[0].sub_modules[1].sub_module_id);
        // the passed node stays unlocked, nothing else changed
        assert_eq!(lock_states(&course), vec![false, false, true]);
        assert_eq!(course.status, CourseStatus::InProgress);
        assert_eq!(course.current_sub_module_id, Some(next.sub_module_id));
    }

    #[test]
    fn advance_crosses_into_the_next_module() {
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let last = course.modules[0].sub_modules[1].sub_module_id.clone();

        let next = advance(&mut course, &module_id, &last).unwrap().unwrap();
        assert!(next.new_module);
        assert_eq!(next.module_id, course.modules[1].module_id);
        assert_eq!(next.module_title.as_deref(), Some("Ownership"));
        assert!(!course.modules[1].locked);
        assert!(!course.modules[1].sub_modules[0].locked);
    }

    #[test]
    fn advancing_past_the_last_module_completes_the_course() {
        let mut course = course();
        let module_id = course.modules[1].module_id.clone();
        let sub_id = course.modules[1].sub_modules[0].sub_module_id.clone();

        let next = advance(&mut course, &module_id, &sub_id).unwrap();
        assert!(next.is_none());
        assert_eq!(course.status, CourseStatus::Completed);
    }

    #[test]
    fn advance_reports_missing_nodes_without_mutation() {
        let mut course = course();
        let before = lock_states(&course);
        let module_id = course.modules[0].module_id.clone();

        assert!(advance(&mut course, "nope", "also-nope").is_err());
        assert!(advance(&mut course, &module_id, "nope").is_err());
        assert_eq!(lock_states(&course), before);
    }

    #[test]
    fn advance_module_unlocks_the_following_module() {
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();

        let next = advance_module(&mut course, &module_id).unwrap().unwrap();
        assert!(next.new_module);
        assert_eq!(next.module_id, course.modules[1].module_id);

        let last = course.modules[1].module_id.clone();
        assert!(advance_module(&mut course, &last).unwrap().is_none());
        assert_eq!(course.status, CourseStatus::Completed);
    }

    #[test]
    fn spliced_remedial_submodule_is_walked_like_any_other() {
        use crate::course::Submodule;
        let mut course = course();
        let module_id = course.modules[0].module_id.clone();
        let failed = course.modules[0].sub_modules[0].sub_module_id.clone();
        let remedial = Submodule {
            sub_module_id: "remedial-1".to_string(),
            title: "Review: Hello, Cargo".to_string(),
            description: String::new(),
            order_index: 1,
            content_status: Default::default(),
            quiz_status: Default::default(),
            locked: false,
            unlocked_at: None,
            is_remedial: true,
            related_to_sub_module_id: Some(failed.clone()),
        };
        course.modules[0].sub_modules.insert(1, remedial);

        let next = advance(&mut course, &module_id, &failed).unwrap().unwrap();
        assert_eq!(next.sub_module_id, "remedial-1");
        let after = advance(&mut course, &module_id, "remedial-1").unwrap().unwrap();
        assert_eq!(after.title, "Variables and Types");
    }
}
