use chrono::NaiveDate;

use crate::task::{
    Project, ProjectId, ProjectPatch, StoryPoints, Task, TaskId, TaskPatch, non_blank,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    Task(TaskId),
    Project(ProjectId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub story: String,
    pub deadline: Option<NaiveDate>,
    pub project_id: Option<ProjectId>,
    pub points: Option<StoryPoints>,
}

impl TaskDraft {
    pub fn seed(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            story: task.story.clone().unwrap_or_default(),
            deadline: task.deadline,
            project_id: task.project_id.clone(),
            points: task.points,
        }
    }

    /// `None` when the trimmed title is empty.
    pub fn to_patch(&self) -> Option<TaskPatch> {
        let title = non_blank(&self.title)?;
        Some(TaskPatch {
            title: Some(title),
            story: Some(non_blank(&self.story)),
            deadline: Some(self.deadline),
            project_id: Some(self.project_id.clone()),
            points: Some(self.points),
            ..TaskPatch::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
}

impl ProjectDraft {
    pub fn seed(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            description: project.description.clone().unwrap_or_default(),
        }
    }

    /// `None` when the trimmed name is empty.
    pub fn to_patch(&self) -> Option<ProjectPatch> {
        let name = non_blank(&self.name)?;
        Some(ProjectPatch {
            name: Some(name),
            description: Some(non_blank(&self.description)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    Task(TaskDraft),
    Project(ProjectDraft),
}

/// The one entity currently in edit mode together with its unsaved fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub target: EditTarget,
    pub draft: Draft,
}

impl EditSession {
    pub fn for_task(task: &Task) -> Self {
        Self {
            target: EditTarget::Task(task.id.clone()),
            draft: Draft::Task(TaskDraft::seed(task)),
        }
    }

    pub fn for_project(project: &Project) -> Self {
        Self {
            target: EditTarget::Project(project.id.clone()),
            draft: Draft::Project(ProjectDraft::seed(project)),
        }
    }

    pub fn is_editing(&self, target: &EditTarget) -> bool {
        &self.target == target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    Discard,
    Ignore,
}

/// Enter submits and Escape discards, but only while focus sits in an
/// editable field.
pub fn key_action(key: EditKey, in_field: bool) -> KeyAction {
    if !in_field {
        return KeyAction::Ignore;
    }
    match key {
        EditKey::Enter => KeyAction::Submit,
        EditKey::Escape => KeyAction::Discard,
        EditKey::Other => KeyAction::Ignore,
    }
}
