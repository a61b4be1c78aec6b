use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bucket::{Section, sections};
use crate::edit::{
    Draft, EditKey, EditSession, EditTarget, KeyAction, ProjectDraft, TaskDraft, key_action,
};
use crate::position::{
    DropTarget, append_position, compare_by_position, prepend_position, reorder,
};
use crate::store::{StoreError, TaskStore};
use crate::task::{
    DEFAULT_PROJECT_COLOR, NewProject, NewTask, PositionUpdate, Project, ProjectId, StoryPoints,
    Task, TaskColor, TaskId, TaskPatch, TaskStatus, non_blank,
};

const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Story board with projects, story text and points.
    #[default]
    Story,
    /// Single list with colors and manual ordering.
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    End,
    Front,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub variant: Variant,
    pub insert_at: Placement,
    /// Apply add/toggle/move locally before the store confirms them.
    pub optimistic: bool,
    pub default_color: TaskColor,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self::for_variant(Variant::Story)
    }
}

impl AppSettings {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Story => Self {
                variant,
                insert_at: Placement::End,
                optimistic: false,
                default_color: TaskColor::Red,
            },
            Variant::Minimal => Self {
                variant,
                insert_at: Placement::Front,
                optimistic: true,
                default_color: TaskColor::Red,
            },
        }
    }
}

/// Result of a user action. Failures leave their message in
/// [`AppState::last_error`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Rejected client-side (blank required field, unknown entity); no store
    /// call was made.
    Ignored,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub story: String,
    pub deadline: Option<NaiveDate>,
    pub project_id: Option<ProjectId>,
    pub points: Option<StoryPoints>,
    pub color: Option<TaskColor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectInput {
    pub name: String,
    pub description: String,
    pub color: Option<String>,
}

/// In-memory view of tasks and projects plus the single edit slot and the
/// single error banner.
///
/// Every mutation checks the store result before touching local state.
/// Optimistic actions snapshot the task list first and restore it verbatim
/// when the store call fails.
#[derive(Debug)]
pub struct AppState<S> {
    store: S,
    settings: AppSettings,
    tasks: Vec<Task>,
    projects: Vec<Project>,
    edit: Option<EditSession>,
    last_error: Option<String>,
}

impl<S: TaskStore> AppState<S> {
    pub fn new(store: S, settings: AppSettings) -> Self {
        Self {
            store,
            settings,
            tasks: vec![],
            projects: vec![],
            edit: None,
            last_error: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.iter().find(|project| &project.id == id)
    }

    pub fn edit(&self) -> Option<&EditSession> {
        self.edit.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    fn fail(&mut self, action: &str, err: StoreError) -> Outcome {
        warn!(action, error = %err, "store call failed");
        self.last_error = Some(err.to_string());
        Outcome::Failed
    }

    /// Reloads projects and tasks, clearing the banner first. A failing
    /// list leaves the other one loaded.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> Outcome {
        self.last_error = None;
        let mut outcome = Outcome::Applied;

        match self.store.list_projects().await {
            Ok(projects) => self.projects = projects,
            Err(err) => outcome = self.fail("load projects", err),
        }
        match self.store.list_tasks().await {
            Ok(tasks) => self.tasks = tasks,
            Err(err) => outcome = self.fail("load tasks", err),
        }

        info!(
            tasks = self.tasks.len(),
            projects = self.projects.len(),
            "loaded board"
        );
        outcome
    }

    /// Todo tasks in manual order.
    pub fn todo_tasks(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::Todo)
    }

    fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.status == status)
            .collect();
        tasks.sort_by(|a, b| compare_by_position(a, b));
        tasks
    }

    /// Done tasks, most recently completed first.
    pub fn done_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|task| task.is_done()).collect();
        tasks.sort_by(|a, b| {
            let a_key = a.completed_at.unwrap_or(a.created_at);
            let b_key = b.completed_at.unwrap_or(b.created_at);
            b_key.cmp(&a_key).then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    pub fn sections(&self, today: NaiveDate) -> Vec<Section<'_>> {
        sections(self.todo_tasks(), today)
    }

    /// Number of tasks referencing each project.
    pub fn project_usage(&self) -> HashMap<&ProjectId, usize> {
        let mut usage = HashMap::new();
        for project_id in self.tasks.iter().filter_map(|task| task.project_id.as_ref()) {
            *usage.entry(project_id).or_default() += 1;
        }
        usage
    }

    fn next_position(&self) -> f64 {
        let positions = self.todo_tasks().into_iter().map(|task| task.position);
        match self.settings.insert_at {
            Placement::End => append_position(positions),
            Placement::Front => prepend_position(positions),
        }
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn add_task(&mut self, input: TaskInput) -> Outcome {
        let Some(title) = non_blank(&input.title) else {
            debug!("blank title; add ignored");
            return Outcome::Ignored;
        };

        let new_task = NewTask {
            title,
            story: non_blank(&input.story),
            color: input.color.unwrap_or(self.settings.default_color),
            position: self.next_position(),
            deadline: input.deadline,
            status: TaskStatus::Todo,
            project_id: input.project_id,
            points: input.points,
        };

        if !self.settings.optimistic {
            return match self.store.insert_task(&new_task).await {
                Ok(created) => {
                    info!(id = %created.id, position = created.position, "task added");
                    self.tasks.push(created);
                    Outcome::Applied
                }
                Err(err) => self.fail("add task", err),
            };
        }

        let snapshot = self.tasks.clone();
        let local_id = TaskId(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()));
        self.tasks.push(Task {
            id: local_id.clone(),
            title: new_task.title.clone(),
            story: new_task.story.clone(),
            created_at: Utc::now(),
            completed_at: None,
            color: new_task.color,
            position: new_task.position,
            deadline: new_task.deadline,
            status: new_task.status,
            project_id: new_task.project_id.clone(),
            points: new_task.points,
        });

        match self.store.insert_task(&new_task).await {
            Ok(created) => {
                info!(local = %local_id, id = %created.id, "optimistic task confirmed");
                match self.tasks.iter_mut().find(|task| task.id == local_id) {
                    Some(slot) => *slot = created,
                    None => self.tasks.push(created),
                }
                Outcome::Applied
            }
            Err(err) => {
                self.tasks = snapshot;
                self.fail("add task", err)
            }
        }
    }

    /// Flips todo/done, stamping or clearing the completion time.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn toggle_task(&mut self, id: &TaskId) -> Outcome {
        let Some(task) = self.task(id) else {
            return Outcome::Ignored;
        };
        let status = task.status.toggled();
        let completed_at = (status == TaskStatus::Done).then(Utc::now);
        let patch = TaskPatch {
            status: Some(status),
            completed_at: Some(completed_at),
            ..TaskPatch::default()
        };

        self.apply_task_patch("toggle task", id, patch).await
    }

    async fn apply_task_patch(&mut self, action: &str, id: &TaskId, patch: TaskPatch) -> Outcome {
        if self.settings.optimistic {
            let snapshot = self.tasks.clone();
            self.patch_local_task(id, &patch);
            if let Err(err) = self.store.update_task(id, &patch).await {
                self.tasks = snapshot;
                return self.fail(action, err);
            }
        } else {
            if let Err(err) = self.store.update_task(id, &patch).await {
                return self.fail(action, err);
            }
            self.patch_local_task(id, &patch);
        }
        Outcome::Applied
    }

    fn patch_local_task(&mut self, id: &TaskId, patch: &TaskPatch) {
        if let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) {
            task.apply_patch(patch);
        }
    }

    /// Drops `dragged` onto `target` and persists the re-indexed list in one
    /// batch upsert.
    #[instrument(skip(self), fields(dragged = %dragged))]
    pub async fn move_task(&mut self, dragged: &TaskId, target: &DropTarget) -> Outcome {
        let Some(updates) = reorder(&self.tasks, dragged, target, Utc::now()) else {
            debug!(?target, "drop target not applicable");
            return Outcome::Ignored;
        };

        let snapshot = self.tasks.clone();
        if self.settings.optimistic {
            self.apply_position_updates(&updates);
        }
        match self.store.upsert_positions(&updates).await {
            Ok(()) => {
                if !self.settings.optimistic {
                    self.apply_position_updates(&updates);
                }
                info!(rows = updates.len(), "reorder persisted");
                Outcome::Applied
            }
            Err(err) => {
                self.tasks = snapshot;
                self.fail("reorder tasks", err)
            }
        }
    }

    fn apply_position_updates(&mut self, updates: &[PositionUpdate]) {
        for update in updates {
            if let Some(task) = self.tasks.iter_mut().find(|task| task.id == update.id) {
                update.apply_to(task);
            }
        }
    }

    /// Enters edit mode for a task, silently dropping any other draft.
    pub fn start_task_edit(&mut self, id: &TaskId) -> Outcome {
        let Some(task) = self.task(id) else {
            return Outcome::Ignored;
        };
        let session = EditSession::for_task(task);
        self.replace_edit(session);
        Outcome::Applied
    }

    pub fn start_project_edit(&mut self, id: &ProjectId) -> Outcome {
        let Some(project) = self.project(id) else {
            return Outcome::Ignored;
        };
        let session = EditSession::for_project(project);
        self.replace_edit(session);
        Outcome::Applied
    }

    fn replace_edit(&mut self, session: EditSession) {
        if let Some(previous) = &self.edit
            && !previous.is_editing(&session.target)
        {
            debug!(abandoned = ?previous.target, "abandoning unsaved draft");
        }
        self.edit = Some(session);
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    pub fn task_draft_mut(&mut self) -> Option<&mut TaskDraft> {
        match self.edit.as_mut().map(|session| &mut session.draft) {
            Some(Draft::Task(draft)) => Some(draft),
            _ => None,
        }
    }

    pub fn project_draft_mut(&mut self) -> Option<&mut ProjectDraft> {
        match self.edit.as_mut().map(|session| &mut session.draft) {
            Some(Draft::Project(draft)) => Some(draft),
            _ => None,
        }
    }

    /// Commits the active draft. A blank title/name keeps edit mode and
    /// makes no store call; a store failure keeps the draft and edit mode.
    #[instrument(skip(self))]
    pub async fn save_edit(&mut self) -> Outcome {
        let Some(session) = self.edit.clone() else {
            return Outcome::Ignored;
        };

        match (&session.target, &session.draft) {
            (EditTarget::Task(id), Draft::Task(draft)) => {
                let Some(patch) = draft.to_patch() else {
                    return Outcome::Ignored;
                };
                if let Err(err) = self.store.update_task(id, &patch).await {
                    return self.fail("save task", err);
                }
                self.patch_local_task(id, &patch);
                info!(id = %id, "task saved");
            }
            (EditTarget::Project(id), Draft::Project(draft)) => {
                let Some(patch) = draft.to_patch() else {
                    return Outcome::Ignored;
                };
                if let Err(err) = self.store.update_project(id, &patch).await {
                    return self.fail("save project", err);
                }
                if let Some(project) = self.projects.iter_mut().find(|p| &p.id == id) {
                    project.apply_patch(&patch);
                }
                info!(id = %id, "project saved");
            }
            _ => return Outcome::Ignored,
        }

        self.edit = None;
        Outcome::Applied
    }

    /// Keyboard contract of an edit field.
    pub async fn handle_key(&mut self, key: EditKey, in_field: bool) -> Outcome {
        if self.edit.is_none() {
            return Outcome::Ignored;
        }
        match key_action(key, in_field) {
            KeyAction::Submit => self.save_edit().await,
            KeyAction::Discard => {
                self.cancel_edit();
                Outcome::Applied
            }
            KeyAction::Ignore => Outcome::Ignored,
        }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add_project(&mut self, input: ProjectInput) -> Outcome {
        let Some(name) = non_blank(&input.name) else {
            return Outcome::Ignored;
        };
        let new_project = NewProject {
            name,
            description: non_blank(&input.description),
            color: input
                .color
                .and_then(|color| non_blank(&color))
                .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
        };

        match self.store.insert_project(&new_project).await {
            Ok(created) => {
                info!(id = %created.id, "project added");
                self.projects.push(created);
                Outcome::Applied
            }
            Err(err) => self.fail("add project", err),
        }
    }

    /// Removes a project and clears (never deletes) the tasks that pointed
    /// at it.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_project(&mut self, id: &ProjectId) -> Outcome {
        if let Err(err) = self.store.delete_project(id).await {
            return self.fail("delete project", err);
        }

        self.projects.retain(|project| &project.id != id);
        let mut cleared = 0usize;
        for task in self
            .tasks
            .iter_mut()
            .filter(|task| task.project_id.as_ref() == Some(id))
        {
            task.project_id = None;
            cleared += 1;
        }
        let target = EditTarget::Project(id.clone());
        if self.edit.as_ref().is_some_and(|session| session.is_editing(&target)) {
            self.edit = None;
        }
        if let Some(draft) = self.task_draft_mut()
            && draft.project_id.as_ref() == Some(id)
        {
            draft.project_id = None;
        }
        info!(cleared, "project deleted");
        Outcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_pick_their_defaults() {
        let story = AppSettings::for_variant(Variant::Story);
        assert_eq!(story.insert_at, Placement::End);
        assert!(!story.optimistic);

        let minimal = AppSettings::for_variant(Variant::Minimal);
        assert_eq!(minimal.insert_at, Placement::Front);
        assert!(minimal.optimistic);
    }
}
