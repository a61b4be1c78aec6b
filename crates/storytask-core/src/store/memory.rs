use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{StoreError, StoreOp, StoreResult, TaskStore};
use crate::position::sort_by_position;
use crate::task::{
    NewProject, NewTask, PositionUpdate, Project, ProjectId, ProjectPatch, Task, TaskId,
    TaskPatch,
};

/// In-process store with the same observable behaviour as the remote one:
/// server-assigned ids and timestamps, `ON DELETE SET NULL` for project
/// references, and last-write-wins updates. Failures can be injected per
/// operation and every call is counted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Vec<Task>,
    projects: Vec<Project>,
    failing: HashSet<StoreOp>,
    calls: HashMap<StoreOp, usize>,
}

impl Inner {
    fn enter(&mut self, op: StoreOp) -> StoreResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.remove(&op) {
            debug!(%op, "injected store failure");
            return Err(StoreError::Injected(op));
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(tasks: Vec<Task>, projects: Vec<Project>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks,
                projects,
                ..Inner::default()
            }),
        }
    }

    /// Makes the next call of `op` fail without side effects.
    pub fn fail_next(&self, op: StoreOp) {
        self.inner.lock().failing.insert(op);
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.inner.lock().calls.values().sum()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().tasks.clone()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.inner.lock().projects.clone()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    #[instrument(skip(self))]
    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::ListTasks)?;
        let mut tasks = inner.tasks.clone();
        sort_by_position(&mut tasks);
        Ok(tasks)
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::ListProjects)?;
        let mut projects = inner.projects.clone();
        projects.sort_by_key(|project| project.created_at);
        Ok(projects)
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert_task(&self, task: &NewTask) -> StoreResult<Task> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::InsertTask)?;
        let created = Task {
            id: TaskId(Uuid::new_v4().to_string()),
            title: task.title.clone(),
            story: task.story.clone(),
            created_at: Utc::now(),
            completed_at: None,
            color: task.color,
            position: task.position,
            deadline: task.deadline,
            status: task.status,
            project_id: task.project_id.clone(),
            points: task.points,
        };
        inner.tasks.push(created.clone());
        Ok(created)
    }

    #[instrument(skip(self, project), fields(name = %project.name))]
    async fn insert_project(&self, project: &NewProject) -> StoreResult<Project> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::InsertProject)?;
        let created = Project {
            id: ProjectId(Uuid::new_v4().to_string()),
            name: project.name.clone(),
            description: project.description.clone(),
            color: project.color.clone(),
            created_at: Utc::now(),
        };
        inner.projects.push(created.clone());
        Ok(created)
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::UpdateTask)?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|task| &task.id == id)
            .ok_or_else(|| StoreError::NotFound {
                table: "tasks",
                id: id.to_string(),
            })?;
        task.apply_patch(patch);
        Ok(())
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::UpdateProject)?;
        let project = inner
            .projects
            .iter_mut()
            .find(|project| &project.id == id)
            .ok_or_else(|| StoreError::NotFound {
                table: "projects",
                id: id.to_string(),
            })?;
        project.apply_patch(patch);
        Ok(())
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_positions(&self, rows: &[PositionUpdate]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::UpsertPositions)?;
        for row in rows {
            let task = inner
                .tasks
                .iter_mut()
                .find(|task| task.id == row.id)
                .ok_or_else(|| StoreError::NotFound {
                    table: "tasks",
                    id: row.id.to_string(),
                })?;
            row.apply_to(task);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_project(&self, id: &ProjectId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(StoreOp::DeleteProject)?;
        inner.projects.retain(|project| &project.id != id);
        let mut cleared = 0usize;
        for task in inner
            .tasks
            .iter_mut()
            .filter(|task| task.project_id.as_ref() == Some(id))
        {
            task.project_id = None;
            cleared += 1;
        }
        debug!(cleared, "cleared project references");
        Ok(())
    }
}
