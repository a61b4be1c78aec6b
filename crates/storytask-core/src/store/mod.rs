//! Remote persistence for tasks and projects.
//!
//! The store speaks five operation shapes: ordered select, insert
//! returning the created row, update by id, batch upsert keyed by id and
//! delete by id. Callers inspect every result before touching local state.

mod memory;
mod rest;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use rest::{RestStore, RestStoreConfig};

use crate::task::{
    NewProject, NewTask, PositionUpdate, Project, ProjectId, ProjectPatch, Task, TaskId,
    TaskPatch,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("{table} row not found: {id}")]
    NotFound { table: &'static str, id: String },

    #[error("{0} failed")]
    Injected(StoreOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListTasks,
    ListProjects,
    InsertTask,
    InsertProject,
    UpdateTask,
    UpdateProject,
    UpsertPositions,
    DeleteProject,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ListTasks => "list tasks",
            Self::ListProjects => "list projects",
            Self::InsertTask => "insert task",
            Self::InsertProject => "insert project",
            Self::UpdateTask => "update task",
            Self::UpdateProject => "update project",
            Self::UpsertPositions => "upsert positions",
            Self::DeleteProject => "delete project",
        };
        f.write_str(name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Tasks ordered by position ascending.
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Projects ordered by creation time ascending.
    async fn list_projects(&self) -> StoreResult<Vec<Project>>;

    async fn insert_task(&self, task: &NewTask) -> StoreResult<Task>;

    async fn insert_project(&self, project: &NewProject) -> StoreResult<Project>;

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> StoreResult<()>;

    async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> StoreResult<()>;

    async fn upsert_positions(&self, rows: &[PositionUpdate]) -> StoreResult<()>;

    /// Deletes the project; tasks referencing it keep existing with a null
    /// project.
    async fn delete_project(&self, id: &ProjectId) -> StoreResult<()>;
}
