use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::{StoreError, StoreOp, StoreResult, TaskStore};
use crate::task::{
    NewProject, NewTask, PositionUpdate, Project, ProjectId, ProjectPatch, Task, TaskId,
    TaskPatch,
};

const TASK_COLUMNS: &str =
    "id,title,story,created_at,completed_at,color,position,deadline,status,project_id,points";
const PROJECT_COLUMNS: &str = "id,name,description,color,created_at";
const TASKS_TABLE: &str = "tasks";
const PROJECTS_TABLE: &str = "projects";

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project URL; tables live under `<base_url>/rest/v1/`.
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Store backed by a PostgREST endpoint (the Supabase REST surface).
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    rest_root: Url,
    api_key: String,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| StoreError::Transport(format!("failed building HTTP client: {err}")))?;

        let base = config.base_url.trim_end_matches('/');
        let rest_root = Url::parse(&format!("{base}/rest/v1/"))
            .map_err(|err| StoreError::Transport(format!("invalid store url {base}: {err}")))?;

        Ok(Self {
            client,
            rest_root,
            api_key: config.api_key,
        })
    }

    fn table_url(&self, table: &str, pairs: &[(&str, &str)]) -> StoreResult<Url> {
        let mut url = self
            .rest_root
            .join(table)
            .map_err(|err| StoreError::Transport(format!("invalid table url: {err}")))?;
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", self.api_key.as_str())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    fn with_json<T: serde::Serialize + ?Sized>(
        request: RequestBuilder,
        body: &T,
    ) -> StoreResult<RequestBuilder> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| StoreError::Decode(format!("failed encoding request: {err}")))?;
        Ok(request
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload))
    }

    async fn send(&self, op: StoreOp, request: RequestBuilder) -> StoreResult<String> {
        let response = request.send().await.map_err(|err| {
            warn!(%op, error = %err, "store request failed");
            StoreError::Transport(err.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            warn!(%op, error = %err, "failed reading store response body");
            StoreError::Transport(err.to_string())
        })?;

        if status.is_success() {
            debug!(%op, status = status.as_u16(), bytes = body.len(), "store call succeeded");
            return Ok(body);
        }

        let message = error_message(&body);
        warn!(%op, status = status.as_u16(), message = %message, "store rejected request");
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, op: StoreOp, url: Url) -> StoreResult<T> {
        let body = self.send(op, self.request(Method::GET, url)).await?;
        decode(&body)
    }

    async fn insert_returning<B, T>(&self, op: StoreOp, table: &str, columns: &str, row: &B) -> StoreResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.table_url(table, &[("select", columns)])?;
        let request = Self::with_json(self.request(Method::POST, url), row)?
            .header("Prefer", "return=representation");
        let body = self.send(op, request).await?;
        let mut rows: Vec<T> = decode(&body)?;
        if rows.is_empty() {
            return Err(StoreError::Decode(format!("{op} returned no row")));
        }
        Ok(rows.swap_remove(0))
    }

    async fn patch_by_id<B>(&self, op: StoreOp, table: &str, id: &str, patch: &B) -> StoreResult<()>
    where
        B: serde::Serialize + ?Sized,
    {
        let filter = format!("eq.{id}");
        let url = self.table_url(table, &[("id", filter.as_str())])?;
        let request = Self::with_json(self.request(Method::PATCH, url), patch)?;
        self.send(op, request).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> StoreResult<T> {
    serde_json::from_str(body).map_err(|err| StoreError::Decode(err.to_string()))
}

/// PostgREST error bodies carry a `message`; anything else is passed
/// through verbatim.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl TaskStore for RestStore {
    #[instrument(skip(self))]
    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let url = self.table_url(
            TASKS_TABLE,
            &[("select", TASK_COLUMNS), ("order", "position.asc")],
        )?;
        self.fetch(StoreOp::ListTasks, url).await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let url = self.table_url(
            PROJECTS_TABLE,
            &[("select", PROJECT_COLUMNS), ("order", "created_at.asc")],
        )?;
        self.fetch(StoreOp::ListProjects, url).await
    }

    #[instrument(skip(self, task), fields(title = %task.title))]
    async fn insert_task(&self, task: &NewTask) -> StoreResult<Task> {
        self.insert_returning(StoreOp::InsertTask, TASKS_TABLE, TASK_COLUMNS, task)
            .await
    }

    #[instrument(skip(self, project), fields(name = %project.name))]
    async fn insert_project(&self, project: &NewProject) -> StoreResult<Project> {
        self.insert_returning(StoreOp::InsertProject, PROJECTS_TABLE, PROJECT_COLUMNS, project)
            .await
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> StoreResult<()> {
        self.patch_by_id(StoreOp::UpdateTask, TASKS_TABLE, id.as_str(), patch)
            .await
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    async fn update_project(&self, id: &ProjectId, patch: &ProjectPatch) -> StoreResult<()> {
        self.patch_by_id(StoreOp::UpdateProject, PROJECTS_TABLE, id.as_str(), patch)
            .await
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_positions(&self, rows: &[PositionUpdate]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.table_url(TASKS_TABLE, &[("on_conflict", "id")])?;
        let request = Self::with_json(self.request(Method::POST, url), rows)?
            .header("Prefer", "resolution=merge-duplicates");
        self.send(StoreOp::UpsertPositions, request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete_project(&self, id: &ProjectId) -> StoreResult<()> {
        let filter = format!("eq.{}", id.as_str());
        let url = self.table_url(PROJECTS_TABLE, &[("id", filter.as_str())])?;
        self.send(StoreOp::DeleteProject, self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }
}
