use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT_COLOR: &str = "#1f7a8c";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TaskId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Done,
}

impl TaskStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Todo => Self::Done,
            Self::Done => Self::Todo,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskColor {
    #[default]
    Red,
    Yellow,
    Blue,
}

impl std::str::FromStr for TaskColor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "yellow" => Ok(Self::Yellow),
            "blue" => Ok(Self::Blue),
            other => Err(anyhow::anyhow!("unknown task color: {other}")),
        }
    }
}

/// Story-point estimate restricted to the planning-poker scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct StoryPoints(u8);

impl StoryPoints {
    pub const SCALE: [u8; 6] = [1, 2, 3, 5, 8, 13];

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for StoryPoints {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if Self::SCALE.contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "story points must be one of {:?}, got {value}",
                Self::SCALE
            ))
        }
    }
}

impl From<StoryPoints> for u8 {
    fn from(points: StoryPoints) -> Self {
        points.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub story: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub color: TaskColor,

    #[serde(default)]
    pub position: f64,

    #[serde(default)]
    pub deadline: Option<NaiveDate>,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub project_id: Option<ProjectId>,

    #[serde(default)]
    pub points: Option<StoryPoints>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(story) = &patch.story {
            self.story = story.clone();
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        if let Some(project_id) = &patch.project_id {
            self.project_id = project_id.clone();
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(completed_at) = patch.completed_at {
            self.completed_at = completed_at;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_project_color")]
    pub color: String,

    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn apply_patch(&mut self, patch: &ProjectPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
    }
}

fn default_project_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub story: Option<String>,
    pub color: TaskColor,
    pub position: f64,
    pub deadline: Option<NaiveDate>,
    pub status: TaskStatus,
    pub project_id: Option<ProjectId>,
    pub points: Option<StoryPoints>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}

/// Targeted field update. `None` leaves a column untouched, `Some(None)`
/// writes null.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<ProjectId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Option<StoryPoints>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<TaskColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

/// One row of a batch reorder upsert, keyed by `id`. Every row of a batch
/// carries the same columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionUpdate {
    pub id: TaskId,
    pub position: f64,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PositionUpdate {
    pub fn apply_to(&self, task: &mut Task) {
        task.position = self.position;
        task.status = self.status;
        task.completed_at = self.completed_at;
    }
}

/// Trims user input and maps blank text to `None`.
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
