use anyhow::{anyhow, bail};
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::app::{AppState, Outcome, ProjectInput, TaskInput, Variant};
use crate::cli::{AddArgs, ColorArg, Command, EditArgs, ListArg, MoveArgs, ProjectCommand};
use crate::datetime::parse_deadline_expr;
use crate::edit::EditKey;
use crate::position::DropTarget;
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::task::{ProjectId, StoryPoints, TaskColor, TaskId, TaskStatus};

#[instrument(skip(state, renderer, command))]
pub async fn dispatch<S: TaskStore>(
    state: &mut AppState<S>,
    renderer: &Renderer,
    command: Command,
    today: NaiveDate,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    if state.load().await == Outcome::Failed {
        return Err(banner(state, "failed to load board"));
    }

    match command {
        Command::Board => cmd_board(state, renderer, today),
        Command::Done => renderer.print_done(&state.done_tasks()),
        Command::Projects => {
            require_projects(state)?;
            renderer.print_projects(state.projects(), &state.project_usage())
        }
        Command::Add(args) => cmd_add(state, args, today).await,
        Command::Toggle { task } => cmd_toggle(state, &task).await,
        Command::Edit(args) => cmd_edit(state, args, today).await,
        Command::Move(args) => cmd_move(state, args).await,
        Command::Project(sub) => cmd_project(state, sub).await,
    }
}

fn cmd_board<S: TaskStore>(
    state: &AppState<S>,
    renderer: &Renderer,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let todo = state.todo_tasks().len();
    let done = state.done_tasks().len();
    renderer.print_board(&state.sections(today), state.projects(), todo, done)
}

async fn cmd_add<S: TaskStore>(
    state: &mut AppState<S>,
    args: AddArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let deadline = match args.due.as_deref() {
        Some(raw) => parse_deadline_expr(raw, today)?,
        None => None,
    };
    let project_id = match args.project.as_deref() {
        Some(raw) => {
            require_projects(state)?;
            Some(resolve_project(state, raw)?)
        }
        None => None,
    };
    let points = args.points.map(parse_points).transpose()?;

    let input = TaskInput {
        title: args.title.join(" "),
        story: args.story.unwrap_or_default(),
        deadline,
        project_id,
        points,
        color: args.color.map(TaskColor::from),
    };

    match state.add_task(input).await {
        Outcome::Applied => {
            info!("task added");
            Ok(())
        }
        Outcome::Ignored => {
            warn!("blank title; nothing added");
            Ok(())
        }
        Outcome::Failed => Err(banner(state, "failed to add task")),
    }
}

async fn cmd_toggle<S: TaskStore>(state: &mut AppState<S>, raw: &str) -> anyhow::Result<()> {
    let id = resolve_task(state, raw)?;
    let outcome = state.toggle_task(&id).await;
    expect_applied(state, outcome, "failed to toggle task")
}

async fn cmd_edit<S: TaskStore>(
    state: &mut AppState<S>,
    args: EditArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let id = resolve_task(state, &args.task)?;
    let deadline = match args.due.as_deref() {
        Some(raw) => Some(parse_deadline_expr(raw, today)?),
        None => None,
    };
    let project_id = match args.project.as_deref() {
        Some(raw) if raw.eq_ignore_ascii_case("none") => Some(None),
        Some(raw) => {
            require_projects(state)?;
            Some(Some(resolve_project(state, raw)?))
        }
        None => None,
    };
    let points = match args.points {
        Some(0) => Some(None),
        Some(n) => Some(Some(parse_points(n)?)),
        None => None,
    };

    if state.start_task_edit(&id) != Outcome::Applied {
        bail!("task not found: {id}");
    }

    let Some(draft) = state.task_draft_mut() else {
        bail!("task {id} is not editable");
    };
    let mut touched = false;
    if let Some(title) = args.title {
        draft.title = title;
        touched = true;
    }
    if let Some(story) = args.story {
        draft.story = story;
        touched = true;
    }
    if let Some(deadline) = deadline {
        draft.deadline = deadline;
        touched = true;
    }
    if let Some(project_id) = project_id {
        draft.project_id = project_id;
        touched = true;
    }
    if let Some(points) = points {
        draft.points = points;
        touched = true;
    }

    if !touched {
        let _ = state.handle_key(EditKey::Escape, true).await;
        warn!("no fields given; edit discarded");
        return Ok(());
    }

    match state.handle_key(EditKey::Enter, true).await {
        Outcome::Applied => Ok(()),
        Outcome::Ignored => bail!("title cannot be empty"),
        Outcome::Failed => Err(banner(state, "failed to save task")),
    }
}

async fn cmd_move<S: TaskStore>(state: &mut AppState<S>, args: MoveArgs) -> anyhow::Result<()> {
    let dragged = resolve_task(state, &args.task)?;
    let target = match (args.target.as_deref(), args.end) {
        (Some(raw), _) => DropTarget::Item(resolve_task(state, raw)?),
        (None, Some(list)) => DropTarget::End(TaskStatus::from(list)),
        (None, None) => bail!("move needs a target task or --end <list>"),
    };
    let outcome = state.move_task(&dragged, &target).await;
    expect_applied(state, outcome, "failed to move task")
}

async fn cmd_project<S: TaskStore>(
    state: &mut AppState<S>,
    sub: ProjectCommand,
) -> anyhow::Result<()> {
    require_projects(state)?;
    match sub {
        ProjectCommand::Add {
            name,
            description,
            color,
        } => {
            let input = ProjectInput {
                name: name.join(" "),
                description: description.unwrap_or_default(),
                color,
            };
            let outcome = state.add_project(input).await;
            expect_applied(state, outcome, "failed to add project")
        }
        ProjectCommand::Edit {
            project,
            name,
            description,
        } => {
            let id = resolve_project(state, &project)?;
            let _ = state.start_project_edit(&id);
            let Some(draft) = state.project_draft_mut() else {
                bail!("project {id} is not editable");
            };
            let mut touched = false;
            if let Some(name) = name {
                draft.name = name;
                touched = true;
            }
            if let Some(description) = description {
                draft.description = description;
                touched = true;
            }
            if !touched {
                let _ = state.handle_key(EditKey::Escape, true).await;
                warn!("no fields given; edit discarded");
                return Ok(());
            }
            match state.handle_key(EditKey::Enter, true).await {
                Outcome::Applied => Ok(()),
                Outcome::Ignored => bail!("project name cannot be empty"),
                Outcome::Failed => Err(banner(state, "failed to save project")),
            }
        }
        ProjectCommand::Delete { project } => {
            let id = resolve_project(state, &project)?;
            let outcome = state.delete_project(&id).await;
            expect_applied(state, outcome, "failed to delete project")
        }
    }
}

fn expect_applied<S: TaskStore>(
    state: &AppState<S>,
    outcome: Outcome,
    context: &str,
) -> anyhow::Result<()> {
    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Ignored => bail!("{context}: nothing to change"),
        Outcome::Failed => Err(banner(state, context)),
    }
}

fn banner<S: TaskStore>(state: &AppState<S>, context: &str) -> anyhow::Error {
    match state.last_error() {
        Some(message) => anyhow!("{context}: {message}"),
        None => anyhow!("{context}"),
    }
}

fn require_projects<S: TaskStore>(state: &AppState<S>) -> anyhow::Result<()> {
    if state.settings().variant == Variant::Minimal {
        bail!("projects are not available in the minimal variant");
    }
    Ok(())
}

fn parse_points(raw: u8) -> anyhow::Result<StoryPoints> {
    StoryPoints::try_from(raw).map_err(|err| anyhow!(err))
}

/// Exact id or unique id prefix.
pub fn resolve_task<S: TaskStore>(state: &AppState<S>, raw: &str) -> anyhow::Result<TaskId> {
    let ids: Vec<&str> = state.tasks().iter().map(|task| task.id.as_str()).collect();
    resolve_ref("task", &ids, raw).map(TaskId)
}

pub fn resolve_project<S: TaskStore>(
    state: &AppState<S>,
    raw: &str,
) -> anyhow::Result<ProjectId> {
    let ids: Vec<&str> = state
        .projects()
        .iter()
        .map(|project| project.id.as_str())
        .collect();
    resolve_ref("project", &ids, raw).map(ProjectId)
}

fn resolve_ref(kind: &str, ids: &[&str], raw: &str) -> anyhow::Result<String> {
    let needle = raw.trim();
    if needle.is_empty() {
        bail!("empty {kind} reference");
    }
    if let Some(exact) = ids.iter().find(|id| **id == needle) {
        return Ok((*exact).to_string());
    }

    let mut matches = ids.iter().filter(|id| id.starts_with(needle));
    let first = matches
        .next()
        .ok_or_else(|| anyhow!("no {kind} matches '{needle}'"))?;
    if matches.next().is_some() {
        bail!("'{needle}' matches more than one {kind}");
    }
    Ok((*first).to_string())
}

impl From<ColorArg> for TaskColor {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Red => TaskColor::Red,
            ColorArg::Yellow => TaskColor::Yellow,
            ColorArg::Blue => TaskColor::Blue,
        }
    }
}

impl From<ListArg> for TaskStatus {
    fn from(value: ListArg) -> Self {
        match value {
            ListArg::Todo => TaskStatus::Todo,
            ListArg::Done => TaskStatus::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{cmd_project, resolve_ref};
    use crate::app::{AppSettings, AppState, Outcome};
    use crate::cli::ProjectCommand;
    use crate::store::{MemoryStore, StoreOp};
    use crate::task::{Project, ProjectId};

    fn loaded_project() -> Project {
        Project {
            id: ProjectId("p-garden".to_string()),
            name: "Garden".to_string(),
            description: None,
            color: "#1f7a8c".to_string(),
            created_at: Utc
                .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[tokio::test]
    async fn project_edit_without_fields_skips_the_store() {
        let store = MemoryStore::with_rows(vec![], vec![loaded_project()]);
        let mut state = AppState::new(store, AppSettings::default());
        assert_eq!(state.load().await, Outcome::Applied);

        let command = ProjectCommand::Edit {
            project: "p-gar".to_string(),
            name: None,
            description: None,
        };
        cmd_project(&mut state, command).await.expect("edit");
        assert_eq!(state.store().calls(StoreOp::UpdateProject), 0);
        assert!(state.edit().is_none());

        let command = ProjectCommand::Edit {
            project: "p-gar".to_string(),
            name: Some("Backyard".to_string()),
            description: None,
        };
        cmd_project(&mut state, command).await.expect("edit");
        assert_eq!(state.store().calls(StoreOp::UpdateProject), 1);
        assert_eq!(state.projects()[0].name, "Backyard");
    }

    #[test]
    fn resolves_exact_and_unique_prefix() {
        let ids = ["a1b2", "a1c3", "ff00"];
        assert_eq!(resolve_ref("task", &ids, "ff").expect("prefix"), "ff00");
        assert_eq!(resolve_ref("task", &ids, "a1b2").expect("exact"), "a1b2");
        assert!(resolve_ref("task", &ids, "a1").is_err());
        assert!(resolve_ref("task", &ids, "zz").is_err());
    }
}
