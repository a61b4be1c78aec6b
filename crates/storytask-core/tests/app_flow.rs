use chrono::{Duration, NaiveDate, TimeZone, Utc};
use storytask_core::app::{AppSettings, AppState, Outcome, ProjectInput, TaskInput, Variant};
use storytask_core::bucket::Bucket;
use storytask_core::edit::EditKey;
use storytask_core::position::DropTarget;
use storytask_core::store::{MemoryStore, StoreOp};
use storytask_core::task::{Project, ProjectId, Task, TaskColor, TaskId, TaskStatus};

fn task(id: &str, position: f64) -> Task {
    Task {
        id: TaskId(id.to_string()),
        title: format!("task {id}"),
        story: None,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).single().expect("valid date"),
        completed_at: None,
        color: TaskColor::Red,
        position,
        deadline: None,
        status: TaskStatus::Todo,
        project_id: None,
        points: None,
    }
}

fn project(id: &str) -> Project {
    Project {
        id: ProjectId(id.to_string()),
        name: format!("project {id}"),
        description: None,
        color: "#1f7a8c".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("valid date"),
    }
}

fn titled(title: &str) -> TaskInput {
    TaskInput {
        title: title.to_string(),
        ..TaskInput::default()
    }
}

async fn loaded(
    tasks: Vec<Task>,
    projects: Vec<Project>,
    variant: Variant,
) -> AppState<MemoryStore> {
    let store = MemoryStore::with_rows(tasks, projects);
    let mut state = AppState::new(store, AppSettings::for_variant(variant));
    assert_eq!(state.load().await, Outcome::Applied);
    state
}

fn ids(tasks: &[&Task]) -> Vec<String> {
    tasks.iter().map(|task| task.id.0.clone()).collect()
}

#[tokio::test]
async fn story_board_appends_and_minimal_list_prepends() {
    let mut story = loaded(vec![], vec![], Variant::Story).await;
    for title in ["first", "second", "third"] {
        assert_eq!(story.add_task(titled(title)).await, Outcome::Applied);
    }
    let titles: Vec<&str> = story
        .todo_tasks()
        .iter()
        .map(|task| task.title.as_str())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);

    let mut minimal = loaded(vec![], vec![], Variant::Minimal).await;
    for title in ["first", "second", "third"] {
        assert_eq!(minimal.add_task(titled(title)).await, Outcome::Applied);
    }
    let titles: Vec<&str> = minimal
        .todo_tasks()
        .iter()
        .map(|task| task.title.as_str())
        .collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
    assert!(
        minimal
            .tasks()
            .iter()
            .all(|task| !task.id.0.starts_with("local-"))
    );
    assert_eq!(minimal.store().tasks().len(), 3);
}

#[tokio::test]
async fn blank_title_is_ignored_without_a_store_call() {
    let mut state = loaded(vec![], vec![], Variant::Story).await;
    assert_eq!(state.add_task(titled("   ")).await, Outcome::Ignored);
    assert_eq!(state.store().calls(StoreOp::InsertTask), 0);
    assert!(state.tasks().is_empty());
}

#[tokio::test]
async fn failed_optimistic_insert_restores_the_exact_list() {
    let mut state = loaded(
        vec![task("a", 1000.0), task("b", 2000.0)],
        vec![],
        Variant::Minimal,
    )
    .await;
    let before = state.tasks().to_vec();

    state.store().fail_next(StoreOp::InsertTask);
    assert_eq!(state.add_task(titled("doomed")).await, Outcome::Failed);

    assert_eq!(state.tasks(), before.as_slice());
    assert!(state.last_error().is_some());
    assert_eq!(state.store().tasks().len(), 2);
}

#[tokio::test]
async fn failed_confirmed_insert_leaves_the_list_untouched() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    state.store().fail_next(StoreOp::InsertTask);
    assert_eq!(state.add_task(titled("nope")).await, Outcome::Failed);
    assert_eq!(state.tasks().len(), 1);
    assert!(
        state
            .last_error()
            .is_some_and(|message| message.contains("insert task"))
    );

    state.dismiss_error();
    assert!(state.last_error().is_none());
}

#[tokio::test]
async fn toggle_stamps_and_clears_completion_time() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    let id = TaskId("a".to_string());

    assert_eq!(state.toggle_task(&id).await, Outcome::Applied);
    let done = state.task(&id).expect("task").clone();
    assert_eq!(done.status, TaskStatus::Done);
    assert!(done.completed_at.is_some());
    assert_eq!(state.store().tasks()[0].status, TaskStatus::Done);
    assert!(state.todo_tasks().is_empty());

    assert_eq!(state.toggle_task(&id).await, Outcome::Applied);
    let todo = state.task(&id).expect("task");
    assert_eq!(todo.status, TaskStatus::Todo);
    assert!(todo.completed_at.is_none());
    assert!(state.store().tasks()[0].completed_at.is_none());
}

#[tokio::test]
async fn failed_optimistic_toggle_rolls_back() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Minimal).await;
    let before = state.tasks().to_vec();

    state.store().fail_next(StoreOp::UpdateTask);
    let outcome = state.toggle_task(&TaskId("a".to_string())).await;
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(state.tasks(), before.as_slice());
}

#[tokio::test]
async fn done_list_shows_most_recent_completion_first() {
    let base = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single().expect("valid date");
    let mut older = task("older", 1000.0);
    older.status = TaskStatus::Done;
    older.completed_at = Some(base);
    let mut newer = task("newer", 2000.0);
    newer.status = TaskStatus::Done;
    newer.completed_at = Some(base + Duration::hours(3));

    let state = loaded(
        vec![older, newer, task("open", 3000.0)],
        vec![],
        Variant::Story,
    )
    .await;
    assert_eq!(ids(&state.done_tasks()), vec!["newer", "older"]);
    assert_eq!(ids(&state.todo_tasks()), vec!["open"]);
}

#[tokio::test]
async fn drag_persists_one_batch_and_reindexes() {
    let mut state = loaded(
        vec![task("a", 1000.0), task("b", 2000.0), task("c", 3000.0)],
        vec![],
        Variant::Story,
    )
    .await;

    let outcome = state
        .move_task(&TaskId("c".to_string()), &DropTarget::Item(TaskId("a".to_string())))
        .await;
    assert_eq!(outcome, Outcome::Applied);
    assert_eq!(state.store().calls(StoreOp::UpsertPositions), 1);
    assert_eq!(ids(&state.todo_tasks()), vec!["c", "a", "b"]);

    let mut stored = state.store().tasks();
    stored.sort_by(|a, b| a.position.total_cmp(&b.position));
    let stored_ids: Vec<&str> = stored.iter().map(|task| task.id.as_str()).collect();
    assert_eq!(stored_ids, vec!["c", "a", "b"]);
}

#[tokio::test]
async fn drag_onto_done_list_completes_the_task() {
    let mut state = loaded(
        vec![task("a", 1000.0), task("b", 2000.0)],
        vec![],
        Variant::Story,
    )
    .await;

    let outcome = state
        .move_task(&TaskId("b".to_string()), &DropTarget::End(TaskStatus::Done))
        .await;
    assert_eq!(outcome, Outcome::Applied);
    let moved = state.task(&TaskId("b".to_string())).expect("task");
    assert_eq!(moved.status, TaskStatus::Done);
    assert!(moved.completed_at.is_some());
    assert_eq!(ids(&state.todo_tasks()), vec!["a"]);
}

#[tokio::test]
async fn failed_reorder_restores_previous_order() {
    let mut state = loaded(
        vec![task("a", 1000.0), task("b", 2000.0), task("c", 3000.0)],
        vec![],
        Variant::Minimal,
    )
    .await;
    let before = state.tasks().to_vec();

    state.store().fail_next(StoreOp::UpsertPositions);
    let outcome = state
        .move_task(&TaskId("a".to_string()), &DropTarget::Item(TaskId("c".to_string())))
        .await;
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(state.tasks(), before.as_slice());
    assert_eq!(ids(&state.todo_tasks()), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn dropping_a_task_on_itself_is_a_no_op() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    let id = TaskId("a".to_string());
    let outcome = state.move_task(&id, &DropTarget::Item(id.clone())).await;
    assert_eq!(outcome, Outcome::Ignored);
    assert_eq!(state.store().calls(StoreOp::UpsertPositions), 0);
}

#[tokio::test]
async fn saving_an_emptied_title_keeps_edit_mode_and_skips_the_store() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    assert_eq!(
        state.start_task_edit(&TaskId("a".to_string())),
        Outcome::Applied
    );
    state.task_draft_mut().expect("draft").title = "   ".to_string();
    let calls_before = state.store().total_calls();

    assert_eq!(state.save_edit().await, Outcome::Ignored);
    assert_eq!(state.store().total_calls(), calls_before);
    assert_eq!(state.store().calls(StoreOp::UpdateTask), 0);
    assert!(state.edit().is_some());
    assert_eq!(state.tasks()[0].title, "task a");
}

#[tokio::test]
async fn failed_save_keeps_the_draft_and_sets_the_banner() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    let _ = state.start_task_edit(&TaskId("a".to_string()));
    state.task_draft_mut().expect("draft").title = "renamed".to_string();

    state.store().fail_next(StoreOp::UpdateTask);
    assert_eq!(state.save_edit().await, Outcome::Failed);
    assert!(state.last_error().is_some());
    assert_eq!(state.task_draft_mut().expect("draft").title, "renamed");
    assert_eq!(state.tasks()[0].title, "task a");

    assert_eq!(state.save_edit().await, Outcome::Applied);
    assert!(state.edit().is_none());
    assert_eq!(state.tasks()[0].title, "renamed");
    assert_eq!(state.store().tasks()[0].title, "renamed");
}

#[tokio::test]
async fn starting_a_second_edit_abandons_the_first_draft() {
    let mut state = loaded(
        vec![task("a", 1000.0), task("b", 2000.0)],
        vec![],
        Variant::Story,
    )
    .await;
    let _ = state.start_task_edit(&TaskId("a".to_string()));
    state.task_draft_mut().expect("draft").title = "half typed".to_string();

    let _ = state.start_task_edit(&TaskId("b".to_string()));
    assert_eq!(state.task_draft_mut().expect("draft").title, "task b");

    assert_eq!(state.save_edit().await, Outcome::Applied);
    assert_eq!(state.task(&TaskId("a".to_string())).expect("a").title, "task a");
}

#[tokio::test]
async fn escape_discards_and_keys_outside_a_field_are_ignored() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    let _ = state.start_task_edit(&TaskId("a".to_string()));
    state.task_draft_mut().expect("draft").title = "typed".to_string();

    assert_eq!(state.handle_key(EditKey::Enter, false).await, Outcome::Ignored);
    assert!(state.edit().is_some());

    assert_eq!(state.handle_key(EditKey::Escape, true).await, Outcome::Applied);
    assert!(state.edit().is_none());
    assert_eq!(state.tasks()[0].title, "task a");
    assert_eq!(state.store().calls(StoreOp::UpdateTask), 0);
}

#[tokio::test]
async fn enter_in_a_field_submits_the_draft() {
    let mut state = loaded(vec![task("a", 1000.0)], vec![], Variant::Story).await;
    let _ = state.start_task_edit(&TaskId("a".to_string()));
    let draft = state.task_draft_mut().expect("draft");
    draft.title = "submitted".to_string();
    draft.deadline = NaiveDate::from_ymd_opt(2024, 6, 14);

    assert_eq!(state.handle_key(EditKey::Enter, true).await, Outcome::Applied);
    assert!(state.edit().is_none());
    let saved = &state.store().tasks()[0];
    assert_eq!(saved.title, "submitted");
    assert_eq!(saved.deadline, NaiveDate::from_ymd_opt(2024, 6, 14));
}

#[tokio::test]
async fn deleting_a_project_clears_references_without_deleting_tasks() {
    let mut tasks = vec![task("a", 1000.0), task("b", 2000.0), task("c", 3000.0)];
    tasks[0].project_id = Some(ProjectId("p".to_string()));
    tasks[1].project_id = Some(ProjectId("p".to_string()));
    tasks[2].project_id = Some(ProjectId("q".to_string()));
    let mut state = loaded(tasks, vec![project("p"), project("q")], Variant::Story).await;

    let usage = state.project_usage();
    assert_eq!(usage.get(&ProjectId("p".to_string())), Some(&2));
    assert_eq!(usage.get(&ProjectId("q".to_string())), Some(&1));

    let _ = state.start_project_edit(&ProjectId("p".to_string()));
    let outcome = state.delete_project(&ProjectId("p".to_string())).await;
    assert_eq!(outcome, Outcome::Applied);

    assert_eq!(state.tasks().len(), 3);
    assert_eq!(
        state
            .tasks()
            .iter()
            .filter(|task| task.project_id.is_none())
            .count(),
        2
    );
    assert_eq!(state.projects().len(), 1);
    assert!(state.edit().is_none());

    let stored = state.store().tasks();
    assert_eq!(stored.len(), 3);
    assert_eq!(
        stored.iter().filter(|task| task.project_id.is_none()).count(),
        2
    );
}

#[tokio::test]
async fn deleting_a_project_clears_it_from_an_open_task_draft() {
    let mut linked = task("a", 1000.0);
    linked.project_id = Some(ProjectId("p".to_string()));
    let mut state = loaded(vec![linked], vec![project("p")], Variant::Story).await;

    let _ = state.start_task_edit(&TaskId("a".to_string()));
    state.task_draft_mut().expect("draft").title = "still typing".to_string();

    let outcome = state.delete_project(&ProjectId("p".to_string())).await;
    assert_eq!(outcome, Outcome::Applied);
    let draft = state.task_draft_mut().expect("draft survives");
    assert_eq!(draft.title, "still typing");
    assert!(draft.project_id.is_none());

    assert_eq!(state.save_edit().await, Outcome::Applied);
    let stored = state.store().tasks();
    assert_eq!(stored[0].title, "still typing");
    assert!(stored[0].project_id.is_none());
}

#[tokio::test]
async fn new_projects_get_the_default_color_and_can_be_renamed() {
    let mut state = loaded(vec![], vec![], Variant::Story).await;
    let input = ProjectInput {
        name: "Launch".to_string(),
        ..ProjectInput::default()
    };
    assert_eq!(state.add_project(input).await, Outcome::Applied);
    let created = state.projects()[0].clone();
    assert_eq!(created.color, "#1f7a8c");

    let _ = state.start_project_edit(&created.id);
    state.project_draft_mut().expect("draft").name = "Launch v2".to_string();
    assert_eq!(state.save_edit().await, Outcome::Applied);
    assert_eq!(state.projects()[0].name, "Launch v2");
    assert_eq!(state.store().projects()[0].name, "Launch v2");
}

#[tokio::test]
async fn failed_load_keeps_the_other_list_and_next_load_clears_the_banner() {
    let store = MemoryStore::with_rows(vec![task("a", 1000.0)], vec![project("p")]);
    store.fail_next(StoreOp::ListTasks);
    let mut state = AppState::new(store, AppSettings::default());

    assert_eq!(state.load().await, Outcome::Failed);
    assert_eq!(state.projects().len(), 1);
    assert!(state.tasks().is_empty());
    assert!(state.last_error().is_some());

    assert_eq!(state.load().await, Outcome::Applied);
    assert!(state.last_error().is_none());
    assert_eq!(state.tasks().len(), 1);
}

#[tokio::test]
async fn board_sections_follow_deadlines() {
    let today = NaiveDate::from_ymd_opt(2024, 6, 12).expect("valid date");
    let mut overdue = task("late", 1000.0);
    overdue.deadline = NaiveDate::from_ymd_opt(2024, 6, 11);
    let mut due = task("due", 2000.0);
    due.deadline = Some(today);
    let open = task("open", 3000.0);

    let state = loaded(vec![overdue, due, open], vec![], Variant::Story).await;
    let sections = state.sections(today);
    let buckets: Vec<Bucket> = sections.iter().map(|section| section.bucket).collect();
    assert_eq!(
        buckets,
        vec![
            Bucket::Overdue,
            Bucket::Today,
            Bucket::ThisWeek,
            Bucket::Unscheduled
        ]
    );
    assert_eq!(ids(&sections[0].tasks), vec!["late"]);
    assert_eq!(ids(&sections[3].tasks), vec!["open"]);
}
