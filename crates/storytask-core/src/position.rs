use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::task::{PositionUpdate, Task, TaskId, TaskStatus};

/// Gap left between neighbours so inserts at either end never touch
/// existing rows.
pub const POSITION_STEP: f64 = 1000.0;

pub fn append_position<I>(existing: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    existing.into_iter().reduce(f64::max).unwrap_or(0.0) + POSITION_STEP
}

pub fn prepend_position<I>(existing: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    existing.into_iter().reduce(f64::min).unwrap_or(0.0) - POSITION_STEP
}

/// Ascending position; equal positions fall back to id order.
pub fn compare_by_position(a: &Task, b: &Task) -> Ordering {
    a.position
        .total_cmp(&b.position)
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_by_position(tasks: &mut [Task]) {
    tasks.sort_by(compare_by_position);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// Take the slot currently held by this task.
    Item(TaskId),
    /// Go after the last task of the given list.
    End(TaskStatus),
}

/// Splices `dragged` into the destination list and densely re-indexes it.
///
/// Within one list the dragged task lands at the index the target held
/// before the move (the usual remove-then-insert splice). A task dragged in
/// from the other status list adopts the destination status, gaining or
/// losing its completion timestamp accordingly.
///
/// Returns `None` when either task is unknown or the task is dropped on
/// itself.
pub fn reorder(
    tasks: &[Task],
    dragged: &TaskId,
    target: &DropTarget,
    now: DateTime<Utc>,
) -> Option<Vec<PositionUpdate>> {
    let moving = tasks.iter().find(|task| &task.id == dragged)?;

    let dest_status = match target {
        DropTarget::Item(target_id) => {
            if target_id == dragged {
                return None;
            }
            tasks.iter().find(|task| &task.id == target_id)?.status
        }
        DropTarget::End(status) => *status,
    };

    let mut list: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.status == dest_status)
        .collect();
    list.sort_by(|a, b| compare_by_position(a, b));

    let slot = match target {
        DropTarget::Item(target_id) => list.iter().position(|task| &task.id == target_id)?,
        DropTarget::End(_) => list.len(),
    };

    if let Some(from) = list.iter().position(|task| task.id == moving.id) {
        list.remove(from);
    }
    let slot = slot.min(list.len());
    list.insert(slot, moving);

    debug!(
        dragged = %dragged,
        slot,
        len = list.len(),
        status = ?dest_status,
        "re-indexing list after drop"
    );

    let updates = list
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let completed_at = match dest_status {
                TaskStatus::Done if task.status == TaskStatus::Done => task.completed_at,
                TaskStatus::Done => Some(now),
                TaskStatus::Todo => None,
            };
            PositionUpdate {
                id: task.id.clone(),
                position: (index + 1) as f64 * POSITION_STEP,
                status: dest_status,
                completed_at,
            }
        })
        .collect();

    Some(updates)
}
