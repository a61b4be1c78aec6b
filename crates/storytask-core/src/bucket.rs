use chrono::NaiveDate;
use serde::Serialize;

use crate::datetime::week_bounds;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
  Overdue,
  Today,
  ThisWeek,
  Unscheduled,
  Later
}

impl Bucket {
  /// Display order of the board.
  pub const ORDER: [Bucket; 5] = [
    Bucket::Overdue,
    Bucket::Today,
    Bucket::ThisWeek,
    Bucket::Unscheduled,
    Bucket::Later
  ];

  pub fn title(self) -> &'static str {
    match self {
      | Bucket::Overdue => "Overdue",
      | Bucket::Today => "Today",
      | Bucket::ThisWeek => "This week",
      | Bucket::Unscheduled => {
        "Unscheduled"
      }
      | Bucket::Later => "Later"
    }
  }

  /// Empty overdue and later sections are hidden.
  pub fn shown_when_empty(
    self
  ) -> bool {
    !matches!(
      self,
      Bucket::Overdue | Bucket::Later
    )
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Section<'a> {
  pub bucket: Bucket,
  pub tasks:  Vec<&'a Task>
}

/// Resolved "today" and its Monday..=Sunday week.
#[derive(Debug, Clone, Copy)]
pub struct BucketClock {
  pub today:      NaiveDate,
  pub week_start: NaiveDate,
  pub week_end:   NaiveDate
}

impl BucketClock {
  pub fn new(today: NaiveDate) -> Self {
    let (week_start, week_end) =
      week_bounds(today);
    Self {
      today,
      week_start,
      week_end
    }
  }

  pub fn classify(
    &self,
    deadline: Option<NaiveDate>
  ) -> Bucket {
    let Some(deadline) = deadline else {
      return Bucket::Unscheduled;
    };
    if deadline < self.today {
      Bucket::Overdue
    } else if deadline == self.today {
      Bucket::Today
    } else if deadline >= self.week_start
      && deadline <= self.week_end
    {
      Bucket::ThisWeek
    } else {
      Bucket::Later
    }
  }
}

/// Partitions the todo tasks of `ordered` into board sections. Done tasks
/// are skipped; every todo task lands in exactly one section, keeping the
/// incoming (position) order.
pub fn sections<'a, I>(
  ordered: I,
  today: NaiveDate
) -> Vec<Section<'a>>
where
  I: IntoIterator<Item = &'a Task>
{
  let clock = BucketClock::new(today);
  let mut slots: [Vec<&'a Task>; 5] =
    Default::default();

  for task in ordered {
    if task.is_done() {
      continue;
    }
    let bucket =
      clock.classify(task.deadline);
    slots[slot_index(bucket)]
      .push(task);
  }

  Bucket::ORDER
    .into_iter()
    .zip(slots)
    .filter(|(bucket, tasks)| {
      !tasks.is_empty()
        || bucket.shown_when_empty()
    })
    .map(|(bucket, tasks)| Section {
      bucket,
      tasks
    })
    .collect()
}

fn slot_index(bucket: Bucket) -> usize {
  match bucket {
    | Bucket::Overdue => 0,
    | Bucket::Today => 1,
    | Bucket::ThisWeek => 2,
    | Bucket::Unscheduled => 3,
    | Bucket::Later => 4
  }
}
