use std::collections::{
  BTreeMap,
  HashSet
};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate
};
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::datetime::shift_month;
use crate::task::{
  List,
  ListId,
  Priority,
  Task
};

/// Computed lists defined by a
/// predicate rather than membership.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum SmartFilter {
  Upcoming,
  Overdue,
  High,
  NoDue
}

impl SmartFilter {
  pub const ALL: [SmartFilter; 4] = [
    SmartFilter::Upcoming,
    SmartFilter::Overdue,
    SmartFilter::High,
    SmartFilter::NoDue
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | SmartFilter::Upcoming => {
        "upcoming"
      }
      | SmartFilter::Overdue => "overdue",
      | SmartFilter::High => "high",
      | SmartFilter::NoDue => "nodue"
    }
  }

  pub fn title(self) -> &'static str {
    match self {
      | SmartFilter::Upcoming => {
        "Upcoming"
      }
      | SmartFilter::Overdue => "Overdue",
      | SmartFilter::High => {
        "High Priority"
      }
      | SmartFilter::NoDue => {
        "No Due Date"
      }
    }
  }
}

impl FromStr for SmartFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    SmartFilter::ALL
      .into_iter()
      .find(|f| {
        f.as_str()
          .eq_ignore_ascii_case(s.trim())
      })
      .ok_or_else(|| {
        anyhow!(
          "unknown smart filter: {s}"
        )
      })
  }
}

/// The active view, persisted as
/// `{ "type": ..., "id": ... }`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(
  tag = "type",
  content = "id",
  rename_all = "lowercase"
)]
pub enum ViewDescriptor {
  #[default]
  All,
  Today,
  List(ListId),
  Smart(SmartFilter),
  Calendar
}

impl ViewDescriptor {
  pub fn is_calendar(&self) -> bool {
    matches!(
      self,
      ViewDescriptor::Calendar
    )
  }

  pub fn title(
    &self,
    lists: &[List]
  ) -> String {
    match self {
      | ViewDescriptor::All => {
        "All Tasks".to_string()
      }
      | ViewDescriptor::Today => {
        "Today's Focus".to_string()
      }
      | ViewDescriptor::List(id) => lists
        .iter()
        .find(|l| &l.id == id)
        .map(|l| l.name.clone())
        .unwrap_or_else(|| {
          format!("List {id}")
        }),
      | ViewDescriptor::Smart(f) => {
        f.title().to_string()
      }
      | ViewDescriptor::Calendar => {
        "Calendar".to_string()
      }
    }
  }
}

impl fmt::Display for ViewDescriptor {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | ViewDescriptor::All => {
        f.write_str("all")
      }
      | ViewDescriptor::Today => {
        f.write_str("today")
      }
      | ViewDescriptor::List(id) => {
        write!(f, "list:{id}")
      }
      | ViewDescriptor::Smart(filter) => {
        f.write_str(filter.as_str())
      }
      | ViewDescriptor::Calendar => {
        f.write_str("calendar")
      }
    }
  }
}

impl FromStr for ViewDescriptor {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let token = s.trim();
    if let Some(id) =
      token.strip_prefix("list:")
    {
      if id.is_empty() {
        return Err(anyhow!(
          "list view needs an id: \
           list:<id>"
        ));
      }
      return Ok(ViewDescriptor::List(
        ListId::from(id)
      ));
    }
    if let Some(name) =
      token.strip_prefix("smart:")
    {
      return name
        .parse()
        .map(ViewDescriptor::Smart);
    }

    match token
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(ViewDescriptor::All),
      | "today" => {
        Ok(ViewDescriptor::Today)
      }
      | "calendar" => {
        Ok(ViewDescriptor::Calendar)
      }
      | other => other
        .parse()
        .map(ViewDescriptor::Smart)
        .map_err(|_| {
          anyhow!(
            "unknown view: {s} \
             (expected all, today, \
             calendar, list:<id>, \
             upcoming, overdue, high \
             or nodue)"
          )
        })
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum SortMode {
  #[default]
  Date,
  Priority
}

impl FromStr for SortMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "date" | "due" => {
        Ok(SortMode::Date)
      }
      | "priority" | "prio" => {
        Ok(SortMode::Priority)
      }
      | other => Err(anyhow!(
        "unknown sort mode: {other} \
         (expected date or priority)"
      ))
    }
  }
}

/// Month shown by the calendar view.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub struct CalendarCursor {
  pub year:  i32,
  pub month: u32
}

impl CalendarCursor {
  pub fn containing(
    date: NaiveDate
  ) -> Self {
    Self {
      year:  date.year(),
      month: date.month()
    }
  }

  #[must_use]
  pub fn shifted(
    self,
    step: i32
  ) -> Self {
    let (year, month) = shift_month(
      self.year, self.month, step
    );
    Self {
      year,
      month
    }
  }
}

/// Transient view state; only
/// `current` is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
  pub current:  ViewDescriptor,
  pub calendar: CalendarCursor,
  pub search:   String,
  pub sort:     SortMode
}

impl ViewState {
  pub fn new(
    current: ViewDescriptor,
    today: NaiveDate
  ) -> Self {
    Self {
      current,
      calendar: CalendarCursor::containing(
        today
      ),
      search: String::new(),
      sort: SortMode::default()
    }
  }
}

/// A view filter composed with free
/// text search and a sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
  pub view:   ViewDescriptor,
  pub search: String,
  pub sort:   SortMode
}

impl ViewQuery {
  pub fn new(
    view: ViewDescriptor
  ) -> Self {
    Self {
      view,
      ..Self::default()
    }
  }

  #[must_use]
  pub fn search(
    mut self,
    text: impl Into<String>
  ) -> Self {
    self.search = text.into();
    self
  }

  #[must_use]
  pub fn sort(
    mut self,
    sort: SortMode
  ) -> Self {
    self.sort = sort;
    self
  }

  /// Filters by view, then narrows by
  /// search, then sorts. The sort is
  /// stable so ties keep store order.
  #[tracing::instrument(skip(
    self, tasks, lists
  ), fields(view = %self.view))]
  pub fn run<'a>(
    &self,
    tasks: &'a [Task],
    lists: &[List],
    today: NaiveDate
  ) -> Vec<&'a Task> {
    let archived =
      archived_list_ids(lists);
    let needle = self
      .search
      .trim()
      .to_lowercase();

    let mut out: Vec<&Task> = tasks
      .iter()
      .filter(|task| {
        matches_view(
          &self.view, task, &archived,
          today
        )
      })
      .filter(|task| {
        needle.is_empty()
          || task
            .title
            .to_lowercase()
            .contains(&needle)
      })
      .collect();

    sort_tasks(&mut out, self.sort);
    trace!(
      count = out.len(),
      "view query evaluated"
    );
    out
  }
}

fn archived_list_ids(
  lists: &[List]
) -> HashSet<&ListId> {
  lists
    .iter()
    .filter(|l| l.archived)
    .map(|l| &l.id)
    .collect()
}

fn matches_view(
  view: &ViewDescriptor,
  task: &Task,
  archived: &HashSet<&ListId>,
  today: NaiveDate
) -> bool {
  if let ViewDescriptor::List(id) = view
  {
    return task.list_id.as_ref()
      == Some(id);
  }

  let in_archived_list = task
    .list_id
    .as_ref()
    .is_some_and(|id| {
      archived.contains(id)
    });
  if in_archived_list {
    return false;
  }

  match view {
    | ViewDescriptor::All
    | ViewDescriptor::Calendar
    | ViewDescriptor::List(_) => true,
    | ViewDescriptor::Today => {
      task.due_date == Some(today)
    }
    | ViewDescriptor::Smart(filter) => {
      matches_smart(
        *filter, task, today
      )
    }
  }
}

fn matches_smart(
  filter: SmartFilter,
  task: &Task,
  today: NaiveDate
) -> bool {
  match filter {
    | SmartFilter::Upcoming => task
      .due_date
      .is_some_and(|due| due > today),
    | SmartFilter::Overdue => {
      !task.completed
        && task
          .due_date
          .is_some_and(|due| {
            due < today
          })
    }
    | SmartFilter::High => {
      task.priority == Priority::High
    }
    | SmartFilter::NoDue => {
      task.due_date.is_none()
    }
  }
}

fn sort_tasks(
  tasks: &mut [&Task],
  sort: SortMode
) {
  match sort {
    | SortMode::Date => {
      // Undated tasks go last; within a
      // day untimed tasks follow timed.
      tasks.sort_by_key(|t| {
        (
          t.due_date.is_none(),
          t.due_date,
          t.time.is_none(),
          t.time
        )
      });
    }
    | SortMode::Priority => {
      tasks.sort_by_key(|t| {
        t.priority.rank()
      });
    }
  }
}

/// Tasks with a due date inside the
/// cursor's month, keyed by day.
pub fn calendar_month<'a>(
  tasks: &'a [Task],
  lists: &[List],
  cursor: CalendarCursor
) -> BTreeMap<NaiveDate, Vec<&'a Task>>
{
  let archived =
    archived_list_ids(lists);
  let mut days: BTreeMap<
    NaiveDate,
    Vec<&Task>
  > = BTreeMap::new();

  for task in tasks {
    let Some(due) = task.due_date else {
      continue;
    };
    if due.year() != cursor.year
      || due.month() != cursor.month
    {
      continue;
    }
    if task
      .list_id
      .as_ref()
      .is_some_and(|id| {
        archived.contains(id)
      })
    {
      continue;
    }
    days.entry(due).or_default().push(task);
  }

  days
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveTime
  };

  use super::{
    CalendarCursor,
    SmartFilter,
    SortMode,
    ViewDescriptor,
    ViewQuery,
    calendar_month
  };
  use crate::task::{
    List,
    ListId,
    Priority,
    Task
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
  }

  fn task(
    title: &str,
    due: Option<NaiveDate>
  ) -> Task {
    let mut t =
      Task::new(title.to_string(), None);
    t.due_date = due;
    t
  }

  fn titles(out: &[&Task]) -> Vec<String> {
    out
      .iter()
      .map(|t| t.title.clone())
      .collect()
  }

  fn fixture() -> Vec<Task> {
    let mut done =
      task("done", Some(date(2024, 1, 1)));
    done.completed = true;
    let late =
      task("late", Some(date(2024, 1, 2)));
    let future = task(
      "future",
      Some(date(2099, 1, 1))
    );
    vec![done, late, future]
  }

  #[test]
  fn overdue_and_upcoming_relative_to_today()
  {
    let tasks = fixture();
    let today = date(2024, 6, 1);

    let overdue = ViewQuery::new(
      ViewDescriptor::Smart(
        SmartFilter::Overdue
      )
    )
    .run(&tasks, &[], today);
    assert_eq!(titles(&overdue), ["late"]);

    let upcoming = ViewQuery::new(
      ViewDescriptor::Smart(
        SmartFilter::Upcoming
      )
    )
    .run(&tasks, &[], today);
    assert_eq!(
      titles(&upcoming),
      ["future"]
    );
  }

  #[test]
  fn today_matches_calendar_date() {
    let tasks = fixture();
    let out =
      ViewQuery::new(ViewDescriptor::Today)
        .run(&tasks, &[], date(2024, 1, 1));
    assert_eq!(titles(&out), ["done"]);
  }

  #[test]
  fn search_narrows_list_view() {
    let list_a = ListId::from("A");
    let mut tasks: Vec<Task> = [
      "Buy milk",
      "Buy eggs",
      "Clean house"
    ]
    .into_iter()
    .map(|title| {
      let mut t = task(title, None);
      t.list_id = Some(list_a.clone());
      t
    })
    .collect();
    tasks.push(task("Buy bread", None));

    let out = ViewQuery::new(
      ViewDescriptor::List(list_a)
    )
    .search("buy")
    .run(&tasks, &[], date(2024, 6, 1));
    assert_eq!(
      titles(&out),
      ["Buy milk", "Buy eggs"]
    );
  }

  #[test]
  fn date_sort_puts_undated_last() {
    let mut timed =
      task("timed", Some(date(2024, 3, 1)));
    timed.time =
      NaiveTime::from_hms_opt(9, 0, 0);
    let tasks = vec![
      task("undated", None),
      task("later", Some(date(2024, 5, 1))),
      task("untimed", Some(date(2024, 3, 1))),
      timed,
    ];

    let out =
      ViewQuery::new(ViewDescriptor::All)
        .run(&tasks, &[], date(2024, 1, 1));
    assert_eq!(
      titles(&out),
      ["timed", "untimed", "later", "undated"]
    );
  }

  #[test]
  fn priority_sort_is_stable() {
    let mut a = task("a", None);
    a.priority = Priority::Low;
    let mut b = task("b", None);
    b.priority = Priority::High;
    let c = task("c", None);
    let mut d = task("d", None);
    d.priority = Priority::High;
    let tasks = vec![a, b, c, d];

    let out =
      ViewQuery::new(ViewDescriptor::All)
        .sort(SortMode::Priority)
        .run(&tasks, &[], date(2024, 1, 1));
    assert_eq!(
      titles(&out),
      ["b", "d", "c", "a"]
    );
  }

  #[test]
  fn archived_list_hidden_except_explicit_view()
  {
    let mut archived = List::new(
      "Old".to_string(),
      None,
      None
    );
    archived.archived = true;
    let mut hidden = task("hidden", None);
    hidden.list_id =
      Some(archived.id.clone());
    let mut dangling = task("dangling", None);
    dangling.list_id =
      Some(ListId::from("gone"));
    let tasks = vec![hidden, dangling];
    let lists = vec![archived.clone()];
    let today = date(2024, 1, 1);

    let all =
      ViewQuery::new(ViewDescriptor::All)
        .run(&tasks, &lists, today);
    assert_eq!(titles(&all), ["dangling"]);

    let explicit = ViewQuery::new(
      ViewDescriptor::List(archived.id)
    )
    .run(&tasks, &lists, today);
    assert_eq!(
      titles(&explicit),
      ["hidden"]
    );
  }

  #[test]
  fn parses_view_tokens() {
    assert_eq!(
      "list:work"
        .parse::<ViewDescriptor>()
        .unwrap(),
      ViewDescriptor::List(ListId::from(
        "work"
      ))
    );
    assert_eq!(
      "NoDue"
        .parse::<ViewDescriptor>()
        .unwrap(),
      ViewDescriptor::Smart(
        SmartFilter::NoDue
      )
    );
    assert!(
      "list:"
        .parse::<ViewDescriptor>()
        .is_err()
    );
    assert_eq!(
      ViewDescriptor::List(ListId::from(
        "x"
      ))
      .to_string(),
      "list:x"
    );
  }

  #[test]
  fn view_descriptor_wire_shape() {
    let value = serde_json::to_value(
      ViewDescriptor::Smart(
        SmartFilter::Overdue
      )
    )
    .unwrap();
    assert_eq!(
      value,
      serde_json::json!({"type": "smart", "id": "overdue"})
    );
    let parsed: ViewDescriptor =
      serde_json::from_str(
        r#"{"type":"today"}"#
      )
      .unwrap();
    assert_eq!(
      parsed,
      ViewDescriptor::Today
    );
  }

  #[test]
  fn calendar_groups_by_day_within_month()
  {
    let tasks = vec![
      task("a", Some(date(2024, 2, 3))),
      task("b", Some(date(2024, 2, 3))),
      task("c", Some(date(2024, 3, 1))),
      task("d", None),
    ];
    let days = calendar_month(
      &tasks,
      &[],
      CalendarCursor {
        year:  2024,
        month: 2
      }
    );
    assert_eq!(days.len(), 1);
    assert_eq!(
      titles(&days[&date(2024, 2, 3)]),
      ["a", "b"]
    );
  }
}
