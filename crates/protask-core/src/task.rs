use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::{due_date_serde, due_time_serde};

pub const SEED_LIST_ID: &str = "inbox";
pub const SEED_LIST_NAME: &str = "Inbox";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListId(String);

// Older blobs carry millisecond timestamps as numeric ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ListId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
    }
}

impl<'de> Deserialize<'de> for ListId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ListId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort rank; high sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Priority::Low),
            "m" | "med" | "medium" => Ok(Priority::Medium),
            "h" | "high" => Ok(Priority::High),
            other => Err(anyhow!("invalid priority: {other} (expected low, medium or high)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl Subtask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct List {
    pub id: ListId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl List {
    pub fn new(name: String, color: Option<String>, icon: Option<String>) -> Self {
        Self {
            id: ListId::generate(),
            name,
            color,
            icon,
            archived: false,
        }
    }

    pub fn seed() -> Self {
        Self {
            id: ListId::from(SEED_LIST_ID),
            name: SEED_LIST_NAME.to_string(),
            color: None,
            icon: None,
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    #[serde(default)]
    pub list_id: Option<ListId>,

    pub title: String,

    #[serde(
        default,
        alias = "date",
        skip_serializing_if = "Option::is_none",
        with = "due_date_serde"
    )]
    pub due_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "due_time_serde")]
    pub time: Option<NaiveTime>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(default)]
    pub notified: bool,
}

impl Task {
    pub fn new(title: String, owner: Option<String>) -> Self {
        Self {
            id: TaskId::generate(),
            list_id: None,
            title,
            due_date: None,
            time: None,
            priority: Priority::default(),
            completed: false,
            owner,
            subtasks: vec![],
            notified: false,
        }
    }

    /// Local wall-clock instant the task is due, when both date and time are set.
    pub fn due_at(&self) -> Option<NaiveDateTime> {
        Some(self.due_date?.and_time(self.time?))
    }

    pub fn subtask_progress(&self) -> (usize, usize) {
        let done = self.subtasks.iter().filter(|s| s.done).count();
        (done, self.subtasks.len())
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner.as_deref() == Some(user)
    }

    /// Merges `patch` into the task and reports whether the schedule moved.
    pub fn apply_patch(&mut self, patch: TaskPatch) -> bool {
        let before = (self.due_date, self.time);

        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(time) = patch.time {
            self.time = time;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(list_id) = patch.list_id {
            self.list_id = list_id;
        }
        if let Some(subtasks) = patch.subtasks {
            self.subtasks = subtasks;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }

        before != (self.due_date, self.time)
    }
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<Priority>,
    pub list_id: Option<ListId>,
    pub subtasks: Vec<String>,
}

impl TaskDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Field-level edit; `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due_date: Option<Option<NaiveDate>>,
    pub time: Option<Option<NaiveTime>>,
    pub priority: Option<Priority>,
    pub list_id: Option<Option<ListId>>,
    pub subtasks: Option<Vec<Subtask>>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_task_shape_deserializes() {
        let raw = r#"{"id":1717000000000,"title":"Project Kickoff","date":"2024-06-01","time":"09:00","completed":false,"owner":"User-System"}"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.id.as_str(), "1717000000000");
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(task.time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.subtasks.is_empty());
        assert!(task.list_id.is_none());
    }

    #[test]
    fn empty_date_strings_read_as_unset() {
        let raw = r#"{"id":"a","title":"x","dueDate":"","time":""}"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert!(task.due_date.is_none());
        assert!(task.time.is_none());
    }

    #[test]
    fn serializes_camel_case_fields() {
        let mut task = Task::new("Write report".to_string(), Some("me".to_string()));
        task.list_id = Some(ListId::from("work"));
        task.due_date = NaiveDate::from_ymd_opt(2024, 1, 2);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["listId"], "work");
        assert_eq!(value["dueDate"], "2024-01-02");
        assert_eq!(value["priority"], "medium");
        assert!(value.get("time").is_none());
    }

    #[test]
    fn patch_reports_schedule_change() {
        let mut task = Task::new("x".to_string(), None);
        let moved = task.apply_patch(TaskPatch {
            priority: Some(Priority::High),
            ..TaskPatch::default()
        });
        assert!(!moved);
        assert_eq!(task.priority, Priority::High);

        let moved = task.apply_patch(TaskPatch {
            time: Some(NaiveTime::from_hms_opt(8, 30, 0)),
            ..TaskPatch::default()
        });
        assert!(moved);
    }

    #[test]
    fn priority_parses_short_forms() {
        assert_eq!("H".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("med".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
        assert!(Priority::High.rank() < Priority::Low.rank());
    }
}
