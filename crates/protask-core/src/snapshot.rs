use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::task::{List, Task};
use crate::view::ViewDescriptor;

/// Newest document layout this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Title given to persisted tasks whose title is blank.
pub const UNTITLED: &str = "Untitled";

/// The persisted document. The selection set is transient and never part of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default)]
    pub lists: Vec<List>,

    #[serde(default)]
    pub todos: Vec<Task>,

    #[serde(default)]
    pub current_view: ViewDescriptor,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            lists: vec![List::seed()],
            todos: vec![],
            current_view: ViewDescriptor::default(),
        }
    }
}

impl Snapshot {
    pub fn encode(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(StoreError::Serialize)
    }

    /// Parses and validates a document, upgrading older layouts.
    ///
    /// Accepts the current object layout, version-less objects, and the bare task
    /// array older builds wrote. Newer schema versions are rejected.
    #[tracing::instrument(skip(raw), fields(bytes = raw.len()))]
    pub fn decode(raw: &str) -> StoreResult<Self> {
        let snapshot = Self::parse(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Parses the persisted blob, repairing entries [`Snapshot::validate`] would
    /// reject instead of failing the whole document.
    ///
    /// Tasks without an id are dropped, the first of any duplicate task or list
    /// id wins, and blank titles become [`UNTITLED`].
    #[tracing::instrument(skip(raw), fields(bytes = raw.len()))]
    pub fn recover(raw: &str) -> StoreResult<Self> {
        let mut snapshot = Self::parse(raw)?;
        snapshot.repair();
        Ok(snapshot)
    }

    fn parse(raw: &str) -> StoreResult<Self> {
        let value: Value = serde_json::from_str(raw).map_err(StoreError::Deserialize)?;

        let mut snapshot = match value {
            Value::Array(_) => {
                let todos: Vec<Task> =
                    serde_json::from_value(value).map_err(StoreError::Deserialize)?;
                info!(count = todos.len(), "upgrading legacy task array");
                Snapshot {
                    todos,
                    ..Snapshot::default()
                }
            }
            Value::Object(map) => {
                let found = map
                    .get("schemaVersion")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if found > u64::from(SCHEMA_VERSION) {
                    return Err(StoreError::UnsupportedSchema {
                        found: u32::try_from(found).unwrap_or(u32::MAX),
                        supported: SCHEMA_VERSION,
                    });
                }
                if !map.contains_key("todos") {
                    return Err(StoreError::invalid_snapshot("missing \"todos\" array"));
                }
                serde_json::from_value(Value::Object(map)).map_err(StoreError::Deserialize)?
            }
            _ => {
                return Err(StoreError::invalid_snapshot(
                    "expected a JSON object or task array",
                ));
            }
        };

        if snapshot.schema_version < SCHEMA_VERSION {
            debug!(from = snapshot.schema_version, to = SCHEMA_VERSION, "upgrading schema");
            snapshot.schema_version = SCHEMA_VERSION;
        }
        Ok(snapshot)
    }

    fn repair(&mut self) {
        let mut seen = HashSet::new();
        self.todos.retain_mut(|task| {
            if task.id.as_str().trim().is_empty() {
                warn!(title = %task.title, "dropping persisted task without an id");
                return false;
            }
            if !seen.insert(task.id.clone()) {
                warn!(id = %task.id, "dropping persisted task with a duplicate id");
                return false;
            }
            if task.title.trim().is_empty() {
                warn!(id = %task.id, "persisted task has a blank title");
                task.title = UNTITLED.to_string();
            }
            true
        });

        let mut seen_lists = HashSet::new();
        self.lists.retain(|list| {
            let first = seen_lists.insert(list.id.clone());
            if !first {
                warn!(id = %list.id, "dropping persisted list with a duplicate id");
            }
            first
        });
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for task in &self.todos {
            if task.id.as_str().trim().is_empty() {
                return Err(StoreError::invalid_snapshot("task with empty id"));
            }
            if !seen.insert(&task.id) {
                return Err(StoreError::invalid_snapshot(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
            if task.title.trim().is_empty() {
                return Err(StoreError::invalid_snapshot(format!(
                    "task {} has an empty title",
                    task.id
                )));
            }
        }

        let mut seen_lists = HashSet::new();
        for list in &self.lists {
            if !seen_lists.insert(&list.id) {
                return Err(StoreError::invalid_snapshot(format!(
                    "duplicate list id {}",
                    list.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{SEED_LIST_ID, TaskId};

    #[test]
    fn default_has_seed_list() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.lists.len(), 1);
        assert_eq!(snapshot.lists[0].id.as_str(), SEED_LIST_ID);
        assert!(snapshot.todos.is_empty());
    }

    #[test]
    fn decodes_legacy_array() {
        let raw = r#"[{"id":1,"title":"Project Kickoff","date":"2024-06-01","time":"09:00","completed":false}]"#;
        let snapshot = Snapshot::decode(raw).unwrap();
        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        assert_eq!(snapshot.todos.len(), 1);
        assert_eq!(snapshot.todos[0].id, TaskId::from("1"));
        assert_eq!(snapshot.lists.len(), 1);
    }

    #[test]
    fn rejects_future_schema() {
        let raw = r#"{"schemaVersion":99,"lists":[],"todos":[]}"#;
        let err = Snapshot::decode(raw).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchema { found: 99, .. }));
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_shapes() {
        let dup = r#"{"todos":[{"id":"a","title":"x"},{"id":"a","title":"y"}]}"#;
        assert!(matches!(
            Snapshot::decode(dup).unwrap_err(),
            StoreError::InvalidSnapshot(_)
        ));
        assert!(Snapshot::decode("\"hello\"").is_err());
        assert!(Snapshot::decode(r#"{"lists":[]}"#).is_err());
        assert!(matches!(
            Snapshot::decode("{not json").unwrap_err(),
            StoreError::Deserialize(_)
        ));
    }

    #[test]
    fn recover_repairs_blank_titles_in_legacy_array() {
        let raw = r#"[{"id":1,"title":"Project Kickoff"},{"id":2,"title":"Client Review"},{"id":3,"title":" "}]"#;
        assert!(Snapshot::decode(raw).is_err());

        let snapshot = Snapshot::recover(raw).unwrap();
        let titles: Vec<&str> = snapshot.todos.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Project Kickoff", "Client Review", UNTITLED]);
        snapshot.validate().unwrap();
    }

    #[test]
    fn recover_keeps_first_of_duplicate_ids() {
        let raw = r#"[{"id":7,"title":"first"},{"id":7,"title":"second"},{"id":"","title":"orphan"}]"#;
        let snapshot = Snapshot::recover(raw).unwrap();
        assert_eq!(snapshot.todos.len(), 1);
        assert_eq!(snapshot.todos[0].title, "first");

        let lists = r#"{"lists":[{"id":"w","name":"Work"},{"id":"w","name":"Copy"}],"todos":[]}"#;
        let snapshot = Snapshot::recover(lists).unwrap();
        assert_eq!(snapshot.lists.len(), 1);
        assert_eq!(snapshot.lists[0].name, "Work");
    }

    #[test]
    fn recover_still_rejects_unparsable_blobs() {
        assert!(Snapshot::recover("{not json").is_err());
        assert!(matches!(
            Snapshot::recover(r#"{"schemaVersion":99,"todos":[]}"#).unwrap_err(),
            StoreError::UnsupportedSchema { .. }
        ));
    }

    #[test]
    fn upgrades_versionless_object() {
        let raw = r#"{"lists":[{"id":"w","name":"Work"}],"todos":[],"currentView":{"type":"list","id":"w"}}"#;
        let snapshot = Snapshot::decode(raw).unwrap();
        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        assert!(!snapshot.lists[0].archived);
        assert_eq!(snapshot.current_view.to_string(), "list:w");
    }
}
