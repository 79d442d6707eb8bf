use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::blob::BlobStore;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::{SCHEMA_VERSION, Snapshot};
use crate::task::{List, ListId, Priority, Subtask, Task, TaskDraft, TaskId, TaskPatch};
use crate::view::{SortMode, ViewDescriptor, ViewQuery, ViewState, calendar_month};

const EVENT_CAPACITY: usize = 64;

/// What a store observer is told after state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// This context saved (or optimistically changed) state.
    LocalChange,
    /// Another context rewrote the blob and state was reloaded from it.
    RemoteChange(RemoteChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChangeKind {
    TaskAdded,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteChange {
    pub kind: RemoteChangeKind,
    pub before: usize,
    pub after: usize,
}

impl RemoteChange {
    pub fn between(before: usize, after: usize) -> Self {
        let kind = if after > before {
            RemoteChangeKind::TaskAdded
        } else {
            RemoteChangeKind::Updated
        };
        Self {
            kind,
            before,
            after,
        }
    }
}

/// Field-level mutation applied to every selected task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkAction {
    Complete,
    Uncomplete,
    SetPriority(Priority),
    MoveToList(Option<ListId>),
}

/// Authoritative in-memory copy of the persisted blob plus transient UI state.
pub struct TaskStore<B: BlobStore> {
    blob: Arc<B>,
    lists: Vec<List>,
    todos: Vec<Task>,
    selected: BTreeSet<TaskId>,
    view: ViewState,
    user: String,
    events: broadcast::Sender<StoreEvent>,
}

impl<B: BlobStore> TaskStore<B> {
    /// Builds a store over `blob` and loads it. Never fails: unreadable or corrupt
    /// data yields the default state.
    #[tracing::instrument(skip(blob, user), fields(blob = %blob.describe()))]
    pub fn open(blob: Arc<B>, user: impl Into<String>, today: NaiveDate) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut store = Self {
            blob,
            lists: vec![],
            todos: vec![],
            selected: BTreeSet::new(),
            view: ViewState::new(ViewDescriptor::default(), today),
            user: user.into(),
            events,
        };
        store.load();
        store
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&mut self) {
        let snapshot = match self.read_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("no persisted state; starting with defaults");
                Snapshot::default()
            }
            Err(err) => {
                warn!(error = %err, "persisted state unreadable; starting with defaults");
                Snapshot::default()
            }
        };
        self.replace_state(snapshot);
        debug!(lists = self.lists.len(), todos = self.todos.len(), "loaded state");
    }

    pub(crate) fn read_snapshot(&self) -> StoreResult<Option<Snapshot>> {
        match self.blob.read()? {
            Some(raw) => Snapshot::recover(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces the blob with the full current state in one write.
    #[tracing::instrument(skip(self))]
    pub fn save(&mut self) -> StoreResult<()> {
        let raw = self.snapshot().encode()?;
        self.blob.write(&raw)?;
        debug!(todos = self.todos.len(), bytes = raw.len(), "saved state");
        self.emit(StoreEvent::LocalChange);
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            lists: self.lists.clone(),
            todos: self.todos.clone(),
            current_view: self.view.current.clone(),
        }
    }

    pub(crate) fn replace_state(&mut self, snapshot: Snapshot) {
        self.lists = snapshot.lists;
        self.todos = snapshot.todos;
        self.view.current = snapshot.current_view;
        let todos = &self.todos;
        self.selected.retain(|id| todos.iter().any(|t| &t.id == id));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        if self.events.send(event).is_err() {
            trace!("no store subscribers");
        }
    }

    pub fn blob(&self) -> &Arc<B> {
        &self.blob
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn tasks(&self) -> &[Task] {
        &self.todos
    }

    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.todos.iter().find(|t| &t.id == id)
    }

    pub fn list(&self, id: &ListId) -> Option<&List> {
        self.lists.iter().find(|l| &l.id == id)
    }

    fn task_mut(&mut self, id: &TaskId) -> StoreResult<&mut Task> {
        self.todos
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))
    }

    fn list_mut(&mut self, id: &ListId) -> StoreResult<&mut List> {
        self.lists
            .iter_mut()
            .find(|l| &l.id == id)
            .ok_or_else(|| StoreError::ListNotFound(id.clone()))
    }

    /// Resolves an exact id or a unique id prefix.
    pub fn resolve_task(&self, token: &str) -> StoreResult<TaskId> {
        let token = token.trim();
        if let Some(task) = self.todos.iter().find(|t| t.id.as_str() == token) {
            return Ok(task.id.clone());
        }
        if token.is_empty() {
            return Err(StoreError::TaskNotFound(TaskId::from(token)));
        }

        let mut matches = self.todos.iter().filter(|t| t.id.as_str().starts_with(token));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task.id.clone()),
            (Some(_), Some(_)) => Err(StoreError::validation(format!(
                "task id prefix {token} is ambiguous"
            ))),
            (None, _) => Err(StoreError::TaskNotFound(TaskId::from(token))),
        }
    }

    /// Resolves a list by id, then by case-insensitive name.
    pub fn resolve_list(&self, token: &str) -> StoreResult<ListId> {
        let token = token.trim();
        self.lists
            .iter()
            .find(|l| l.id.as_str() == token)
            .or_else(|| self.lists.iter().find(|l| l.name.eq_ignore_ascii_case(token)))
            .map(|l| l.id.clone())
            .ok_or_else(|| StoreError::ListNotFound(ListId::from(token)))
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create_task(&mut self, draft: TaskDraft) -> StoreResult<TaskId> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(StoreError::validation("Please enter a task name"));
        }

        let mut task = Task::new(title.to_string(), Some(self.user.clone()));
        task.due_date = draft.due_date;
        task.time = draft.time;
        task.priority = draft.priority.unwrap_or_default();
        task.list_id = draft.list_id;
        task.subtasks = draft
            .subtasks
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(Subtask::new)
            .collect();

        let id = task.id.clone();
        self.todos.push(task);
        self.save()?;
        info!(id = %id, "created task");
        Ok(id)
    }

    #[tracing::instrument(skip(self, patch), fields(id = %id))]
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> StoreResult<()> {
        if let Some(title) = patch.title.as_deref()
            && title.trim().is_empty()
        {
            return Err(StoreError::validation("Please enter a task name"));
        }

        let task = self.task_mut(id)?;
        let rescheduled = task.apply_patch(patch);
        if rescheduled {
            task.notified = false;
        }
        self.save()
    }

    /// Flips the completion flag and returns the new value.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_complete(&mut self, id: &TaskId) -> StoreResult<bool> {
        let task = self.task_mut(id)?;
        task.completed = !task.completed;
        let completed = task.completed;
        self.save()?;
        Ok(completed)
    }

    /// Sets the completion flag. Setting the current value changes nothing and
    /// writes nothing.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn set_completed(&mut self, id: &TaskId, completed: bool) -> StoreResult<()> {
        let task = self.task_mut(id)?;
        if task.completed == completed {
            debug!("completion unchanged");
            return Ok(());
        }
        task.completed = completed;
        self.save()
    }

    /// In-memory flip for the two-tier path: observers redraw at once and the
    /// durable write is left to the remote tier.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn apply_optimistic_completion(&mut self, id: &TaskId, completed: bool) -> StoreResult<()> {
        let task = self.task_mut(id)?;
        task.completed = completed;
        self.emit(StoreEvent::LocalChange);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete_task(&mut self, id: &TaskId) -> StoreResult<Task> {
        let idx = self
            .todos
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
        let task = self.todos.remove(idx);
        self.selected.remove(id);
        self.save()?;
        info!(id = %id, "deleted task");
        Ok(task)
    }

    pub fn selected(&self) -> &BTreeSet<TaskId> {
        &self.selected
    }

    pub fn select(&mut self, id: &TaskId) -> StoreResult<()> {
        if self.task(id).is_none() {
            return Err(StoreError::TaskNotFound(id.clone()));
        }
        self.selected.insert(id.clone());
        Ok(())
    }

    pub fn deselect(&mut self, id: &TaskId) -> bool {
        self.selected.remove(id)
    }

    /// Returns whether the task is selected afterwards.
    pub fn toggle_selection(&mut self, id: &TaskId) -> StoreResult<bool> {
        if self.selected.remove(id) {
            return Ok(false);
        }
        self.select(id)?;
        Ok(true)
    }

    /// Selects every task visible through `query`.
    pub fn select_all(&mut self, query: &ViewQuery, today: NaiveDate) -> usize {
        let ids: Vec<TaskId> = query
            .run(&self.todos, &self.lists, today)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();
        let count = ids.len();
        self.selected.extend(ids);
        count
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Applies `action` to every selected task, then clears the selection.
    #[tracing::instrument(skip(self), fields(selected = self.selected.len()))]
    pub fn bulk_apply(&mut self, action: BulkAction) -> StoreResult<usize> {
        let selected = std::mem::take(&mut self.selected);
        if selected.is_empty() {
            debug!("bulk action with empty selection");
            return Ok(0);
        }

        let mut touched = 0;
        for task in self.todos.iter_mut().filter(|t| selected.contains(&t.id)) {
            match &action {
                BulkAction::Complete => task.completed = true,
                BulkAction::Uncomplete => task.completed = false,
                BulkAction::SetPriority(priority) => task.priority = *priority,
                BulkAction::MoveToList(list_id) => task.list_id = list_id.clone(),
            }
            touched += 1;
        }

        self.save()?;
        info!(touched, ?action, "applied bulk action");
        Ok(touched)
    }

    /// Deletes every selected task, then clears the selection.
    #[tracing::instrument(skip(self), fields(selected = self.selected.len()))]
    pub fn bulk_delete(&mut self) -> StoreResult<usize> {
        let selected = std::mem::take(&mut self.selected);
        if selected.is_empty() {
            return Ok(0);
        }

        let before = self.todos.len();
        self.todos.retain(|t| !selected.contains(&t.id));
        let removed = before - self.todos.len();
        self.save()?;
        info!(removed, "bulk deleted tasks");
        Ok(removed)
    }

    /// Appends a subtask and returns its position.
    #[tracing::instrument(skip(self, text), fields(id = %id))]
    pub fn add_subtask(&mut self, id: &TaskId, text: &str) -> StoreResult<usize> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::validation("subtask text cannot be empty"));
        }
        let task = self.task_mut(id)?;
        task.subtasks.push(Subtask::new(text));
        let index = task.subtasks.len() - 1;
        self.save()?;
        Ok(index)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_subtask(&mut self, id: &TaskId, index: usize) -> StoreResult<bool> {
        let task = self.task_mut(id)?;
        let subtask = task
            .subtasks
            .get_mut(index)
            .ok_or_else(|| StoreError::validation(format!("task {id} has no subtask #{index}")))?;
        subtask.done = !subtask.done;
        let done = subtask.done;
        self.save()?;
        Ok(done)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove_subtask(&mut self, id: &TaskId, index: usize) -> StoreResult<Subtask> {
        let task = self.task_mut(id)?;
        if index >= task.subtasks.len() {
            return Err(StoreError::validation(format!("task {id} has no subtask #{index}")));
        }
        let removed = task.subtasks.remove(index);
        self.save()?;
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub fn create_list(
        &mut self,
        name: &str,
        color: Option<String>,
        icon: Option<String>,
    ) -> StoreResult<ListId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("list name cannot be empty"));
        }
        let list = List::new(name.to_string(), color, icon);
        let id = list.id.clone();
        self.lists.push(list);
        self.save()?;
        info!(id = %id, "created list");
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn rename_list(&mut self, id: &ListId, name: &str) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("list name cannot be empty"));
        }
        self.list_mut(id)?.name = name.to_string();
        self.save()
    }

    /// Hides a list from active views; its tasks stay addressable by id.
    #[tracing::instrument(skip(self))]
    pub fn archive_list(&mut self, id: &ListId) -> StoreResult<()> {
        self.list_mut(id)?.archived = true;
        self.save()
    }

    #[tracing::instrument(skip(self))]
    pub fn unarchive_list(&mut self, id: &ListId) -> StoreResult<()> {
        self.list_mut(id)?.archived = false;
        self.save()
    }

    /// Removes a list and unassigns its tasks. Returns how many tasks moved.
    #[tracing::instrument(skip(self))]
    pub fn delete_list(&mut self, id: &ListId) -> StoreResult<usize> {
        let idx = self
            .lists
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| StoreError::ListNotFound(id.clone()))?;
        self.lists.remove(idx);

        let mut unassigned = 0;
        for task in self.todos.iter_mut().filter(|t| t.list_id.as_ref() == Some(id)) {
            task.list_id = None;
            unassigned += 1;
        }
        if self.view.current == ViewDescriptor::List(id.clone()) {
            self.view.current = ViewDescriptor::All;
        }
        self.save()?;
        Ok(unassigned)
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    /// Switches the active view; the choice is persisted.
    #[tracing::instrument(skip(self))]
    pub fn set_view(&mut self, view: ViewDescriptor) -> StoreResult<()> {
        if self.view.current == view {
            return Ok(());
        }
        self.view.current = view;
        self.save()
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.view.search = text.into();
    }

    pub fn set_sort(&mut self, sort: SortMode) {
        self.view.sort = sort;
    }

    pub fn shift_month(&mut self, step: i32) {
        self.view.calendar = self.view.calendar.shifted(step);
    }

    pub fn query(&self, query: &ViewQuery, today: NaiveDate) -> Vec<&Task> {
        query.run(&self.todos, &self.lists, today)
    }

    /// Evaluates the active view with the active search and sort.
    pub fn current_view(&self, today: NaiveDate) -> Vec<&Task> {
        let query = ViewQuery {
            view: self.view.current.clone(),
            search: self.view.search.clone(),
            sort: self.view.sort,
        };
        self.query(&query, today)
    }

    pub fn calendar(&self) -> BTreeMap<NaiveDate, Vec<&Task>> {
        calendar_month(&self.todos, &self.lists, self.view.calendar)
    }

    pub fn export_snapshot(&self) -> StoreResult<String> {
        self.snapshot().encode()
    }

    /// Replaces the whole state with `raw`. On any parse or validation failure the
    /// prior state is kept.
    #[tracing::instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub fn import_snapshot(&mut self, raw: &str) -> StoreResult<usize> {
        let snapshot = Snapshot::decode(raw).inspect_err(|err| {
            warn!(error = %err, "import rejected; keeping current state");
        })?;
        let count = snapshot.todos.len();
        self.replace_state(snapshot);
        self.selected.clear();
        self.save()?;
        info!(todos = count, "imported snapshot");
        Ok(count)
    }

    /// Marks a task as already reminded without emitting a save.
    pub(crate) fn mark_notified(&mut self, id: &TaskId) -> StoreResult<()> {
        self.task_mut(id)?.notified = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::task::SEED_LIST_ID;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn store() -> TaskStore<MemoryBlobStore> {
        TaskStore::open(Arc::new(MemoryBlobStore::new()), "User-1", today())
    }

    #[test]
    fn corrupt_blob_loads_defaults() {
        let blob = Arc::new(MemoryBlobStore::with_contents("{definitely not json"));
        let store = TaskStore::open(blob, "User-1", today());
        assert!(store.tasks().is_empty());
        assert_eq!(store.lists().len(), 1);
        assert_eq!(store.lists()[0].id.as_str(), SEED_LIST_ID);
    }

    #[test]
    fn flawed_entries_do_not_discard_the_rest_of_the_blob() {
        let raw = r#"[{"id":1,"title":"Project Kickoff"},{"id":2,"title":"Client Review"},{"id":3,"title":" "}]"#;
        let mut store = TaskStore::open(
            Arc::new(MemoryBlobStore::with_contents(raw)),
            "User-1",
            today(),
        );
        assert_eq!(store.tasks().len(), 3);

        store.create_task(TaskDraft::titled("new")).unwrap();
        let persisted = Snapshot::decode(&store.blob().contents().unwrap()).unwrap();
        assert_eq!(persisted.todos.len(), 4);

        let dup = r#"[{"id":5,"title":"a"},{"id":5,"title":"b"}]"#;
        let store = TaskStore::open(
            Arc::new(MemoryBlobStore::with_contents(dup)),
            "User-1",
            today(),
        );
        let titles: Vec<_> = store.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a"]);
    }

    #[test]
    fn import_stays_strict_about_duplicates() {
        let mut store = store();
        store.create_task(TaskDraft::titled("keep")).unwrap();
        let dup = r#"[{"id":5,"title":"a"},{"id":5,"title":"b"}]"#;
        assert!(store.import_snapshot(dup).is_err());
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn create_appends_and_persists() {
        let mut store = store();
        let first = store.create_task(TaskDraft::titled("first")).unwrap();
        let second = store.create_task(TaskDraft::titled("  second  ")).unwrap();

        let ids: Vec<_> = store.tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![first, second.clone()]);
        assert_eq!(store.task(&second).unwrap().title, "second");
        assert_eq!(store.task(&second).unwrap().owner.as_deref(), Some("User-1"));

        let persisted = Snapshot::decode(&store.blob().contents().unwrap()).unwrap();
        assert_eq!(persisted.todos.len(), 2);
    }

    #[test]
    fn empty_title_is_rejected_without_side_effects() {
        let mut store = store();
        let mut events = store.subscribe();
        let err = store.create_task(TaskDraft::titled("   ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.tasks().is_empty());
        assert!(store.blob().contents().is_none());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn unknown_ids_are_not_found_noops() {
        let mut store = store();
        store.create_task(TaskDraft::titled("keep")).unwrap();
        let before = store.snapshot();
        let missing = TaskId::from("missing");

        assert!(store.toggle_complete(&missing).unwrap_err().is_not_found());
        assert!(store.update_task(&missing, TaskPatch::default()).unwrap_err().is_not_found());
        assert!(store.delete_task(&missing).unwrap_err().is_not_found());
        assert!(store.archive_list(&ListId::from("nope")).unwrap_err().is_not_found());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn set_completed_twice_saves_once() {
        let mut store = store();
        let id = store.create_task(TaskDraft::titled("x")).unwrap();
        let mut events = store.subscribe();

        store.set_completed(&id, true).unwrap();
        store.set_completed(&id, true).unwrap();

        assert!(store.task(&id).unwrap().completed);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::LocalChange);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn toggle_flips_back_and_forth() {
        let mut store = store();
        let id = store.create_task(TaskDraft::titled("x")).unwrap();
        assert!(store.toggle_complete(&id).unwrap());
        assert!(!store.toggle_complete(&id).unwrap());
    }

    #[test]
    fn reschedule_resets_notified() {
        let mut store = store();
        let id = store.create_task(TaskDraft::titled("x")).unwrap();
        store.mark_notified(&id).unwrap();

        store
            .update_task(&id, TaskPatch { priority: Some(Priority::High), ..TaskPatch::default() })
            .unwrap();
        assert!(store.task(&id).unwrap().notified);

        store
            .update_task(&id, TaskPatch { due_date: Some(Some(today())), ..TaskPatch::default() })
            .unwrap();
        assert!(!store.task(&id).unwrap().notified);
    }

    #[test]
    fn patch_with_blank_title_is_rejected() {
        let mut store = store();
        let id = store.create_task(TaskDraft::titled("x")).unwrap();
        let err = store
            .update_task(&id, TaskPatch { title: Some(" ".to_string()), ..TaskPatch::default() })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.task(&id).unwrap().title, "x");
    }

    #[test]
    fn subtasks_keep_order() {
        let mut store = store();
        let id = store
            .create_task(TaskDraft {
                subtasks: vec!["a".to_string(), "".to_string(), "b".to_string()],
                ..TaskDraft::titled("parent")
            })
            .unwrap();
        assert_eq!(store.add_subtask(&id, "c").unwrap(), 2);
        assert!(store.toggle_subtask(&id, 1).unwrap());
        assert_eq!(store.remove_subtask(&id, 0).unwrap().text, "a");

        let texts: Vec<_> = store.task(&id).unwrap().subtasks.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["b", "c"]);
        assert_eq!(store.task(&id).unwrap().subtask_progress(), (1, 2));
        assert!(store.toggle_subtask(&id, 9).is_err());
    }

    #[test]
    fn delete_list_unassigns_tasks_and_resets_view() {
        let mut store = store();
        let list = store.create_list("Work", Some("#f00".to_string()), None).unwrap();
        let id = store
            .create_task(TaskDraft { list_id: Some(list.clone()), ..TaskDraft::titled("x") })
            .unwrap();
        store.set_view(ViewDescriptor::List(list.clone())).unwrap();

        assert_eq!(store.delete_list(&list).unwrap(), 1);
        assert!(store.task(&id).unwrap().list_id.is_none());
        assert_eq!(store.view_state().current, ViewDescriptor::All);
    }

    #[test]
    fn resolves_prefixes_and_list_names() {
        let mut store = store();
        let id = store.create_task(TaskDraft::titled("x")).unwrap();
        let prefix = &id.as_str()[..8];
        assert_eq!(store.resolve_task(prefix).unwrap(), id);
        assert!(store.resolve_task("zzzz-not-an-id").unwrap_err().is_not_found());
        assert_eq!(store.resolve_list("inbox").unwrap().as_str(), SEED_LIST_ID);
        assert_eq!(store.resolve_list("INBOX").unwrap().as_str(), SEED_LIST_ID);
    }

    #[test]
    fn current_view_is_persisted() {
        let blob = Arc::new(MemoryBlobStore::new());
        let mut store = TaskStore::open(blob.clone(), "u", today());
        store.set_view(ViewDescriptor::Today).unwrap();

        let reopened = TaskStore::open(blob, "u", today());
        assert_eq!(reopened.view_state().current, ViewDescriptor::Today);
    }

    #[test]
    fn shift_month_moves_calendar_cursor() {
        let mut store = store();
        store.shift_month(-6);
        assert_eq!(store.view_state().calendar.year, 2023);
        assert_eq!(store.view_state().calendar.month, 12);

        store.shift_month(i32::MAX);
        store.shift_month(i32::MAX);
        assert_eq!(store.view_state().calendar.year, 9999);
        assert_eq!(store.calendar().len(), 0);
    }
}
