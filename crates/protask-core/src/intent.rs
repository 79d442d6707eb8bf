//! Command interface over [`TaskStore`].
//!
//! Front ends translate user gestures into an [`Intent`]; `dispatch` maps each
//! onto the mutation API and reports what happened as an [`Outcome`].

use chrono::NaiveDate;
use tracing::warn;

use crate::blob::BlobStore;
use crate::error::{StoreError, StoreResult};
use crate::store::{BulkAction, TaskStore};
use crate::task::{ListId, TaskDraft, TaskId, TaskPatch};
use crate::view::{SortMode, ViewDescriptor, ViewQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    CreateTask(TaskDraft),
    UpdateTask(TaskId, TaskPatch),
    ToggleComplete(TaskId),
    SetCompleted(TaskId, bool),
    DeleteTask(TaskId),
    Select(TaskId),
    Deselect(TaskId),
    ToggleSelection(TaskId),
    SelectAll(ViewQuery, NaiveDate),
    ClearSelection,
    BulkApply(BulkAction),
    BulkDelete,
    AddSubtask(TaskId, String),
    ToggleSubtask(TaskId, usize),
    RemoveSubtask(TaskId, usize),
    CreateList {
        name: String,
        color: Option<String>,
        icon: Option<String>,
    },
    RenameList(ListId, String),
    ArchiveList(ListId),
    UnarchiveList(ListId),
    DeleteList(ListId),
    SetView(ViewDescriptor),
    Search(String),
    Sort(SortMode),
    ShiftMonth(i32),
    Import(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    TaskCreated(TaskId),
    ListCreated(ListId),
    Completed(TaskId, bool),
    Selected(bool),
    /// Number of tasks touched, moved, removed or imported.
    Count(usize),
    SubtaskAdded(usize),
    Updated,
    /// The target did not exist; nothing changed.
    NotFound(String),
}

impl<B: BlobStore> TaskStore<B> {
    /// Applies one intent. Unknown ids come back as [`Outcome::NotFound`];
    /// validation and persistence failures are returned as errors.
    #[tracing::instrument(skip(self, intent))]
    pub fn dispatch(&mut self, intent: Intent) -> StoreResult<Outcome> {
        match self.apply_intent(intent) {
            Err(err) if err.is_not_found() => {
                warn!(error = %err, "intent target missing; ignored");
                Ok(Outcome::NotFound(err.to_string()))
            }
            other => other,
        }
    }

    fn apply_intent(&mut self, intent: Intent) -> StoreResult<Outcome> {
        use Intent::*;

        let outcome = match intent {
            CreateTask(draft) => Outcome::TaskCreated(self.create_task(draft)?),
            UpdateTask(id, patch) => {
                self.update_task(&id, patch)?;
                Outcome::Updated
            }
            ToggleComplete(id) => {
                let completed = self.toggle_complete(&id)?;
                Outcome::Completed(id, completed)
            }
            SetCompleted(id, completed) => {
                self.set_completed(&id, completed)?;
                Outcome::Completed(id, completed)
            }
            DeleteTask(id) => {
                self.delete_task(&id)?;
                Outcome::Count(1)
            }
            Select(id) => {
                self.select(&id)?;
                Outcome::Selected(true)
            }
            Deselect(id) => {
                if !self.deselect(&id) && self.task(&id).is_none() {
                    return Err(StoreError::TaskNotFound(id));
                }
                Outcome::Selected(false)
            }
            ToggleSelection(id) => Outcome::Selected(self.toggle_selection(&id)?),
            SelectAll(query, today) => Outcome::Count(self.select_all(&query, today)),
            ClearSelection => {
                self.clear_selection();
                Outcome::Updated
            }
            BulkApply(action) => {
                if let BulkAction::MoveToList(Some(list)) = &action
                    && self.list(list).is_none()
                {
                    return Err(StoreError::ListNotFound(list.clone()));
                }
                Outcome::Count(self.bulk_apply(action)?)
            }
            BulkDelete => Outcome::Count(self.bulk_delete()?),
            AddSubtask(id, text) => Outcome::SubtaskAdded(self.add_subtask(&id, &text)?),
            ToggleSubtask(id, index) => {
                self.toggle_subtask(&id, index)?;
                Outcome::Updated
            }
            RemoveSubtask(id, index) => {
                self.remove_subtask(&id, index)?;
                Outcome::Updated
            }
            CreateList { name, color, icon } => {
                Outcome::ListCreated(self.create_list(&name, color, icon)?)
            }
            RenameList(id, name) => {
                self.rename_list(&id, &name)?;
                Outcome::Updated
            }
            ArchiveList(id) => {
                self.archive_list(&id)?;
                Outcome::Updated
            }
            UnarchiveList(id) => {
                self.unarchive_list(&id)?;
                Outcome::Updated
            }
            DeleteList(id) => Outcome::Count(self.delete_list(&id)?),
            SetView(view) => {
                self.set_view(view)?;
                Outcome::Updated
            }
            Search(text) => {
                self.set_search(text);
                Outcome::Updated
            }
            Sort(sort) => {
                self.set_sort(sort);
                Outcome::Updated
            }
            ShiftMonth(step) => {
                self.shift_month(step);
                Outcome::Updated
            }
            Import(raw) => Outcome::Count(self.import_snapshot(&raw)?),
        };
        Ok(outcome)
    }
}
