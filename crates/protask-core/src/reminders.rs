use std::io::{self, Write};
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info, trace, warn};

use crate::blob::BlobStore;
use crate::error::StoreResult;
use crate::store::TaskStore;
use crate::task::{Task, TaskId};

pub const REMINDER_TITLE: &str = "Task Due Soon";

/// Whether reminders may be shown, as granted by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked; treated like denied.
    Default,
}

/// Surface that actually shows a reminder.
pub trait Notifier {
    fn permission(&self) -> Permission;

    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Which tasks are due a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub window: chrono::Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            window: chrono::Duration::minutes(60),
        }
    }
}

impl ReminderPolicy {
    /// Open, not yet reminded, with a due instant in `(now, now + window]`.
    pub fn is_due(&self, task: &Task, now: NaiveDateTime) -> bool {
        if task.completed || task.notified {
            return false;
        }
        let Some(due) = task.due_at() else {
            return false;
        };
        let lead = due - now;
        lead > chrono::Duration::zero() && lead <= self.window
    }
}

/// Polls the store on a fixed interval and fires at most one reminder per task.
pub struct NotificationScheduler<N: Notifier> {
    notifier: N,
    policy: ReminderPolicy,
    interval: Duration,
}

impl<N: Notifier> NotificationScheduler<N> {
    pub fn new(notifier: N, policy: ReminderPolicy, interval: Duration) -> Self {
        Self {
            notifier,
            policy,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep. Without permission this does nothing and reports nothing.
    /// Reminded tasks are flagged and the store saved once.
    #[tracing::instrument(skip(self, store))]
    pub fn sweep<B: BlobStore>(
        &self,
        store: &mut TaskStore<B>,
        now: NaiveDateTime,
    ) -> StoreResult<Vec<TaskId>> {
        if self.notifier.permission() != Permission::Granted {
            trace!("reminders not permitted; skipping sweep");
            return Ok(vec![]);
        }

        let due: Vec<(TaskId, String)> = store
            .tasks()
            .iter()
            .filter(|task| self.policy.is_due(task, now))
            .map(|task| (task.id.clone(), task.title.clone()))
            .collect();

        let mut fired = Vec::with_capacity(due.len());
        for (id, title) in due {
            if let Err(err) = self.notifier.notify(REMINDER_TITLE, &title) {
                warn!(id = %id, error = %err, "failed to show reminder");
                continue;
            }
            store.mark_notified(&id)?;
            fired.push(id);
        }

        if fired.is_empty() {
            debug!("no reminders due");
        } else {
            store.save()?;
            info!(count = fired.len(), "fired reminders");
        }
        Ok(fired)
    }
}

/// Rings the terminal bell and prints the reminder on stdout.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    enabled: bool,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        if self.enabled {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "\x07[{title}] {body}")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::snapshot::Snapshot;
    use crate::task::{TaskDraft, TaskPatch};

    struct Recorder {
        permission: Permission,
        shown: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn new(permission: Permission) -> Self {
            Self {
                permission,
                shown: RefCell::new(vec![]),
            }
        }
    }

    impl Notifier for &Recorder {
        fn permission(&self) -> Permission {
            self.permission
        }

        fn notify(&self, _title: &str, body: &str) -> anyhow::Result<()> {
            self.shown.borrow_mut().push(body.to_string());
            Ok(())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn store_with(times: &[(&str, u32, u32)]) -> TaskStore<MemoryBlobStore> {
        let mut store = TaskStore::open(Arc::new(MemoryBlobStore::new()), "me", day());
        for (title, h, m) in times {
            store
                .create_task(TaskDraft {
                    due_date: Some(day()),
                    time: NaiveTime::from_hms_opt(*h, *m, 0),
                    ..TaskDraft::titled(*title)
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn fires_once_inside_window_and_persists_flag() {
        let mut store = store_with(&[("soon", 9, 30), ("later", 11, 0), ("past", 8, 0)]);
        store.create_task(TaskDraft::titled("undated")).unwrap();
        let recorder = Recorder::new(Permission::Granted);
        let scheduler =
            NotificationScheduler::new(&recorder, ReminderPolicy::default(), Duration::from_secs(60));

        let fired = scheduler.sweep(&mut store, at(9, 0)).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(*recorder.shown.borrow(), ["soon"]);

        let again = scheduler.sweep(&mut store, at(9, 1)).unwrap();
        assert!(again.is_empty());
        assert_eq!(recorder.shown.borrow().len(), 1);

        let persisted = Snapshot::decode(&store.blob().contents().unwrap()).unwrap();
        assert!(persisted.todos.iter().any(|t| t.title == "soon" && t.notified));
    }

    #[test]
    fn window_edge_is_inclusive() {
        let mut store = store_with(&[("edge", 10, 0)]);
        let recorder = Recorder::new(Permission::Granted);
        let scheduler =
            NotificationScheduler::new(&recorder, ReminderPolicy::default(), Duration::from_secs(60));

        assert_eq!(scheduler.sweep(&mut store, at(8, 59)).unwrap().len(), 0);
        assert_eq!(scheduler.sweep(&mut store, at(9, 0)).unwrap().len(), 1);
    }

    #[test]
    fn completed_tasks_are_skipped() {
        let mut store = store_with(&[("done", 9, 30)]);
        let id = store.tasks()[0].id.clone();
        store
            .update_task(&id, TaskPatch { completed: Some(true), ..TaskPatch::default() })
            .unwrap();
        let recorder = Recorder::new(Permission::Granted);
        let scheduler =
            NotificationScheduler::new(&recorder, ReminderPolicy::default(), Duration::from_secs(60));
        assert!(scheduler.sweep(&mut store, at(9, 0)).unwrap().is_empty());
    }

    #[test]
    fn silent_without_permission() {
        let mut store = store_with(&[("soon", 9, 30)]);
        let before = store.blob().contents();
        for permission in [Permission::Denied, Permission::Default] {
            let recorder = Recorder::new(permission);
            let scheduler = NotificationScheduler::new(
                &recorder,
                ReminderPolicy::default(),
                Duration::from_secs(60),
            );
            assert!(scheduler.sweep(&mut store, at(9, 0)).unwrap().is_empty());
            assert!(recorder.shown.borrow().is_empty());
        }
        assert_eq!(store.blob().contents(), before);
    }
}
