//! The simulated remote tier.
//!
//! Calls resolve after an injected delay over the same blob the store persists
//! to. [`RemoteApi`] is the seam a real network client would implement.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::blob::BlobStore;
use crate::datetime::local_today;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use crate::store::{StoreEvent, TaskStore};
use crate::task::{Subtask, Task, TaskDraft, TaskId};

pub const SEED_OWNER: &str = "User-System";

/// Acknowledgement of a remote write. Carries nothing; results are not reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

pub trait RemoteApi: Clone + Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = StoreResult<Snapshot>> + Send;

    fn create(&self, draft: TaskDraft) -> impl Future<Output = StoreResult<TaskId>> + Send;

    fn update_status(
        &self,
        id: TaskId,
        completed: bool,
    ) -> impl Future<Output = StoreResult<Ack>> + Send;
}

/// Randomized delay range applied before each simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub min: Duration,
    pub max: Duration,
}

impl Latency {
    pub const NONE: Latency = Latency {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn between(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::between(delay, delay)
    }

    fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self::between(Duration::from_millis(400), Duration::from_millis(800))
    }
}

pub struct SimulatedRemote<B: BlobStore> {
    blob: Arc<B>,
    latency: Latency,
    user: String,
}

impl<B: BlobStore> Clone for SimulatedRemote<B> {
    fn clone(&self) -> Self {
        Self {
            blob: Arc::clone(&self.blob),
            latency: self.latency,
            user: self.user.clone(),
        }
    }
}

impl<B: BlobStore> SimulatedRemote<B> {
    pub fn new(blob: Arc<B>, latency: Latency, user: impl Into<String>) -> Self {
        Self {
            blob,
            latency,
            user: user.into(),
        }
    }

    async fn delay(&self) {
        let wait = self.latency.sample();
        debug!(delay_ms = wait.as_millis() as u64, "simulating remote latency");
        tokio::time::sleep(wait).await;
    }

    fn read(&self) -> StoreResult<Option<Snapshot>> {
        match self.blob.read()? {
            Some(raw) => Snapshot::recover(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn write(&self, snapshot: &Snapshot) -> StoreResult<()> {
        self.blob.write(&snapshot.encode()?)
    }
}

impl<B: BlobStore> RemoteApi for SimulatedRemote<B> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self) -> StoreResult<Snapshot> {
        self.delay().await;
        if let Some(snapshot) = self.read()? {
            return Ok(snapshot);
        }

        let snapshot = Snapshot {
            todos: seed_tasks(),
            ..Snapshot::default()
        };
        self.write(&snapshot)?;
        info!(count = snapshot.todos.len(), "seeded empty remote");
        Ok(snapshot)
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create(&self, draft: TaskDraft) -> StoreResult<TaskId> {
        self.delay().await;
        let mut snapshot = self.read()?.unwrap_or_default();

        let mut task = Task::new(draft.title.trim().to_string(), Some(self.user.clone()));
        task.due_date = draft.due_date;
        task.time = draft.time;
        task.priority = draft.priority.unwrap_or_default();
        task.list_id = draft.list_id;
        task.subtasks = draft.subtasks.into_iter().map(Subtask::new).collect();

        let id = task.id.clone();
        snapshot.todos.push(task);
        self.write(&snapshot)?;
        Ok(id)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    async fn update_status(&self, id: TaskId, completed: bool) -> StoreResult<Ack> {
        self.delay().await;
        let mut snapshot = self.read()?.unwrap_or_default();
        match snapshot.todos.iter_mut().find(|t| t.id == id) {
            Some(task) => task.completed = completed,
            None => debug!("status update for a task the remote no longer has"),
        }
        self.write(&snapshot)?;
        Ok(Ack)
    }
}

fn seed_tasks() -> Vec<Task> {
    let today = local_today(Utc::now());
    let seed = |title: &str, hour: u32, completed: bool| {
        let mut task = Task::new(title.to_string(), Some(SEED_OWNER.to_string()));
        task.due_date = Some(today);
        task.time = NaiveTime::from_hms_opt(hour, 0, 0);
        task.completed = completed;
        task
    };
    vec![
        seed("Project Kickoff", 9, false),
        seed("Client Review", 14, true),
    ]
}

impl<B: BlobStore> TaskStore<B> {
    /// Replaces state with the remote's view, awaiting the simulated round trip.
    #[tracing::instrument(skip(self, remote))]
    pub async fn load_remote<R: RemoteApi>(&mut self, remote: &R) -> StoreResult<usize> {
        let snapshot = remote.fetch().await?;
        let count = snapshot.todos.len();
        self.replace_state(snapshot);
        self.emit(StoreEvent::LocalChange);
        Ok(count)
    }

    /// Creates through the remote, then re-reads the blob it wrote.
    #[tracing::instrument(skip(self, remote, draft), fields(title = %draft.title))]
    pub async fn create_remote<R: RemoteApi>(
        &mut self,
        remote: &R,
        draft: TaskDraft,
    ) -> StoreResult<TaskId> {
        if draft.title.trim().is_empty() {
            return Err(StoreError::validation("Please enter a task name"));
        }
        let id = remote.create(draft).await?;
        self.load();
        self.emit(StoreEvent::LocalChange);
        Ok(id)
    }

    /// Flips completion in memory at once and fires the remote write without
    /// waiting for it. The returned handle may be dropped.
    #[tracing::instrument(skip(self, remote), fields(id = %id))]
    pub fn toggle_optimistic<R: RemoteApi>(
        &mut self,
        remote: &R,
        id: &TaskId,
    ) -> StoreResult<JoinHandle<StoreResult<Ack>>> {
        let completed = !self
            .task(id)
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?
            .completed;
        self.set_completed_optimistic(remote, id, completed)
    }

    pub fn set_completed_optimistic<R: RemoteApi>(
        &mut self,
        remote: &R,
        id: &TaskId,
        completed: bool,
    ) -> StoreResult<JoinHandle<StoreResult<Ack>>> {
        self.apply_optimistic_completion(id, completed)?;

        let remote = remote.clone();
        let id = id.clone();
        Ok(tokio::spawn(async move { remote.update_status(id, completed).await }))
    }
}
