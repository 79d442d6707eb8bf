//! `protask watch`: an interactive session that follows other writers.
//!
//! One current-thread runtime multiplexes stdin commands, the search debounce
//! deadline, blob watcher notifications, the reminder interval and Ctrl-C.
//! Completion toggles go through the simulated remote and are not awaited.

use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::blob::FileBlobStore;
use crate::config::Config;
use crate::datetime::{local_today, to_local};
use crate::debounce::{DEFAULT_SEARCH_DEBOUNCE, SearchDebouncer};
use crate::error::StoreResult;
use crate::intent::Intent;
use crate::remote::{Ack, Latency, SimulatedRemote};
use crate::render::Renderer;
use crate::store::{BulkAction, TaskStore};
use crate::task::{TaskDraft, TaskId};
use crate::view::{SortMode, ViewDescriptor, ViewQuery};
use crate::watcher::BlobWatcher;

use super::{build_scheduler, parse_view};

const HELP: &str = "\
commands:
  a <title>        add a task (through the remote)
  t <id>           toggle completion
  d <id>           delete a task
  x <id>           toggle selection
  bulk all|done|undone|high|low|delete
                   select the view, or apply to the selection
  v <view>         switch view (all, today, list:<name>, upcoming, ...)
  /<text>          search; an empty / clears it
  s date|priority  sort
  cal [+n|-n]      calendar, optionally moving months
  q                quit";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Redraw,
    Quit,
}

struct Session<'a> {
    store: &'a mut TaskStore<FileBlobStore>,
    renderer: &'a Renderer,
    remote: SimulatedRemote<FileBlobStore>,
    debouncer: SearchDebouncer,
    in_flight: Vec<JoinHandle<StoreResult<Ack>>>,
}

pub(super) fn run(
    store: &mut TaskStore<FileBlobStore>,
    cfg: &Config,
    renderer: &Renderer,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(watch_loop(store, cfg, renderer))
}

async fn watch_loop(
    store: &mut TaskStore<FileBlobStore>,
    cfg: &Config,
    renderer: &Renderer,
) -> anyhow::Result<()> {
    let latency = Latency::between(
        cfg.get_millis("remote.latency.min").unwrap_or(Duration::from_millis(400)),
        cfg.get_millis("remote.latency.max").unwrap_or(Duration::from_millis(800)),
    );
    let remote = SimulatedRemote::new(store.blob().clone(), latency, store.user());
    let fetched = store
        .load_remote(&remote)
        .await
        .context("failed to fetch tasks")?;
    debug!(count = fetched, "initial fetch");
    let debounce = cfg
        .get_millis("search.debounce")
        .unwrap_or(DEFAULT_SEARCH_DEBOUNCE);

    let (tx, mut changes) = mpsc::unbounded_channel();
    let mut watcher = BlobWatcher::spawn(&store.blob().blob_path, tx)
        .with_context(|| format!("failed to watch {}", store.blob().blob_path.display()))?;

    let scheduler = build_scheduler(cfg);
    let mut ticker = tokio::time::interval(scheduler.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut session = Session {
        store,
        renderer,
        remote,
        debouncer: SearchDebouncer::new(debounce),
        in_flight: vec![],
    };
    info!(user = %session.store.user(), "watch session started");
    session.redraw()?;
    renderer.message("Type ? for help.")?;

    loop {
        let deadline = session.debouncer.deadline();
        let flow = tokio::select! {
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) => session.handle_line(line.trim()).await?,
                None => Flow::Quit,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                match session.debouncer.poll(Instant::now()) {
                    Some(text) => {
                        session.store.dispatch(Intent::Search(text))?;
                        Flow::Redraw
                    }
                    None => Flow::Continue,
                }
            }
            Some(change) = changes.recv() => match session.store.apply_external_change(&change) {
                Ok(Some(remote)) => {
                    renderer.toast(&remote)?;
                    Flow::Redraw
                }
                Ok(None) => Flow::Continue,
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable external change");
                    Flow::Continue
                }
            },
            _ = ticker.tick() => {
                let fired = scheduler.sweep(session.store, to_local(Utc::now()))?;
                if fired.is_empty() { Flow::Continue } else { Flow::Redraw }
            }
            signal = &mut ctrl_c => {
                signal.context("failed to listen for ctrl-c")?;
                Flow::Quit
            }
        };

        session.in_flight.retain(|handle| !handle.is_finished());
        match flow {
            Flow::Continue => {}
            Flow::Redraw => session.redraw()?,
            Flow::Quit => break,
        }
    }

    if let Err(err) = watcher.stop() {
        debug!(error = %err, "watcher already stopped");
    }
    session.drain().await;
    info!("watch session ended");
    Ok(())
}

impl Session<'_> {
    fn redraw(&self) -> anyhow::Result<()> {
        let today = local_today(Utc::now());
        let state = self.store.view_state();
        if state.current.is_calendar() {
            return self
                .renderer
                .print_calendar(state.calendar, &self.store.calendar(), today);
        }
        let tasks = self.store.current_view(today);
        self.renderer.print_view(
            &state.current.title(self.store.lists()),
            &tasks,
            self.store.lists(),
            self.store.user(),
            today,
        )
    }

    async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        if let Some(text) = line.strip_prefix('/') {
            self.debouncer.push(text.trim(), Instant::now());
            return Ok(Flow::Continue);
        }

        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match verb {
            "" => Ok(Flow::Continue),
            "q" | "quit" | "exit" => Ok(Flow::Quit),
            "?" | "help" => self.renderer.message(HELP).map(|()| Flow::Continue),
            "a" | "add" => self.add(rest).await,
            "t" | "toggle" => self.toggle(rest),
            "d" | "delete" => self.with_task(rest, Intent::DeleteTask),
            "x" | "select" => self.with_task(rest, Intent::ToggleSelection),
            "bulk" => self.bulk(rest),
            "v" | "view" => self.view(rest),
            "s" | "sort" => self.sort(rest),
            "cal" => self.calendar(rest),
            other => Err(anyhow!("unknown command {other}; type ? for help")),
        };

        // Typos and validation failures are shown and the session continues.
        match result {
            Ok(flow) => Ok(flow),
            Err(err) => {
                self.renderer.message(&format!("{err:#}"))?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn add(&mut self, title: &str) -> anyhow::Result<Flow> {
        let id = self
            .store
            .create_remote(&self.remote, TaskDraft::titled(title))
            .await?;
        debug!(id = %id, "created through remote");
        Ok(Flow::Redraw)
    }

    fn toggle(&mut self, token: &str) -> anyhow::Result<Flow> {
        let id = self.store.resolve_task(token)?;
        let handle = self.store.toggle_optimistic(&self.remote, &id)?;
        self.in_flight.push(handle);
        Ok(Flow::Redraw)
    }

    fn with_task(
        &mut self,
        token: &str,
        intent: impl FnOnce(TaskId) -> Intent,
    ) -> anyhow::Result<Flow> {
        let id = self.store.resolve_task(token)?;
        self.store.dispatch(intent(id))?;
        Ok(Flow::Redraw)
    }

    fn bulk(&mut self, action: &str) -> anyhow::Result<Flow> {
        let intent = match action {
            "done" => Intent::BulkApply(BulkAction::Complete),
            "undone" => Intent::BulkApply(BulkAction::Uncomplete),
            "delete" => Intent::BulkDelete,
            "all" => {
                let state = self.store.view_state();
                let query = ViewQuery::new(state.current.clone())
                    .search(state.search.clone())
                    .sort(state.sort);
                Intent::SelectAll(query, local_today(Utc::now()))
            }
            priority => Intent::BulkApply(BulkAction::SetPriority(priority.parse()?)),
        };
        self.store.dispatch(intent)?;
        Ok(Flow::Redraw)
    }

    fn sort(&mut self, raw: &str) -> anyhow::Result<Flow> {
        let sort: SortMode = raw.parse()?;
        self.store.dispatch(Intent::Sort(sort))?;
        Ok(Flow::Redraw)
    }

    fn view(&mut self, raw: &str) -> anyhow::Result<Flow> {
        let view = parse_view(self.store, raw)?;
        self.store.dispatch(Intent::SetView(view))?;
        Ok(Flow::Redraw)
    }

    fn calendar(&mut self, step: &str) -> anyhow::Result<Flow> {
        if !step.is_empty() {
            let step: i32 = step
                .trim_start_matches('+')
                .parse()
                .with_context(|| format!("invalid month step {step}"))?;
            self.store.dispatch(Intent::ShiftMonth(step))?;
        }
        self.store
            .dispatch(Intent::SetView(ViewDescriptor::Calendar))?;
        Ok(Flow::Redraw)
    }

    /// Lets outstanding remote writes land before exit.
    async fn drain(&mut self) {
        for handle in self.in_flight.drain(..) {
            match handle.await {
                Ok(Ok(Ack)) => {}
                Ok(Err(err)) => warn!(error = %err, "remote write failed"),
                Err(err) => warn!(error = %err, "remote write task panicked"),
            }
        }
    }
}
