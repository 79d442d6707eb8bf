mod io;
mod watch;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::blob::{BlobStore, FileBlobStore};
use crate::cli::{AddArgs, BulkCommand, BulkTarget, Command, EditArgs, ListArgs, ListCommand, SubtaskCommand};
use crate::config::Config;
use crate::datetime::{local_today, parse_due_date, parse_due_time, to_local};
use crate::error::StoreError;
use crate::intent::{Intent, Outcome};
use crate::reminders::{NotificationScheduler, ReminderPolicy, TerminalNotifier};
use crate::render::Renderer;
use crate::store::{BulkAction, TaskStore};
use crate::task::{Priority, TaskDraft, TaskId, TaskPatch};
use crate::view::{SortMode, ViewDescriptor, ViewQuery};

const CLEAR_WORDS: [&str; 3] = ["none", "clear", "-"];
const MAX_WINDOW_MINUTES: u64 = 7 * 24 * 60;

#[instrument(skip(store, cfg, renderer, command, now))]
pub fn dispatch(
    store: &mut TaskStore<FileBlobStore>,
    cfg: &Config,
    renderer: &Renderer,
    command: Option<Command>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let today = local_today(now);
    debug!(?command, %today, "dispatching command");

    let Some(command) = command else {
        let view = cfg
            .get("default.view")
            .map(|raw| parse_view(store, &raw))
            .transpose()?
            .unwrap_or_default();
        return show_view(store, cfg, renderer, view, today);
    };

    match command {
        Command::Add(args) => cmd_add(store, renderer, &args, today),
        Command::List(args) => cmd_list(store, cfg, renderer, &args, today),
        Command::Show { id } => cmd_show(store, renderer, &id, today),
        Command::Edit(args) => cmd_edit(store, renderer, &args, today),
        Command::Done { ids } => cmd_set_completed(store, renderer, &ids, true),
        Command::Undone { ids } => cmd_set_completed(store, renderer, &ids, false),
        Command::Toggle { ids } => cmd_toggle(store, renderer, &ids),
        Command::Delete { ids } => cmd_delete(store, renderer, &ids),
        Command::Subtask(sub) => cmd_subtask(store, renderer, sub),
        Command::Bulk(bulk) => cmd_bulk(store, renderer, bulk, today),
        Command::Lists(lists) => cmd_lists(store, renderer, lists),
        Command::Calendar(args) => {
            store.dispatch(Intent::ShiftMonth(args.shift))?;
            renderer.print_calendar(store.view_state().calendar, &store.calendar(), today)
        }
        Command::Export { output } => io::cmd_export(store, output.as_deref()),
        Command::Import { path } => io::cmd_import(store, renderer, &path),
        Command::Watch => watch::run(store, cfg, renderer),
        Command::Remind => cmd_remind(store, cfg, now),
    }
}

#[instrument(skip(store, renderer, args))]
fn cmd_add<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    args: &AddArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let draft = build_draft(store, args, today)?;
    if let Outcome::TaskCreated(id) = store.dispatch(Intent::CreateTask(draft))? {
        info!(id = %id, "command add");
        renderer.message(&format!("Created task {}.", short_id(&id)))?;
    }
    Ok(())
}

pub(crate) fn build_draft<B: BlobStore>(
    store: &TaskStore<B>,
    args: &AddArgs,
    today: NaiveDate,
) -> anyhow::Result<TaskDraft> {
    let due_date = args
        .due
        .as_deref()
        .map(|raw| parse_due_date(raw, today))
        .transpose()?;
    let time = args.time.as_deref().map(parse_due_time).transpose()?;
    let priority = args
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;
    let list_id = args
        .list
        .as_deref()
        .map(|raw| store.resolve_list(raw))
        .transpose()?;

    Ok(TaskDraft {
        title: args.title.join(" "),
        due_date,
        time,
        priority,
        list_id,
        subtasks: args.subtasks.clone(),
    })
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_list<B: BlobStore>(
    store: &mut TaskStore<B>,
    cfg: &Config,
    renderer: &Renderer,
    args: &ListArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    if let Some(raw) = args.view.as_deref() {
        let view = parse_view(store, raw)?;
        store.dispatch(Intent::SetView(view))?;
    }
    if let Some(search) = &args.search {
        store.dispatch(Intent::Search(search.clone()))?;
    }
    let view = store.view_state().current.clone();
    show_view_with_sort(store, cfg, renderer, view, args.sort.as_deref(), today)
}

fn show_view<B: BlobStore>(
    store: &mut TaskStore<B>,
    cfg: &Config,
    renderer: &Renderer,
    view: ViewDescriptor,
    today: NaiveDate,
) -> anyhow::Result<()> {
    show_view_with_sort(store, cfg, renderer, view, None, today)
}

fn show_view_with_sort<B: BlobStore>(
    store: &mut TaskStore<B>,
    cfg: &Config,
    renderer: &Renderer,
    view: ViewDescriptor,
    sort: Option<&str>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let sort = match sort.map(String::from).or_else(|| cfg.get("default.sort")) {
        Some(raw) => raw.parse::<SortMode>()?,
        None => SortMode::default(),
    };
    store.dispatch(Intent::Sort(sort))?;

    if view.is_calendar() {
        return renderer.print_calendar(store.view_state().calendar, &store.calendar(), today);
    }

    let query = ViewQuery::new(view.clone())
        .search(store.view_state().search.clone())
        .sort(sort);
    let tasks = store.query(&query, today);
    renderer.print_view(&view.title(store.lists()), &tasks, store.lists(), store.user(), today)
}

/// Parses a view token; `list:` accepts a list name as well as an id.
pub(crate) fn parse_view<B: BlobStore>(store: &TaskStore<B>, raw: &str) -> anyhow::Result<ViewDescriptor> {
    match raw.parse::<ViewDescriptor>()? {
        ViewDescriptor::List(id) => Ok(ViewDescriptor::List(store.resolve_list(id.as_str())?)),
        other => Ok(other),
    }
}

fn cmd_show<B: BlobStore>(
    store: &TaskStore<B>,
    renderer: &Renderer,
    token: &str,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let id = store.resolve_task(token)?;
    let task = store
        .task(&id)
        .ok_or_else(|| anyhow!("task {id} disappeared"))?;
    renderer.print_task_info(task, store.lists(), store.user(), today)
}

#[instrument(skip(store, renderer, args), fields(id = %args.id))]
fn cmd_edit<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    args: &EditArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let id = store.resolve_task(&args.id)?;
    let patch = build_patch(store, args, today)?;
    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass --title, --due, --time, --priority or --list"));
    }
    report(renderer, store.dispatch(Intent::UpdateTask(id.clone(), patch))?)?;
    renderer.message(&format!("Modified task {}.", short_id(&id)))
}

pub(crate) fn build_patch<B: BlobStore>(
    store: &TaskStore<B>,
    args: &EditArgs,
    today: NaiveDate,
) -> anyhow::Result<TaskPatch> {
    let due_date = match args.due.as_deref() {
        None => None,
        Some(raw) if is_clear(raw) => Some(None),
        Some(raw) => Some(Some(parse_due_date(raw, today)?)),
    };
    let time = match args.time.as_deref() {
        None => None,
        Some(raw) if is_clear(raw) => Some(None),
        Some(raw) => Some(Some(parse_due_time(raw)?)),
    };
    let list_id = match args.list.as_deref() {
        None => None,
        Some(raw) if is_clear(raw) => Some(None),
        Some(raw) => Some(Some(store.resolve_list(raw)?)),
    };
    let priority = args
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;

    Ok(TaskPatch {
        title: args.title.clone(),
        due_date,
        time,
        priority,
        list_id,
        ..TaskPatch::default()
    })
}

fn cmd_set_completed<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    tokens: &[String],
    completed: bool,
) -> anyhow::Result<()> {
    for id in resolve_ids(store, renderer, tokens)? {
        report(renderer, store.dispatch(Intent::SetCompleted(id, completed))?)?;
    }
    Ok(())
}

fn cmd_toggle<B: BlobStore>(store: &mut TaskStore<B>, renderer: &Renderer, tokens: &[String]) -> anyhow::Result<()> {
    for id in resolve_ids(store, renderer, tokens)? {
        report(renderer, store.dispatch(Intent::ToggleComplete(id))?)?;
    }
    Ok(())
}

fn cmd_delete<B: BlobStore>(store: &mut TaskStore<B>, renderer: &Renderer, tokens: &[String]) -> anyhow::Result<()> {
    let ids = resolve_ids(store, renderer, tokens)?;
    for id in &ids {
        store.dispatch(Intent::DeleteTask(id.clone()))?;
    }
    renderer.message(&format!("Deleted {} task(s).", ids.len()))
}

fn cmd_subtask<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    command: SubtaskCommand,
) -> anyhow::Result<()> {
    let outcome = match command {
        SubtaskCommand::Add { id, text } => {
            let id = store.resolve_task(&id)?;
            store.dispatch(Intent::AddSubtask(id, text.join(" ")))?
        }
        SubtaskCommand::Toggle { id, position } => {
            let id = store.resolve_task(&id)?;
            store.dispatch(Intent::ToggleSubtask(id, position_index(position)?))?
        }
        SubtaskCommand::Remove { id, position } => {
            let id = store.resolve_task(&id)?;
            store.dispatch(Intent::RemoveSubtask(id, position_index(position)?))?
        }
    };
    report(renderer, outcome)
}

fn position_index(position: usize) -> anyhow::Result<usize> {
    position
        .checked_sub(1)
        .ok_or_else(|| anyhow!("subtask positions start at 1"))
}

#[instrument(skip(store, renderer, command))]
fn cmd_bulk<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    command: BulkCommand,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let (target, action) = match command {
        BulkCommand::Done(target) => (target, Some(BulkAction::Complete)),
        BulkCommand::Undone(target) => (target, Some(BulkAction::Uncomplete)),
        BulkCommand::Priority { priority, target } => {
            (target, Some(BulkAction::SetPriority(priority.parse()?)))
        }
        BulkCommand::Move { list, target } => {
            let list = if is_clear(&list) {
                None
            } else {
                Some(store.resolve_list(&list)?)
            };
            (target, Some(BulkAction::MoveToList(list)))
        }
        BulkCommand::Delete(target) => (target, None),
    };

    let selected = select_target(store, renderer, &target, today)?;
    if selected == 0 {
        return renderer.message("No tasks selected.");
    }

    let outcome = match action {
        Some(action) => store.dispatch(Intent::BulkApply(action))?,
        None => store.dispatch(Intent::BulkDelete)?,
    };
    if let Outcome::Count(count) = outcome {
        info!(count, "command bulk");
        renderer.message(&format!("Updated {count} task(s)."))
    } else {
        report(renderer, outcome)
    }
}

/// Fills the selection from explicit ids or from a view and search. Returns the
/// selection size.
pub(crate) fn select_target<B: BlobStore>(
    store: &mut TaskStore<B>,
    renderer: &Renderer,
    target: &BulkTarget,
    today: NaiveDate,
) -> anyhow::Result<usize> {
    store.dispatch(Intent::ClearSelection)?;

    if target.ids.is_empty() && target.view.is_none() && target.search.is_none() {
        return Err(anyhow!("bulk needs task ids, --view or --search"));
    }

    for id in resolve_ids(store, renderer, &target.ids)? {
        store.dispatch(Intent::Select(id))?;
    }
    if target.view.is_some() || target.search.is_some() {
        let view = target
            .view
            .as_deref()
            .map(|raw| parse_view(store, raw))
            .transpose()?
            .unwrap_or_default();
        let query = ViewQuery::new(view).search(target.search.clone().unwrap_or_default());
        store.dispatch(Intent::SelectAll(query, today))?;
    }
    Ok(store.selected().len())
}

fn cmd_lists<B: BlobStore>(store: &mut TaskStore<B>, renderer: &Renderer, command: ListCommand) -> anyhow::Result<()> {
    let outcome = match command {
        ListCommand::Ls { archived } => {
            return renderer.print_lists(store.lists(), store.tasks(), archived);
        }
        ListCommand::Add { name, color, icon } => store.dispatch(Intent::CreateList {
            name: name.join(" "),
            color,
            icon,
        })?,
        ListCommand::Rename { list, name } => {
            let id = store.resolve_list(&list)?;
            store.dispatch(Intent::RenameList(id, name.join(" ")))?
        }
        ListCommand::Archive { list } => {
            let id = store.resolve_list(&list)?;
            store.dispatch(Intent::ArchiveList(id))?
        }
        ListCommand::Unarchive { list } => {
            let id = store.resolve_list(&list)?;
            store.dispatch(Intent::UnarchiveList(id))?
        }
        ListCommand::Delete { list } => {
            let id = store.resolve_list(&list)?;
            store.dispatch(Intent::DeleteList(id))?
        }
    };
    report(renderer, outcome)
}

#[instrument(skip(store, cfg))]
fn cmd_remind(store: &mut TaskStore<FileBlobStore>, cfg: &Config, now: DateTime<Utc>) -> anyhow::Result<()> {
    let scheduler = build_scheduler(cfg);
    let fired = scheduler
        .sweep(store, to_local(now))
        .context("reminder sweep failed")?;
    info!(count = fired.len(), "command remind");
    Ok(())
}

pub(crate) fn build_scheduler(cfg: &Config) -> NotificationScheduler<TerminalNotifier> {
    let enabled = cfg.get_bool("notify.enabled").unwrap_or(true);
    let window = cfg.get_u64("notify.window").unwrap_or(60);
    let interval = cfg.get_u64("notify.interval").unwrap_or(60).max(1);
    NotificationScheduler::new(
        TerminalNotifier::new(enabled),
        ReminderPolicy {
            window: chrono::Duration::minutes(window.min(MAX_WINDOW_MINUTES) as i64),
        },
        std::time::Duration::from_secs(interval),
    )
}

/// Resolves each token to a task id. Unknown tokens are reported and skipped;
/// ambiguous ones are errors.
fn resolve_ids<B: BlobStore>(
    store: &TaskStore<B>,
    renderer: &Renderer,
    tokens: &[String],
) -> anyhow::Result<Vec<TaskId>> {
    let mut ids = Vec::with_capacity(tokens.len());
    for token in tokens {
        match store.resolve_task(token) {
            Ok(id) => ids.push(id),
            Err(err @ StoreError::TaskNotFound(_)) => {
                warn!(token = %token, "no matching task");
                renderer.message(&format!("No task matches {token}: {err}"))?;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(ids)
}

fn report(renderer: &Renderer, outcome: Outcome) -> anyhow::Result<()> {
    match outcome {
        Outcome::TaskCreated(id) => renderer.message(&format!("Created task {}.", short_id(&id))),
        Outcome::ListCreated(id) => renderer.message(&format!("Created list {id}.")),
        Outcome::Completed(id, true) => renderer.message(&format!("Completed task {}.", short_id(&id))),
        Outcome::Completed(id, false) => renderer.message(&format!("Reopened task {}.", short_id(&id))),
        Outcome::SubtaskAdded(index) => renderer.message(&format!("Added subtask #{}.", index + 1)),
        Outcome::Count(count) => renderer.message(&format!("{count} task(s) affected.")),
        Outcome::NotFound(what) => renderer.message(&format!("Nothing changed: {what}.")),
        Outcome::Selected(_) | Outcome::Updated => Ok(()),
    }
}

fn is_clear(raw: &str) -> bool {
    CLEAR_WORDS.contains(&raw.trim().to_ascii_lowercase().as_str())
}

fn short_id(id: &TaskId) -> &str {
    let raw = id.as_str();
    raw.get(..8).unwrap_or(raw)
}
