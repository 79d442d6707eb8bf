use std::sync::Arc;

use chrono::NaiveDate;
use protask_core::blob::{BlobStore, FileBlobStore, MemoryBlobStore};
use protask_core::error::StoreError;
use protask_core::intent::{Intent, Outcome};
use protask_core::snapshot::Snapshot;
use protask_core::store::{BulkAction, RemoteChangeKind, StoreEvent, TaskStore};
use protask_core::sync::ExternalChange;
use protask_core::task::{ListId, TaskDraft, TaskId};
use protask_core::view::{SmartFilter, SortMode, ViewDescriptor, ViewQuery};
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn now() -> NaiveDate {
    date(2024, 6, 1)
}

fn memory_store() -> (Arc<MemoryBlobStore>, TaskStore<MemoryBlobStore>) {
    let blob = Arc::new(MemoryBlobStore::new());
    let store = TaskStore::open(blob.clone(), "User-1", now());
    (blob, store)
}

fn titles(tasks: &[&protask_core::task::Task]) -> Vec<String> {
    tasks.iter().map(|t| t.title.clone()).collect()
}

#[test]
fn creation_adds_exactly_one_visible_task() {
    let (_, mut store) = memory_store();
    for n in 0..5 {
        let before = store.tasks().len();
        let id = store
            .create_task(TaskDraft::titled(format!("task {n}")))
            .expect("create");
        assert_eq!(store.tasks().len(), before + 1);

        let all = store.query(&ViewQuery::new(ViewDescriptor::All), now());
        assert!(all.iter().any(|t| t.id == id));
    }
}

#[test]
fn completing_twice_is_idempotent() {
    let (_, mut store) = memory_store();
    let id = store.create_task(TaskDraft::titled("x")).expect("create");
    let mut events = store.subscribe();

    for _ in 0..2 {
        let outcome = store
            .dispatch(Intent::SetCompleted(id.clone(), true))
            .expect("set completed");
        assert_eq!(outcome, Outcome::Completed(id.clone(), true));
    }

    assert!(store.task(&id).expect("task").completed);
    assert_eq!(events.try_recv().expect("one event"), StoreEvent::LocalChange);
    assert!(events.try_recv().is_err());
}

#[test]
fn export_import_round_trip() {
    let (_, mut store) = memory_store();
    let list = store.create_list("Work", Some("#3366ff".into()), Some("briefcase".into())).expect("list");
    store
        .create_task(TaskDraft {
            due_date: Some(date(2024, 6, 3)),
            list_id: Some(list.clone()),
            subtasks: vec!["one".into(), "two".into()],
            ..TaskDraft::titled("Quarterly report")
        })
        .expect("create");
    store.create_task(TaskDraft::titled("Loose end")).expect("create");
    store.set_view(ViewDescriptor::List(list)).expect("view");
    let first = store.tasks()[0].id.clone();
    store.select(&first).expect("select");

    let exported = store.export_snapshot().expect("export");
    let before = store.snapshot();

    store.create_task(TaskDraft::titled("after export")).expect("create");
    store.import_snapshot(&exported).expect("import");

    assert_eq!(store.snapshot(), before);
    assert!(store.selected().is_empty());
}

#[test]
fn smart_filters_on_fixed_dates() {
    let (_, mut store) = memory_store();
    let done = store
        .create_task(TaskDraft { due_date: Some(date(2024, 1, 1)), ..TaskDraft::titled("done") })
        .expect("create");
    store.set_completed(&done, true).expect("complete");
    store
        .create_task(TaskDraft { due_date: Some(date(2024, 1, 2)), ..TaskDraft::titled("late") })
        .expect("create");
    store
        .create_task(TaskDraft { due_date: Some(date(2099, 1, 1)), ..TaskDraft::titled("future") })
        .expect("create");

    let run = |view: ViewDescriptor, today: NaiveDate| titles(&store.query(&ViewQuery::new(view), today));

    assert_eq!(run(ViewDescriptor::Smart(SmartFilter::Overdue), now()), ["late"]);
    assert_eq!(run(ViewDescriptor::Smart(SmartFilter::Upcoming), now()), ["future"]);
    assert_eq!(run(ViewDescriptor::Today, date(2024, 1, 1)), ["done"]);
}

#[test]
fn search_composes_with_list_view() {
    let (_, mut store) = memory_store();
    let a = store.create_list("A", None, None).expect("list");
    let b = store.create_list("B", None, None).expect("list");
    for (title, list) in [
        ("Buy milk", &a),
        ("Buy stamps", &b),
        ("Buy eggs", &a),
        ("Clean house", &a),
    ] {
        store
            .create_task(TaskDraft { list_id: Some(list.clone()), ..TaskDraft::titled(title) })
            .expect("create");
    }

    let query = ViewQuery::new(ViewDescriptor::List(a)).search("BUY");
    assert_eq!(titles(&store.query(&query, now())), ["Buy milk", "Buy eggs"]);

    let by_priority = query.sort(SortMode::Priority);
    assert_eq!(titles(&store.query(&by_priority, now())), ["Buy milk", "Buy eggs"]);
}

#[test]
fn bulk_complete_three_of_five() {
    let (_, mut store) = memory_store();
    let ids: Vec<TaskId> = (0..5)
        .map(|n| store.create_task(TaskDraft::titled(format!("t{n}"))).expect("create"))
        .collect();

    for id in [&ids[0], &ids[2], &ids[4]] {
        store.dispatch(Intent::Select(id.clone())).expect("select");
    }
    let outcome = store
        .dispatch(Intent::BulkApply(BulkAction::Complete))
        .expect("bulk");
    assert_eq!(outcome, Outcome::Count(3));

    let completed: Vec<bool> = ids
        .iter()
        .map(|id| store.task(id).expect("task").completed)
        .collect();
    assert_eq!(completed, [true, false, true, false, true]);
    assert!(store.selected().is_empty());
}

#[test]
fn external_add_reloads_and_signals_task_added() {
    let blob = Arc::new(MemoryBlobStore::new());
    let mut mine = TaskStore::open(blob.clone(), "User-1", now());
    mine.create_task(TaskDraft::titled("mine")).expect("create");
    let mut events = mine.subscribe();

    let mut theirs = TaskStore::open(blob.clone(), "User-2", now());
    theirs.create_task(TaskDraft::titled("theirs")).expect("create");
    theirs.create_task(TaskDraft::titled("theirs too")).expect("create");

    let change = mine
        .apply_external_change(&ExternalChange::new("test"))
        .expect("reload")
        .expect("state changed");
    assert_eq!(change.kind, RemoteChangeKind::TaskAdded);

    let persisted = Snapshot::decode(&blob.contents().expect("blob")).expect("decode");
    assert_eq!(mine.tasks().len(), persisted.todos.len());
    assert_eq!(mine.tasks().len(), 3);
    assert_eq!(events.try_recv().expect("event"), StoreEvent::RemoteChange(change));
}

#[test]
fn rejected_imports_keep_prior_state() {
    let (blob, mut store) = memory_store();
    store.create_task(TaskDraft::titled("keep me")).expect("create");
    let before = store.snapshot();
    let persisted = blob.contents();

    let duplicate_ids = r#"{"schemaVersion":1,"lists":[],"todos":[
        {"id":"a","title":"one"},{"id":"a","title":"two"}]}"#;
    let future_schema = r#"{"schemaVersion":99,"lists":[],"todos":[]}"#;

    for bad in ["not json", "42", duplicate_ids, future_schema] {
        assert!(store.dispatch(Intent::Import(bad.to_string())).is_err(), "{bad}");
        assert_eq!(store.snapshot(), before);
    }
    assert!(matches!(
        store.import_snapshot(future_schema),
        Err(StoreError::UnsupportedSchema { .. })
    ));
    assert_eq!(blob.contents(), persisted);
}

#[test]
fn archived_list_tasks_only_in_their_own_view() {
    let (_, mut store) = memory_store();
    let old = store.create_list("Old", None, None).expect("list");
    let id = store
        .create_task(TaskDraft { list_id: Some(old.clone()), ..TaskDraft::titled("buried") })
        .expect("create");
    store.archive_list(&old).expect("archive");

    assert!(store.query(&ViewQuery::new(ViewDescriptor::All), now()).is_empty());
    assert!(
        store
            .query(&ViewQuery::new(ViewDescriptor::Smart(SmartFilter::NoDue)), now())
            .is_empty()
    );
    assert_eq!(
        titles(&store.query(&ViewQuery::new(ViewDescriptor::List(old.clone())), now())),
        ["buried"]
    );
    assert!(store.task(&id).is_some());

    store.unarchive_list(&old).expect("unarchive");
    assert_eq!(store.query(&ViewQuery::new(ViewDescriptor::All), now()).len(), 1);
}

#[test]
fn legacy_array_blob_loads_as_tasks() {
    let legacy = r#"[
        {"id": 1700000000000, "title": "Legacy", "date": "2024-05-30", "priority": "high", "completed": true},
        {"id": 1700000000001, "title": "Another", "listId": "gone"}
    ]"#;
    let blob = Arc::new(MemoryBlobStore::with_contents(legacy));
    let store = TaskStore::open(blob, "User-1", now());

    assert_eq!(store.tasks().len(), 2);
    let first = &store.tasks()[0];
    assert_eq!(first.id.as_str(), "1700000000000");
    assert_eq!(first.due_date, Some(date(2024, 5, 30)));
    assert!(first.completed);

    // A dangling list id still shows up in the unfiltered view.
    let all = store.query(&ViewQuery::new(ViewDescriptor::All), now());
    assert_eq!(all.len(), 2);
    assert!(store.list(&ListId::from("gone")).is_none());
}

#[test]
fn file_store_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let blob = Arc::new(FileBlobStore::open(temp.path()).expect("open blob"));
    let mut store = TaskStore::open(blob.clone(), "User-1", now());
    let id = store
        .create_task(TaskDraft { subtasks: vec!["a".into()], ..TaskDraft::titled("durable") })
        .expect("create");
    store.toggle_subtask(&id, 0).expect("toggle subtask");
    assert!(blob.read().expect("read").is_some());

    let reopened = TaskStore::open(
        Arc::new(FileBlobStore::open(temp.path()).expect("reopen blob")),
        "User-2",
        now(),
    );
    let task = reopened.task(&id).expect("persisted task");
    assert_eq!(task.subtask_progress(), (1, 1));
    assert!(task.is_owned_by("User-1"));

    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name() != protask_core::blob::BLOB_FILE_NAME)
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind");
}
