use chrono::{NaiveDate, Utc};
use taskdeck_core::filter::TaskQuery;
use taskdeck_core::storage::{FileStorage, KvStorage};
use taskdeck_core::store::{STORAGE_KEY, TaskStore};
use taskdeck_core::task::{Priority, Status, TaskDraft, TaskPatch};
use tempfile::tempdir;

#[test]
fn store_persists_across_reopen_and_filters() {
    let temp = tempdir().expect("tempdir");
    let storage = FileStorage::open(temp.path()).expect("open storage");
    let now = Utc::now();
    let due = NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date");

    let (rent_id, milk_id) = {
        let mut store = TaskStore::open(&storage).expect("open store");
        assert!(store.tasks().is_empty());

        let rent = store
            .add(
                TaskDraft::new("Pay rent")
                    .with_priority(Priority::High)
                    .with_due_date(due),
                now,
            )
            .expect("add rent")
            .id
            .clone();
        let milk = store
            .add(TaskDraft::new("Buy milk").with_description("oat, two litres"), now)
            .expect("add milk")
            .id
            .clone();

        let updated = store
            .update(&rent, TaskPatch::status(Status::Done), now)
            .expect("update")
            .expect("task exists");
        assert!(updated.completed_at.is_some());
        (rent, milk)
    };

    let raw = storage
        .get_item(STORAGE_KEY)
        .expect("read slot")
        .expect("slot written");
    assert!(raw.contains("\"dueDate\":\"2026-11-02\""));
    assert!(raw.contains("\"status\":\"done\""));

    let mut store = TaskStore::open(&storage).expect("reopen store");
    let ids: Vec<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, [milk_id.as_str(), rent_id.as_str()]);
    assert_eq!(store.by_status(Status::Done).len(), 1);
    assert_eq!(store.by_status(Status::Todo).len(), 1);

    let query = TaskQuery::parse(&["OAT".to_string(), "status:todo".to_string()])
        .expect("parse query");
    let hits = query.apply(store.tasks());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Buy milk");

    assert!(store.remove(&milk_id).expect("remove"));
    assert!(!store.remove(&milk_id).expect("second remove"));

    let store = TaskStore::open(&storage).expect("reopen after remove");
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].id, rent_id);
}

#[test]
fn corrupt_slot_is_reported() {
    let temp = tempdir().expect("tempdir");
    let storage = FileStorage::open(temp.path()).expect("open storage");
    storage
        .set_item(STORAGE_KEY, "{not json")
        .expect("write garbage");

    assert!(TaskStore::open(&storage).is_err());
}
