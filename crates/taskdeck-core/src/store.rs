use std::collections::HashSet;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::storage::KvStorage;
use crate::task::{Status, Task, TaskDraft, TaskPatch};

/// Slot that has always held the task list.
pub const STORAGE_KEY: &str = "taskmanager-tasks";

/// The in-memory task list and the slot it is mirrored to.
///
/// Newest tasks come first. Every mutation rewrites the whole slot; nothing
/// is written until [`TaskStore::load`] has run.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
    loaded: bool,
}

impl<S: KvStorage> TaskStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, STORAGE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            tasks: Vec::new(),
            loaded: false,
        }
    }

    /// Opens `storage` and loads it in one step.
    pub fn open(storage: S) -> anyhow::Result<Self> {
        let mut store = Self::new(storage);
        store.load()?;
        Ok(store)
    }

    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub fn load(&mut self) -> anyhow::Result<()> {
        let raw = self
            .storage
            .get_item(&self.key)
            .with_context(|| format!("failed to read slot {}", self.key))?;

        self.tasks = match raw {
            Some(raw) if !raw.trim().is_empty() => {
                let parsed: Vec<Task> = serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing task list in slot {}", self.key))?;
                normalize_loaded(parsed)
            }
            _ => {
                debug!("no persisted task list; starting empty");
                Vec::new()
            }
        };
        self.loaded = true;

        info!(count = self.tasks.len(), "loaded tasks");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn by_status(&self, status: Status) -> Vec<&Task> {
        self.tasks.iter().filter(|task| task.status == status).collect()
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn add(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<&Task> {
        self.ensure_loaded()?;

        let mut draft = draft;
        draft.title = clean_title(&draft.title)?;
        draft.description = clean_description(draft.description);

        let mut task = Task::from_draft(draft, now);
        while self.get(&task.id).is_some() {
            warn!(id = %task.id, "generated id collided; regenerating");
            task = Task {
                id: uuid::Uuid::new_v4().to_string(),
                ..task
            };
        }

        debug!(id = %task.id, "task added");
        self.tasks.insert(0, task);
        self.persist()?;
        Ok(&self.tasks[0])
    }

    /// Merges `patch` into the task with `id`. Returns `None` when no task
    /// has that id, in which case nothing is written.
    #[tracing::instrument(skip(self, patch, now))]
    pub fn update(
        &mut self,
        id: &str,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<&Task>> {
        self.ensure_loaded()?;

        let title = patch.title.as_deref().map(clean_title).transpose()?;

        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            debug!("update target not found");
            return Ok(None);
        };

        let task = &mut self.tasks[idx];
        let was_done = task.is_done();

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = clean_description(description);
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }

        if task.is_done() {
            if !was_done || task.completed_at.is_none() {
                task.completed_at = Some(now);
            }
        } else {
            task.completed_at = None;
        }

        debug!(status = %task.status, "task updated");
        self.persist()?;
        Ok(Some(&self.tasks[idx]))
    }

    /// Deletes the task with `id`; `false` when there was none.
    #[tracing::instrument(skip(self))]
    pub fn remove(&mut self, id: &str) -> anyhow::Result<bool> {
        self.ensure_loaded()?;

        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        if self.tasks.len() == before {
            debug!("remove target not found");
            return Ok(false);
        }

        self.persist()?;
        Ok(true)
    }

    /// Picks one task by exact id, 1-based list position, or unique id prefix.
    pub fn resolve(&self, selector: &str) -> anyhow::Result<&Task> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(anyhow!("task selector cannot be empty"));
        }

        if let Some(task) = self.get(selector) {
            return Ok(task);
        }

        if let Ok(position) = selector.parse::<usize>()
            && position >= 1
            && position <= self.tasks.len()
        {
            return Ok(&self.tasks[position - 1]);
        }

        let mut matches = self.tasks.iter().filter(|task| task.id.starts_with(selector));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task),
            (Some(_), Some(_)) => Err(anyhow!("ambiguous task selector: {selector}")),
            (None, _) => Err(anyhow!("no task matches: {selector}")),
        }
    }

    fn ensure_loaded(&self) -> anyhow::Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(anyhow!("task store used before load"))
        }
    }

    #[tracing::instrument(skip(self), fields(key = %self.key, count = self.tasks.len()))]
    fn persist(&self) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&self.tasks)?;
        self.storage
            .set_item(&self.key, &payload)
            .with_context(|| format!("failed to save slot {}", self.key))
    }
}

fn clean_title(raw: &str) -> anyhow::Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }
    Ok(title.to_string())
}

fn clean_description(raw: Option<String>) -> Option<String> {
    raw.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn normalize_loaded(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::with_capacity(tasks.len());
    let mut out = Vec::with_capacity(tasks.len());

    for mut task in tasks {
        if !seen.insert(task.id.clone()) {
            warn!(id = %task.id, "dropping task with duplicate id");
            continue;
        }

        match (task.status, task.completed_at) {
            (Status::Done, None) => {
                warn!(id = %task.id, "done task without completion time; using creation time");
                task.completed_at = Some(task.created_at);
            }
            (Status::Todo | Status::InProgress, Some(_)) => {
                warn!(id = %task.id, "open task carried a completion time; clearing it");
                task.completed_at = None;
            }
            _ => {}
        }

        out.push(task);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::task::Priority;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn mutations_require_load() {
        let mut store = TaskStore::new(MemoryStorage::new());
        assert!(store.add(TaskDraft::new("early"), now()).is_err());
        store.load().expect("load");
        assert!(store.is_loaded());
        assert!(store.add(TaskDraft::new("after load"), now()).is_ok());
    }

    #[test]
    fn add_prepends_and_persists() {
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");
        store.add(TaskDraft::new("first"), now()).expect("add first");
        store.add(TaskDraft::new("second"), now()).expect("add second");

        let titles: Vec<_> = store.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);

        let raw = store
            .storage()
            .get_item(STORAGE_KEY)
            .expect("get")
            .expect("slot written");
        let persisted: Vec<Task> = serde_json::from_str(&raw).expect("parse slot");
        assert_eq!(persisted, store.tasks());
    }

    #[test]
    fn rejects_blank_titles() {
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");
        assert!(store.add(TaskDraft::new("   "), now()).is_err());
        let id = store.add(TaskDraft::new("ok"), now()).expect("add").id.clone();
        let patch = TaskPatch {
            title: Some(String::new()),
            ..TaskPatch::default()
        };
        assert!(store.update(&id, patch, now()).is_err());
        assert_eq!(store.tasks()[0].title, "ok");
    }

    #[test]
    fn completion_time_follows_status() {
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");
        let id = store.add(TaskDraft::new("ship"), now()).expect("add").id.clone();

        let done_at = now() + Duration::hours(2);
        let task = store
            .update(&id, TaskPatch::status(Status::Done), done_at)
            .expect("update")
            .expect("found");
        assert_eq!(task.completed_at, Some(done_at));

        // Editing other fields of a done task keeps the original stamp.
        let patch = TaskPatch {
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        let task = store
            .update(&id, patch, done_at + Duration::hours(1))
            .expect("update")
            .expect("found");
        assert_eq!(task.completed_at, Some(done_at));

        let task = store
            .update(&id, TaskPatch::status(Status::InProgress), done_at)
            .expect("update")
            .expect("found");
        assert_eq!(task.completed_at, None);
    }

    #[test]
    fn unknown_ids_are_reported_not_written() {
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");
        assert!(
            store
                .update("nope", TaskPatch::status(Status::Done), now())
                .expect("update")
                .is_none()
        );
        assert!(!store.remove("nope").expect("remove"));
        assert_eq!(store.storage().get_item(STORAGE_KEY).expect("get"), None);
    }

    #[test]
    fn load_repairs_invariants() {
        let raw = r#"[
            {"id":"a","title":"done","status":"done","priority":"low","createdAt":"2026-10-01T00:00:00.000Z"},
            {"id":"b","title":"open","status":"todo","priority":"high","createdAt":"2026-10-02T00:00:00.000Z","completedAt":"2026-10-03T00:00:00.000Z"},
            {"id":"a","title":"dupe","status":"todo","priority":"low","createdAt":"2026-10-04T00:00:00.000Z"}
        ]"#;
        let store = TaskStore::open(MemoryStorage::with_item(STORAGE_KEY, raw)).expect("open");

        assert_eq!(store.tasks().len(), 2);
        let done = store.get("a").expect("a");
        assert_eq!(done.title, "done");
        assert_eq!(done.completed_at, Some(done.created_at));
        assert_eq!(store.get("b").expect("b").completed_at, None);
    }

    #[test]
    fn malformed_slot_fails_load() {
        let mut store = TaskStore::new(MemoryStorage::with_item(STORAGE_KEY, "{not json"));
        let err = store.load().expect_err("load should fail");
        assert!(format!("{err:#}").contains("failed parsing task list"));
        assert!(!store.is_loaded());
    }

    #[test]
    fn resolves_by_position_and_prefix() {
        let mut store = TaskStore::open(MemoryStorage::new()).expect("open");
        store.add(TaskDraft::new("older"), now()).expect("add");
        let newest = store.add(TaskDraft::new("newer"), now()).expect("add").id.clone();

        assert_eq!(store.resolve("1").expect("position").id, newest);
        assert_eq!(store.resolve(&newest[..12]).expect("prefix").id, newest);
        assert_eq!(store.resolve(&newest).expect("exact").title, "newer");
        assert!(store.resolve("zzzz").is_err());
    }
}
