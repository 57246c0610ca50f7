//! File-backed task persistence.
//!
//! Every write appends a [`TaskEvent`] to `tasks.jsonl` and folds it into
//! `tasks.snapshot.json`, both under the data-directory lock. Readers use the
//! snapshot and rebuild it from the log when it is missing. Subscribers are
//! driven by a filesystem watcher, so writes from other processes sharing the
//! directory are picked up too.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::storage::{Storage, TASKS_LOG_FILE, TASKS_SNAPSHOT_FILE};
use crate::task::{generate_task_id, Task};

use super::{owned_by, sort_snapshot, ErrorCallback, SnapshotCallback, Subscription, TaskBackend};

pub const SNAPSHOT_SCHEMA_VERSION: &str = "taskmaster.tasks.v1";
const WATCH_DEBOUNCE_MS: u64 = 150;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    pub timestamp: DateTime<Utc>,
    /// Full task state after the event; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl TaskEvent {
    pub fn new(event_type: TaskEventType, task_id: impl Into<String>, task: Option<Task>) -> Self {
        Self {
            event_id: Ulid::new().to_string(),
            task_id: task_id.into(),
            event_type,
            timestamp: Utc::now(),
            task,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl TaskSnapshot {
    pub fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tasks: Vec::new(),
        }
    }
}

fn apply_event(map: &mut HashMap<String, Task>, event: &TaskEvent) {
    match (event.event_type, &event.task) {
        (TaskEventType::TaskCreated | TaskEventType::TaskUpdated, Some(task)) => {
            map.insert(event.task_id.clone(), task.clone());
        }
        (TaskEventType::TaskDeleted, _) => {
            map.remove(&event.task_id);
        }
        (_, None) => {
            tracing::warn!(event_id = %event.event_id, "event without task state ignored");
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileBackend {
    storage: Storage,
}

impl FileBackend {
    /// Open the backend, creating the data directory when needed.
    pub fn open(storage: Storage) -> Result<Self> {
        storage.init()?;
        Ok(Self { storage })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Every event in the log, oldest first.
    pub fn events(&self) -> Result<Vec<TaskEvent>> {
        self.storage.read_jsonl(&self.storage.tasks_log())
    }

    /// All tasks of all owners.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        if let Some(snapshot) = self.load_snapshot()? {
            return Ok(snapshot.tasks);
        }
        let _lock = self.storage.lock()?;
        let snapshot = self.rebuild_snapshot()?;
        self.storage
            .write_json(&self.storage.tasks_snapshot(), &snapshot)?;
        Ok(snapshot.tasks)
    }

    fn load_snapshot(&self) -> Result<Option<TaskSnapshot>> {
        let path = self.storage.tasks_snapshot();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.storage.read_json(&path)?))
    }

    fn rebuild_snapshot(&self) -> Result<TaskSnapshot> {
        // Log order is commit order.
        let events = self.events()?;
        let mut map = HashMap::new();
        for event in &events {
            apply_event(&mut map, event);
        }
        let mut snapshot = TaskSnapshot::empty();
        snapshot.tasks = map.into_values().collect();
        sort_snapshot(&mut snapshot.tasks);
        tracing::debug!(events = events.len(), tasks = snapshot.tasks.len(), "rebuilt task snapshot");
        Ok(snapshot)
    }

    /// Append `event` and fold it into the snapshot under the writer lock.
    /// `check` sees the current tasks before anything is written.
    fn commit<F>(&self, event: TaskEvent, check: F) -> Result<()>
    where
        F: FnOnce(&HashMap<String, Task>) -> Result<()>,
    {
        let _lock = self.storage.lock()?;
        let mut snapshot = match self.load_snapshot()? {
            Some(snapshot) => snapshot,
            None => self.rebuild_snapshot()?,
        };
        let mut map: HashMap<String, Task> = snapshot
            .tasks
            .drain(..)
            .map(|task| (task.id.clone(), task))
            .collect();
        check(&map)?;

        self.storage.append_jsonl(&self.storage.tasks_log(), &event)?;
        apply_event(&mut map, &event);

        snapshot.tasks = map.into_values().collect();
        sort_snapshot(&mut snapshot.tasks);
        snapshot.generated_at = Utc::now();
        self.storage
            .write_json(&self.storage.tasks_snapshot(), &snapshot)?;
        tracing::debug!(task_id = %event.task_id, kind = ?event.event_type, "task event committed");
        Ok(())
    }
}

fn is_task_file(path: &Path) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(|name| name == TASKS_SNAPSHOT_FILE || name == TASKS_LOG_FILE)
        .unwrap_or(false)
}

enum WatchMsg {
    Fs(notify::Result<notify::Event>),
    Stop,
}

impl TaskBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn subscribe(
        &self,
        owner_id: &str,
        mut on_snapshot: SnapshotCallback,
        mut on_error: ErrorCallback,
    ) -> Result<Subscription> {
        let (msg_tx, msg_rx) = mpsc::channel::<WatchMsg>();
        let fs_tx = msg_tx.clone();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = fs_tx.send(WatchMsg::Fs(res));
        })?;
        watcher.watch(self.storage.root(), RecursiveMode::NonRecursive)?;

        let mut last = self.snapshot(owner_id)?;
        on_snapshot(last.clone());

        let backend = self.clone();
        let owner_id = owner_id.to_string();
        let handle = thread::Builder::new()
            .name("task-watch".to_string())
            .spawn(move || {
                // Dropped with the thread, which ends the notify callbacks.
                let _watcher = watcher;
                let debounce = Duration::from_millis(WATCH_DEBOUNCE_MS);
                let mut pending: Option<Instant> = None;
                loop {
                    let timeout = pending
                        .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                        .unwrap_or(Duration::from_secs(3600));
                    match msg_rx.recv_timeout(timeout) {
                        Ok(WatchMsg::Fs(Ok(event))) => {
                            if event.paths.iter().any(|path| is_task_file(path)) {
                                pending = Some(Instant::now() + debounce);
                            }
                        }
                        Ok(WatchMsg::Fs(Err(err))) => on_error(Error::Watch(err)),
                        Ok(WatchMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            if pending.take().is_none() {
                                continue;
                            }
                            match backend.snapshot(&owner_id) {
                                Ok(tasks) if tasks != last => {
                                    last = tasks.clone();
                                    on_snapshot(tasks);
                                }
                                Ok(_) => {}
                                Err(err) => on_error(err),
                            }
                        }
                    }
                }
                tracing::debug!(owner = %owner_id, "task watch stopped");
            })
            .map_err(|err| Error::OperationFailed(format!("failed to start watcher: {err}")))?;

        Ok(Subscription::new(move || {
            let _ = msg_tx.send(WatchMsg::Stop);
            let _ = handle.join();
        }))
    }

    fn snapshot(&self, owner_id: &str) -> Result<Vec<Task>> {
        Ok(owned_by(&self.load_all()?, owner_id))
    }

    fn create(&self, task: &Task) -> Result<String> {
        let mut task = task.clone();
        if task.id.is_empty() {
            task.id = generate_task_id();
        }
        let id = task.id.clone();
        let event = TaskEvent::new(TaskEventType::TaskCreated, id.clone(), Some(task));
        self.commit(event, |tasks| {
            if tasks.contains_key(&id) {
                return Err(Error::Backend(format!("task {id} already exists")));
            }
            Ok(())
        })?;
        Ok(id)
    }

    fn update(&self, task: &Task) -> Result<()> {
        let event = TaskEvent::new(TaskEventType::TaskUpdated, task.id.clone(), Some(task.clone()));
        self.commit(event, |tasks| {
            if !tasks.contains_key(&task.id) {
                return Err(Error::Backend(format!("task {} does not exist", task.id)));
            }
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        {
            let current = self.load_all()?;
            if !current.iter().any(|task| task.id == id) {
                return Ok(());
            }
        }
        self.commit(TaskEvent::new(TaskEventType::TaskDeleted, id, None), |_| Ok(()))
    }
}
