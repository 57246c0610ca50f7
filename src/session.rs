//! A task session: the state container a front end owns.
//!
//! [`TaskSession`] ties a [`TaskStore`] and a [`FilterStore`] to a backend.
//! User operations update the store at once and queue the matching backend
//! write; a writer thread drains the queue in order. Snapshots, write results
//! and monitor ticks come back over one channel that the owner drains with
//! [`TaskSession::pump`], so all state changes happen on the owner's thread.
//!
//! Dropping the session unsubscribes from the backend and stops the writer.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Duration;

use crate::backend::{Subscription, TaskBackend};
use crate::clock::Clock;
use crate::due_soon::{DueSoonMonitor, NotificationSet};
use crate::error::{Error, Result};
use crate::filter::FilterStore;
use crate::reorder::move_item;
use crate::store::{Reconciliation, TaskStore};
use crate::task::{Task, TaskDraft, TaskPatch};
use crate::view;

enum WriteRequest {
    Create(Task),
    Update(Task),
    Delete(String),
    Flush(Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
    Delete,
}

impl WriteKind {
    fn verb(&self) -> &'static str {
        match self {
            WriteKind::Create => "create",
            WriteKind::Update => "update",
            WriteKind::Delete => "delete",
        }
    }
}

enum SessionMsg {
    Snapshot(Vec<Task>),
    SubscriptionError(String),
    WriteFailed {
        kind: WriteKind,
        task_id: String,
        /// Version carried by a failed update.
        version: Option<u64>,
        error: String,
    },
    Tick,
}

pub struct TaskSession {
    owner_id: String,
    backend: Arc<dyn TaskBackend>,
    clock: Arc<dyn Clock>,
    window: Duration,
    store: TaskStore,
    filters: FilterStore,
    last_error: Option<String>,
    last_reconciliation: Option<Reconciliation>,
    failed_writes: Vec<String>,
    msg_tx: Sender<SessionMsg>,
    msg_rx: Receiver<SessionMsg>,
    write_tx: Option<Sender<WriteRequest>>,
    writer: Option<JoinHandle<()>>,
    subscription: Option<Subscription>,
}

impl TaskSession {
    /// Start the writer, subscribe to `owner_id`'s tasks and apply the
    /// first snapshot.
    pub fn open(
        backend: Arc<dyn TaskBackend>,
        owner_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        let (msg_tx, msg_rx) = mpsc::channel();
        let (write_tx, write_rx) = mpsc::channel();
        let writer = spawn_writer(Arc::clone(&backend), write_rx, msg_tx.clone())?;

        let mut session = Self {
            owner_id,
            backend,
            clock,
            window,
            store: TaskStore::new(),
            filters: FilterStore::new(),
            last_error: None,
            last_reconciliation: None,
            failed_writes: Vec::new(),
            msg_tx,
            msg_rx,
            write_tx: Some(write_tx),
            writer: Some(writer),
            subscription: None,
        };

        let snapshot_tx = session.msg_tx.clone();
        let error_tx = session.msg_tx.clone();
        let subscription = session.backend.subscribe(
            &session.owner_id,
            Box::new(move |tasks| {
                let _ = snapshot_tx.send(SessionMsg::Snapshot(tasks));
            }),
            Box::new(move |err| {
                let _ = error_tx.send(SessionMsg::SubscriptionError(err.to_string()));
            }),
        )?;
        session.subscription = Some(subscription);
        session.pump();
        tracing::debug!(owner = %session.owner_id, tasks = session.store.len(), "session opened");
        Ok(session)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterStore {
        &mut self.filters
    }

    pub fn notifications(&self) -> &NotificationSet {
        self.store.notifications()
    }

    /// Tasks passing the current filters, in stored order.
    pub fn visible(&self) -> Vec<&Task> {
        view::visible_tasks(self.store.tasks(), self.filters.state(), self.store.notifications())
    }

    /// The most recent backend failure, shown until cleared.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn last_reconciliation(&self) -> Option<&Reconciliation> {
        self.last_reconciliation.as_ref()
    }

    pub fn resolve(&self, id_or_prefix: &str) -> Result<&Task> {
        self.store.resolve(id_or_prefix)
    }

    // =========================================================================
    // User operations
    // =========================================================================

    pub fn add_task(&mut self, draft: &TaskDraft) -> Result<Task> {
        let now = self.clock.now();
        let task = self
            .store
            .add_task(draft, &self.owner_id, now)
            .ok_or_else(|| Error::Validation("Title is required".to_string()))?;
        self.enqueue(WriteRequest::Create(task.clone()));
        self.refresh_notifications();
        Ok(task)
    }

    pub fn toggle_completion(&mut self, id: &str) -> Option<Task> {
        let task = self.store.toggle_completion(id, self.clock.now())?;
        self.enqueue(WriteRequest::Update(task.clone()));
        self.refresh_notifications();
        Some(task)
    }

    /// `Ok(None)` when the id is unknown or the patch changes nothing.
    pub fn edit_task(&mut self, id: &str, patch: &TaskPatch) -> Result<Option<Task>> {
        if matches!(patch.title.as_deref(), Some(title) if title.trim().is_empty()) {
            return Err(Error::Validation("Title is required".to_string()));
        }
        let Some(task) = self.store.edit_task(id, patch, self.clock.now()) else {
            return Ok(None);
        };
        self.enqueue(WriteRequest::Update(task.clone()));
        self.refresh_notifications();
        Ok(Some(task))
    }

    pub fn delete_task(&mut self, id: &str) -> Option<Task> {
        let task = self.store.delete_task(id)?;
        self.enqueue(WriteRequest::Delete(task.id.clone()));
        Some(task)
    }

    /// Replace the stored order and persist every task whose position moved.
    pub fn reorder(&mut self, new_order: Vec<Task>) {
        let moved = self.store.reorder(new_order, self.clock.now());
        for task in moved {
            self.enqueue(WriteRequest::Update(task));
        }
    }

    /// Move the task at stored index `from` to stored index `to`.
    pub fn move_task(&mut self, from: usize, to: usize) -> bool {
        let mut order = self.store.tasks().to_vec();
        if !move_item(&mut order, from, to) {
            return false;
        }
        self.reorder(order);
        true
    }

    pub fn dismiss_notification(&mut self, id: &str) -> bool {
        self.store.dismiss_notification(id)
    }

    /// Recompute due-soon flags against the session clock.
    pub fn refresh_notifications(&mut self) -> bool {
        self.store.refresh_notifications(self.clock.now(), self.window)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Apply everything that arrived from the backend, the writer and the
    /// monitor. Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        let messages: Vec<SessionMsg> = self.msg_rx.try_iter().collect();
        let handled = messages.len();
        for msg in messages {
            match msg {
                SessionMsg::Snapshot(tasks) => {
                    let report = self.store.replace_all(tasks);
                    self.last_reconciliation = Some(report);
                    self.refresh_notifications();
                }
                SessionMsg::SubscriptionError(error) => {
                    tracing::warn!(error = %error, "task subscription error");
                    self.last_error = Some(error);
                }
                SessionMsg::WriteFailed {
                    kind,
                    task_id,
                    version,
                    error,
                } => {
                    tracing::warn!(task_id = %task_id, op = kind.verb(), error = %error, "backend write failed");
                    match kind {
                        WriteKind::Create => self.store.acknowledge_create(&task_id),
                        WriteKind::Delete => self.store.acknowledge_delete(&task_id),
                        WriteKind::Update => {
                            self.store.reject_update(&task_id, version.unwrap_or_default())
                        }
                    }
                    let message = format!("Failed to {} task: {error}", kind.verb());
                    self.failed_writes.push(message.clone());
                    self.last_error = Some(message);
                }
                SessionMsg::Tick => {
                    self.refresh_notifications();
                }
            }
        }
        handled
    }

    /// Block until every queued write has been attempted, then pump.
    ///
    /// Fails with the first write error since the previous flush.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(write_tx) = &self.write_tx {
            let (done_tx, done_rx) = mpsc::channel();
            if write_tx.send(WriteRequest::Flush(done_tx)).is_ok() {
                let _ = done_rx.recv();
            }
        }
        self.pump();
        let failures = std::mem::take(&mut self.failed_writes);
        match failures.into_iter().next() {
            Some(message) => Err(Error::Backend(message)),
            None => Ok(()),
        }
    }

    /// Recurring due-soon recheck feeding this session's channel. The
    /// monitor stops when dropped or when the session is gone.
    pub fn spawn_monitor(&self, interval: std::time::Duration) -> Result<DueSoonMonitor> {
        let tick_tx = self.msg_tx.clone();
        DueSoonMonitor::spawn(interval, move || tick_tx.send(SessionMsg::Tick).is_ok())
    }

    fn enqueue(&mut self, request: WriteRequest) {
        let sent = self
            .write_tx
            .as_ref()
            .map(|tx| tx.send(request).is_ok())
            .unwrap_or(false);
        if !sent {
            self.last_error = Some("Task writer is not running".to_string());
        }
    }
}

impl Drop for TaskSession {
    fn drop(&mut self) {
        self.subscription.take();
        self.write_tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        tracing::debug!(owner = %self.owner_id, "session closed");
    }
}

fn spawn_writer(
    backend: Arc<dyn TaskBackend>,
    requests: Receiver<WriteRequest>,
    results: Sender<SessionMsg>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("task-writer".to_string())
        .spawn(move || {
            for request in requests {
                let (kind, task_id, version, outcome) = match request {
                    WriteRequest::Create(task) => {
                        let outcome = backend.create(&task).map(|_| ());
                        (WriteKind::Create, task.id, None, outcome)
                    }
                    WriteRequest::Update(task) => {
                        let outcome = backend.update(&task);
                        (WriteKind::Update, task.id, Some(task.version), outcome)
                    }
                    WriteRequest::Delete(id) => {
                        let outcome = backend.delete(&id);
                        (WriteKind::Delete, id, None, outcome)
                    }
                    WriteRequest::Flush(done) => {
                        let _ = done.send(());
                        continue;
                    }
                };
                if let Err(err) = outcome {
                    let _ = results.send(SessionMsg::WriteFailed {
                        kind,
                        task_id,
                        version,
                        error: err.to_string(),
                    });
                }
            }
        })
        .map_err(|err| Error::OperationFailed(format!("failed to start task writer: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::backend::MemoryBackend;
    use crate::clock::FixedClock;
    use crate::filter::StatusFilter;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap()))
    }

    fn open(backend: &MemoryBackend, clock: Arc<FixedClock>) -> TaskSession {
        TaskSession::open(Arc::new(backend.clone()), "alice", clock, Duration::hours(24))
            .expect("session")
    }

    #[test]
    fn operations_reach_the_backend() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, clock());

        let task = session.add_task(&TaskDraft::new("Write report")).unwrap();
        session.toggle_completion(&task.id).unwrap();
        session.flush().unwrap();

        let stored = backend.snapshot("alice").unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].completed);
        assert_eq!(session.tasks().len(), 1);

        session.delete_task(&task.id).unwrap();
        session.flush().unwrap();
        assert!(backend.snapshot("alice").unwrap().is_empty());
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn blank_title_is_a_validation_error() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, clock());
        assert!(matches!(
            session.add_task(&TaskDraft::new("  ")),
            Err(Error::Validation(_))
        ));
        let patch = TaskPatch {
            title: Some(" ".to_string()),
            ..TaskPatch::default()
        };
        assert!(matches!(session.edit_task("x", &patch), Err(Error::Validation(_))));
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn remote_changes_arrive_through_pump() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, clock());

        let now = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let remote = Task::from_draft("remote-1", &TaskDraft::new("From elsewhere"), "alice", now).unwrap();
        backend.create(&remote).unwrap();
        assert!(session.tasks().is_empty());

        assert!(session.pump() > 0);
        assert_eq!(session.tasks()[0].id, "remote-1");
    }

    #[test]
    fn failed_write_surfaces_as_error() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, clock());
        let task = session.add_task(&TaskDraft::new("Vanishing")).unwrap();
        session.flush().unwrap();

        // Removed behind the session's back; the snapshot is not pumped yet.
        backend.delete(&task.id).unwrap();
        session.toggle_completion(&task.id).unwrap();
        let err = session.flush().unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(session.last_error().unwrap().starts_with("Failed to update task"));
        session.clear_error();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn due_soon_scenario() {
        let backend = MemoryBackend::new();
        let clock = clock();
        let mut session = open(&backend, Arc::clone(&clock));

        let due = clock.now() + Duration::hours(3);
        let task = session.add_task(&TaskDraft::new("Pay rent").due(due)).unwrap();
        session.flush().unwrap();
        assert!(session.notifications().contains(&task.id));

        session.filters_mut().set_status(StatusFilter::DueSoon);
        assert_eq!(session.visible().len(), 1);

        session.toggle_completion(&task.id).unwrap();
        assert!(!session.notifications().contains(&task.id));
        assert!(session.visible().is_empty());
        assert_eq!(session.tasks().len(), 1);
    }

    #[test]
    fn monitor_ticks_pick_up_the_window() {
        let backend = MemoryBackend::new();
        let clock = clock();
        let mut session = open(&backend, Arc::clone(&clock));
        let task = session
            .add_task(&TaskDraft::new("Later").due(clock.now() + Duration::hours(30)))
            .unwrap();
        assert!(!session.notifications().contains(&task.id));

        clock.advance(Duration::hours(7));
        let monitor = session
            .spawn_monitor(std::time::Duration::from_millis(5))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(monitor);

        session.pump();
        assert!(session.notifications().contains(&task.id));
    }

    #[test]
    fn move_task_persists_new_positions() {
        let backend = MemoryBackend::new();
        let mut session = open(&backend, clock());
        for title in ["a", "b", "c"] {
            session.add_task(&TaskDraft::new(title)).unwrap();
        }
        session.flush().unwrap();

        assert!(session.move_task(0, 2));
        assert!(!session.move_task(5, 0));
        session.flush().unwrap();

        let titles: Vec<String> = backend
            .snapshot("alice")
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
        let local: Vec<&str> = session.tasks().iter().map(|task| task.title.as_str()).collect();
        assert_eq!(local, vec!["b", "c", "a"]);
    }
}
