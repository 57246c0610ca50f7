//! In-memory task store.
//!
//! Holds the task list in display order together with the due-soon
//! [`NotificationSet`]. Local operations mutate immediately; backend snapshots
//! arrive through [`TaskStore::replace_all`], which reconciles them against
//! optimistic edits that have not been acknowledged yet.
//!
//! Operations on unknown ids are silent no-ops (`None` / `false`).

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::due_soon::NotificationSet;
use crate::error::{Error, Result};
use crate::task::{generate_task_id, Task, TaskDraft, TaskPatch};

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added(String),
    Updated(String),
    Deleted(String),
    Reordered,
    Replaced,
}

/// Outcome of merging a backend snapshot into local state.
///
/// Non-empty lists mean the snapshot disagreed with local state. Local state
/// won for those ids, except for refused updates, where the snapshot did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Local copy had a higher version than the snapshot copy.
    pub kept_newer: Vec<String>,
    /// Created locally, not yet in any snapshot.
    pub kept_pending_creates: Vec<String>,
    /// In the snapshot, but deleted locally.
    pub dropped_pending_deletes: Vec<String>,
    /// Local edits the backend refused; the snapshot copy replaced them.
    pub reverted_failed_updates: Vec<String>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.kept_newer.is_empty()
            && self.kept_pending_creates.is_empty()
            && self.dropped_pending_deletes.is_empty()
            && self.reverted_failed_updates.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    notifications: NotificationSet,
    pending_creates: HashSet<String>,
    pending_deletes: HashSet<String>,
    /// task id -> highest version whose update the backend rejected
    failed_updates: HashMap<String, u64>,
    subscribers: Vec<Sender<StoreChange>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an already-ordered list, e.g. a first snapshot.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    pub fn subscribe(&mut self) -> Receiver<StoreChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Look a task up by full id or unique id prefix.
    pub fn resolve(&self, id_or_prefix: &str) -> Result<&Task> {
        let needle = id_or_prefix.trim();
        if needle.is_empty() {
            return Err(Error::InvalidArgument("task id cannot be empty".to_string()));
        }
        if let Some(task) = self.get(needle) {
            return Ok(task);
        }
        let mut matches = self.tasks.iter().filter(|task| task.id.starts_with(needle));
        match (matches.next(), matches.next()) {
            (Some(task), None) => Ok(task),
            (Some(_), Some(_)) => Err(Error::InvalidArgument(format!(
                "task id prefix '{needle}' is ambiguous"
            ))),
            (None, _) => Err(Error::TaskNotFound(needle.to_string())),
        }
    }

    pub fn notifications(&self) -> &NotificationSet {
        &self.notifications
    }

    // =========================================================================
    // Local operations
    // =========================================================================

    /// Append a new task. `None` (and no change) when the title is blank.
    pub fn add_task(&mut self, draft: &TaskDraft, owner_id: &str, now: DateTime<Utc>) -> Option<Task> {
        let mut task = Task::from_draft(generate_task_id(), draft, owner_id, now)?;
        task.position = self.next_position();
        self.pending_creates.insert(task.id.clone());
        self.tasks.push(task.clone());
        self.publish(StoreChange::Added(task.id.clone()));
        Some(task)
    }

    pub fn toggle_completion(&mut self, id: &str, now: DateTime<Utc>) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.completed = !task.completed;
        task.touch(now);
        let updated = task.clone();
        self.publish(StoreChange::Updated(updated.id.clone()));
        Some(updated)
    }

    /// Apply a patch. `None` when the id is unknown or nothing changed.
    pub fn edit_task(&mut self, id: &str, patch: &TaskPatch, now: DateTime<Utc>) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        if !task.apply_patch(patch, now) {
            return None;
        }
        let updated = task.clone();
        self.publish(StoreChange::Updated(updated.id.clone()));
        Some(updated)
    }

    /// Remove a task and its notification entry.
    pub fn delete_task(&mut self, id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.id == id)?;
        let removed = self.tasks.remove(index);
        self.notifications.remove(id);
        if !self.pending_creates.remove(id) {
            self.pending_deletes.insert(removed.id.clone());
        }
        self.publish(StoreChange::Deleted(removed.id.clone()));
        Some(removed)
    }

    /// Replace the list with a caller-supplied order.
    ///
    /// The order is taken as given; membership is the caller's concern.
    /// Positions are renumbered and every task whose position moved is
    /// returned so the change can be persisted.
    pub fn reorder(&mut self, new_order: Vec<Task>, now: DateTime<Utc>) -> Vec<Task> {
        let mut moved = Vec::new();
        self.tasks = new_order;
        for (index, task) in self.tasks.iter_mut().enumerate() {
            let position = index as u64;
            if task.position != position {
                task.position = position;
                task.touch(now);
                moved.push(task.clone());
            }
        }
        self.publish(StoreChange::Reordered);
        moved
    }

    // =========================================================================
    // Backend sync
    // =========================================================================

    /// Overwrite the list with a backend snapshot.
    ///
    /// The snapshot wins except where local state is provably newer: a local
    /// copy with a higher version, a create the backend has not reported yet,
    /// or a delete the backend has not applied yet. An update the backend
    /// refused is never newer, whatever its version.
    pub fn replace_all(&mut self, snapshot: Vec<Task>) -> Reconciliation {
        let mut local: HashMap<String, Task> = self
            .tasks
            .drain(..)
            .map(|task| (task.id.clone(), task))
            .collect();
        let local_order: Vec<String> = {
            let mut ids: Vec<(u64, String)> = local
                .values()
                .map(|task| (task.position, task.id.clone()))
                .collect();
            ids.sort();
            ids.into_iter().map(|(_, id)| id).collect()
        };

        let mut report = Reconciliation::default();
        let snapshot_ids: HashSet<String> = snapshot.iter().map(|task| task.id.clone()).collect();
        let mut merged = Vec::with_capacity(snapshot.len());

        for remote in snapshot {
            if self.pending_deletes.contains(&remote.id) {
                report.dropped_pending_deletes.push(remote.id);
                continue;
            }
            self.pending_creates.remove(&remote.id);
            let rejected = self.failed_updates.remove(&remote.id);
            match local.remove(&remote.id) {
                Some(mine) if rejected.is_some_and(|version| mine.version <= version) => {
                    report.reverted_failed_updates.push(mine.id.clone());
                    merged.push(remote);
                }
                Some(mine) if mine.version > remote.version => {
                    report.kept_newer.push(mine.id.clone());
                    merged.push(mine);
                }
                _ => merged.push(remote),
            }
        }

        for id in local_order {
            if self.pending_creates.contains(&id) {
                if let Some(task) = local.remove(&id) {
                    report.kept_pending_creates.push(task.id.clone());
                    merged.push(task);
                }
            }
        }

        self.pending_deletes.retain(|id| snapshot_ids.contains(id));
        self.failed_updates
            .retain(|id, _| merged.iter().any(|task| &task.id == id));
        merged.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        self.tasks = merged;

        if !report.is_clean() {
            tracing::warn!(
                kept_newer = report.kept_newer.len(),
                kept_pending_creates = report.kept_pending_creates.len(),
                dropped_pending_deletes = report.dropped_pending_deletes.len(),
                reverted_failed_updates = report.reverted_failed_updates.len(),
                "snapshot disagreed with local state"
            );
        }
        self.publish(StoreChange::Replaced);
        report
    }

    /// The backend finished (or gave up on) creating `id`.
    pub fn acknowledge_create(&mut self, id: &str) {
        self.pending_creates.remove(id);
    }

    /// The backend finished (or gave up on) deleting `id`.
    pub fn acknowledge_delete(&mut self, id: &str) {
        self.pending_deletes.remove(id);
    }

    /// The backend refused the update of `id` at `version`. The next snapshot
    /// copy wins unless a later local edit has raised the version since.
    pub fn reject_update(&mut self, id: &str, version: u64) {
        let entry = self.failed_updates.entry(id.to_string()).or_insert(version);
        *entry = (*entry).max(version);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_creates.is_empty() || !self.pending_deletes.is_empty()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Recompute due-soon flags. Returns whether the flagged set changed.
    pub fn refresh_notifications(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        self.notifications.recompute(&self.tasks, now, window)
    }

    pub fn dismiss_notification(&mut self, id: &str) -> bool {
        match self.tasks.iter().find(|task| task.id == id) {
            Some(task) => self.notifications.dismiss(task),
            None => false,
        }
    }

    fn next_position(&self) -> u64 {
        self.tasks
            .iter()
            .map(|task| task.position + 1)
            .max()
            .unwrap_or(0)
    }

    fn publish(&mut self, change: StoreChange) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
