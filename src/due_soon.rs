//! Due-soon detection and notifications.
//!
//! A task is due soon when it is incomplete and its due date falls in the
//! half-open window `(now, now + window]`. The [`NotificationSet`] is
//! recomputed and replaced on every task-list change and on every tick of the
//! [`DueSoonMonitor`]; a dismissed entry stays hidden until the task's content
//! changes. Moving a task in the list does not count as a change.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::task::Task;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

pub fn default_window() -> Duration {
    Duration::hours(DEFAULT_WINDOW_HOURS)
}

pub fn is_due_soon(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    if task.completed {
        return false;
    }
    match task.due_date {
        Some(due) => due > now && due <= now + window,
        None => false,
    }
}

/// Ids of qualifying tasks, in list order.
pub fn due_soon_ids(tasks: &[Task], now: DateTime<Utc>, window: Duration) -> Vec<String> {
    tasks
        .iter()
        .filter(|task| is_due_soon(task, now, window))
        .map(|task| task.id.clone())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationSet {
    flagged: Vec<String>,
    /// task id -> the task as it was when dismissed
    dismissed: HashMap<String, Task>,
}

impl NotificationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the flagged ids with the current qualifying set.
    ///
    /// Returns whether the flagged ids changed.
    pub fn recompute(&mut self, tasks: &[Task], now: DateTime<Utc>, window: Duration) -> bool {
        let current: HashMap<&str, &Task> =
            tasks.iter().map(|task| (task.id.as_str(), task)).collect();
        self.dismissed.retain(|id, seen| {
            current
                .get(id.as_str())
                .is_some_and(|task| task.same_content(seen))
        });

        let next: Vec<String> = due_soon_ids(tasks, now, window)
            .into_iter()
            .filter(|id| !self.dismissed.contains_key(id))
            .collect();
        if next == self.flagged {
            return false;
        }
        self.flagged = next;
        true
    }

    /// Hide a flagged task until its content changes.
    pub fn dismiss(&mut self, task: &Task) -> bool {
        let Some(pos) = self.flagged.iter().position(|id| id == &task.id) else {
            return false;
        };
        self.flagged.remove(pos);
        self.dismissed.insert(task.id.clone(), task.clone());
        true
    }

    /// Drop any entry for a removed task.
    pub fn remove(&mut self, id: &str) {
        self.flagged.retain(|candidate| candidate != id);
        self.dismissed.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.flagged.iter().any(|candidate| candidate == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.flagged
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    /// One line per flagged task, in flagged order.
    pub fn messages(&self, tasks: &[Task]) -> Vec<String> {
        self.flagged
            .iter()
            .filter_map(|id| tasks.iter().find(|task| &task.id == id))
            .map(notification_message)
            .collect()
    }
}

pub fn notification_message(task: &Task) -> String {
    match task.due_date {
        Some(due) => format!(
            "\"{}\" is due {}",
            task.title,
            due.format("%b %-d %H:%M UTC")
        ),
        None => format!("\"{}\" is due soon", task.title),
    }
}

/// Recurring tick on a background thread, stopped on drop.
///
/// The tick callback returns `false` to end the loop (e.g. when the receiving
/// side of a channel has gone away).
#[derive(Debug)]
pub struct DueSoonMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DueSoonMonitor {
    pub fn spawn<F>(interval: std::time::Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("due-soon-monitor".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !on_tick() {
                            tracing::debug!("due-soon monitor receiver gone, stopping");
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|err| Error::OperationFailed(format!("failed to start monitor: {err}")))?;
        tracing::debug!(interval_ms = interval.as_millis() as u64, "due-soon monitor started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the timer and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::debug!("due-soon monitor stopped");
        }
    }
}

impl Drop for DueSoonMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
